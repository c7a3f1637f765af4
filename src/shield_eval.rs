//! Shield evaluator — independent one-shot BLOCK/ALLOW over arbitrary text,
//! outside the main pipeline.

use std::time::Duration;

use crate::analyst::{run_analyst, AnalystRequest};
use crate::models::decision::StageDecision;
use crate::models::policy::Policy;
use crate::models::request::FunctionCall;
use crate::models::shield::Shield;
use crate::ports::completer::ChatCompleter;
use crate::prompts::{self, AnalysisMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldDecision {
    Block,
    Allow,
}

#[derive(Debug, Clone)]
pub struct ShieldResult {
    pub decision: ShieldDecision,
    pub reason: Option<String>,
}

/// Runs `shield` against `text` by calling the analyst in quick mode with a
/// synthesized system prompt, bypassing input/quarantine analysis entirely.
/// `include_reason` controls whether the one-line reason is populated on
/// the result.
pub async fn evaluate_shield(
    completer: &dyn ChatCompleter,
    shield: &Shield,
    text: &str,
    model: String,
    timeout: Duration,
    include_reason: bool,
) -> ShieldResult {
    let system = prompts::shield_system_prompt(
        &shield.prompt_description,
        &shield.what_to_block,
        &shield.what_not_to_block,
    );

    // The shield has no function/role semantics of its own — it borrows the
    // analyst's quick-mode call shape with an empty throwaway policy and a
    // synthetic function call carrying the text under test as the result.
    let policy = Policy::new(&shield.shield_key, &shield.owner_id);
    let call = FunctionCall {
        function_name: "__shield__".to_string(),
        function_args: None,
        function_result: serde_json::Value::String(text.to_string()),
        user_query: None,
        user_role: None,
        target_function: None,
    };

    let result = run_analyst(
        completer,
        AnalystRequest {
            policy: &policy,
            call: &call,
            mode: AnalysisMode::Quick,
            model,
            timeout,
            system_override: Some(system),
        },
    )
    .await;

    let decision = match result.decision {
        StageDecision::Block => ShieldDecision::Block,
        _ => ShieldDecision::Allow,
    };

    ShieldResult {
        decision,
        reason: include_reason.then(|| result.reason),
    }
}
