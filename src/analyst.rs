//! The deterministic LLM analyst — pipeline Stage A.

use serde_json::Value;

use crate::models::decision::StageDecision;
use crate::models::policy::Policy;
use crate::models::request::FunctionCall;
use crate::models::severity::Severity;
use crate::ports::completer::{ChatCompleter, CompleterError, CompletionRequest, ResponseFormat};
use crate::prompts::{self, AnalysisMode};

#[derive(Debug, Clone)]
pub struct AnalystResult {
    pub score: f32,
    pub decision: StageDecision,
    pub reason: String,
    pub threats_found: bool,
    pub threat_indicators: Vec<String>,
    pub detected_patterns: Vec<String>,
    pub function_call_attempts: Vec<String>,
    pub policy_violations: Vec<String>,
    pub severity: Option<Severity>,
    pub summary: Option<String>,
    pub details: Option<String>,
    /// Which rung of the fallback ladder produced this result — recorded on
    /// the trace per the resolved Open Question in `DESIGN.md`.
    pub fallback_path: &'static str,
}

impl AnalystResult {
    fn error(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            decision: StageDecision::Error,
            reason: reason.into(),
            threats_found: false,
            threat_indicators: Vec::new(),
            detected_patterns: Vec::new(),
            function_call_attempts: Vec::new(),
            policy_violations: Vec::new(),
            severity: None,
            summary: None,
            details: None,
            fallback_path: "error",
        }
    }

    pub fn as_json(&self) -> Value {
        serde_json::json!({
            "score": self.score,
            "decision": match self.decision {
                StageDecision::Allow => "ALLOW",
                StageDecision::Block => "BLOCK",
                StageDecision::Error => "ERROR",
            },
            "reason": self.reason,
            "threats_found": self.threats_found,
            "threat_indicators": self.threat_indicators,
            "detected_patterns": self.detected_patterns,
            "function_call_attempts": self.function_call_attempts,
            "policy_violations": self.policy_violations,
            "severity": self.severity.map(Severity::as_str),
            "summary": self.summary,
            "details": self.details,
            "fallback_path": self.fallback_path,
        })
    }
}

pub struct AnalystRequest<'a> {
    pub policy: &'a Policy,
    pub call: &'a FunctionCall,
    pub mode: AnalysisMode,
    pub model: String,
    pub timeout: std::time::Duration,
    /// Overrides the default mode-derived system prompt. Used by the shield
    /// evaluator, which synthesizes its own system prompt from a `Shield`
    /// rather than a function's policy summary.
    pub system_override: Option<String>,
}

/// Runs the analyst with its three-rung fallback ladder: `json_schema` →
/// `json_object` with an in-prompt schema → unformatted free text coerced
/// by re-parsing the first JSON object. A timeout at any rung short-circuits
/// straight to the `ERROR` sentinel — it never steps down the ladder, since
/// every rung shares the same deadline budget.
pub async fn run_analyst(completer: &dyn ChatCompleter, req: AnalystRequest<'_>) -> AnalystResult {
    let system = req
        .system_override
        .clone()
        .unwrap_or_else(|| prompts::analyst_system_prompt(req.mode));
    let user = prompts::analyst_user_prompt(req.mode, req.call, req.policy);
    let schema = match req.mode {
        AnalysisMode::Quick => prompts::analyst_quick_schema(),
        AnalysisMode::Full => prompts::analyst_full_schema(),
    };

    let rungs: [(ResponseFormat, &'static str, String); 3] = [
        (ResponseFormat::JsonSchema(schema.clone()), "json_schema", user.clone()),
        (
            ResponseFormat::JsonObject,
            "json_object_in_prompt",
            format!("{user}\n\nRespond with JSON matching this schema:\n{schema}"),
        ),
        (ResponseFormat::FreeText, "free_text_coerced", user.clone()),
    ];

    for (response_format, label, rendered_user) in rungs {
        let completion_req = CompletionRequest {
            system: system.clone(),
            user: rendered_user,
            model: req.model.clone(),
            temperature: 0.0,
            max_tokens: match req.mode {
                AnalysisMode::Quick => 300,
                AnalysisMode::Full => 1200,
            },
            response_format,
            timeout: req.timeout,
        };

        match completer.complete(completion_req).await {
            Ok(text) => {
                if let Some(mut result) = parse_analyst_response(&text, &schema, req.mode) {
                    result.fallback_path = label;
                    return result;
                }
                // schema mismatch / unparseable — step down the ladder
            }
            Err(CompleterError::Timeout) => {
                return AnalystResult::error("analyst completer timed out");
            }
            Err(CompleterError::Transport(msg)) => {
                return AnalystResult::error(format!("analyst completer transport error: {msg}"));
            }
            Err(CompleterError::SchemaRejected) => continue,
        }
    }

    AnalystResult::error("analyst exhausted all response-format fallbacks")
}

fn parse_analyst_response(text: &str, schema: &Value, mode: AnalysisMode) -> Option<AnalystResult> {
    let value = coerce_json(text)?;
    if !validate_against_schema(&value, schema) {
        return None;
    }

    let decision_str = value.get("decision")?.as_str()?;
    let decision = match decision_str {
        "ALLOW" => StageDecision::Allow,
        "BLOCK" => StageDecision::Block,
        _ => return None,
    };

    Some(AnalystResult {
        score: value.get("score")?.as_f64()? as f32,
        decision,
        reason: value.get("reason")?.as_str()?.to_string(),
        threats_found: value.get("threats_found").and_then(Value::as_bool).unwrap_or(false),
        threat_indicators: string_array(&value, "threat_indicators"),
        detected_patterns: string_array(&value, "detected_patterns"),
        function_call_attempts: string_array(&value, "function_call_attempts"),
        policy_violations: string_array(&value, "policy_violations"),
        severity: value
            .get("severity")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
        summary: value.get("summary").and_then(Value::as_str).map(str::to_string),
        details: value.get("details").and_then(Value::as_str).map(str::to_string),
        fallback_path: match mode {
            AnalysisMode::Quick => "quick",
            AnalysisMode::Full => "full",
        },
    })
}

fn string_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Extracts the first top-level JSON object from `text`, tolerating
/// surrounding prose — the "coerce by re-parsing" rung of the fallback
/// ladder.
pub(crate) fn coerce_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn validate_against_schema(value: &Value, schema: &Value) -> bool {
    match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled.is_valid(value),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedCompleter(Result<String, CompleterError>);

    #[async_trait]
    impl ChatCompleter for FixedCompleter {
        async fn complete(&self, _req: CompletionRequest) -> Result<String, CompleterError> {
            self.0.clone()
        }
    }

    fn sample_call() -> FunctionCall {
        FunctionCall {
            function_name: "get_mail".into(),
            function_args: None,
            function_result: serde_json::json!({"body": "hello"}),
            user_query: None,
            user_role: None,
            target_function: None,
        }
    }

    #[tokio::test]
    async fn timeout_short_circuits_to_error_sentinel() {
        let completer = FixedCompleter(Err(CompleterError::Timeout));
        let policy = Policy::new("default", "owner-1");
        let call = sample_call();
        let result = run_analyst(
            &completer,
            AnalystRequest {
                policy: &policy,
                call: &call,
                mode: AnalysisMode::Quick,
                model: "test-model".into(),
                timeout: Duration::from_secs(1),
                system_override: None,
            },
        )
        .await;
        assert_eq!(result.decision, StageDecision::Error);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.fallback_path, "error");
    }

    #[tokio::test]
    async fn quick_mode_parses_minimal_schema() {
        let text = r#"{"score": 0.2, "decision": "ALLOW", "reason": "looks fine"}"#;
        let completer = FixedCompleter(Ok(text.to_string()));
        let policy = Policy::new("default", "owner-1");
        let call = sample_call();
        let result = run_analyst(
            &completer,
            AnalystRequest {
                policy: &policy,
                call: &call,
                mode: AnalysisMode::Quick,
                model: "test-model".into(),
                timeout: Duration::from_secs(1),
                system_override: None,
            },
        )
        .await;
        assert_eq!(result.decision, StageDecision::Allow);
        assert_eq!(result.fallback_path, "json_schema");
    }

    #[test]
    fn coerce_json_extracts_embedded_object() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1}\n```\nThanks.";
        let value = coerce_json(text).unwrap();
        assert_eq!(value["a"], 1);
    }
}
