//! The pipeline's ingress/egress types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::decision::Decision;

/// A single function call produced during an agentic session, as handed to
/// the pipeline for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function_name: String,
    #[serde(default)]
    pub function_args: Option<Value>,
    pub function_result: Value,
    #[serde(default)]
    pub user_query: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub target_function: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Request to [`crate::pipeline::Pipeline::analyze`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub function_name: String,
    pub function_result: Value,
    #[serde(default)]
    pub function_args: Option<Value>,
    #[serde(default)]
    pub user_query: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub target_function: Option<String>,

    #[serde(default = "default_true")]
    pub input_analysis: bool,
    #[serde(default)]
    pub llm_analysis: bool,
    #[serde(default)]
    pub quarantine_analysis: bool,
    #[serde(default)]
    pub quick_analysis: bool,
    #[serde(default)]
    pub enable_keyword_detection: bool,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl AnalyzeRequest {
    pub fn function_call(&self) -> FunctionCall {
        FunctionCall {
            function_name: self.function_name.clone(),
            function_args: self.function_args.clone(),
            function_result: self.function_result.clone(),
            user_query: self.user_query.clone(),
            user_role: self.user_role.clone(),
            target_function: self.target_function.clone(),
        }
    }
}

/// Known `blocked_at` labels. Kept as `&'static str` rather than an enum
/// since the set is referenced only by value in traces and responses,
/// never matched on exhaustively outside the orchestrator that produces them.
pub mod blocked_at {
    pub const RBAC: &str = "rbac";
    pub const FUNCTION_CHAINING: &str = "function_chaining";
    pub const INPUT_ANALYSIS: &str = "input_analysis";
    pub const SEVERITY_RULE_LLM_ANALYSIS: &str = "severity_rule_llm_analysis";
    pub const SEVERITY_RULE_QUARANTINE: &str = "severity_rule_quarantine";
    pub const OUTPUT_RESTRICTION: &str = "output_restriction";
    pub const CONTEXT_RULE: &str = "context_rule";
    pub const KEYWORD_DETECTION: &str = "keyword_detection";
    pub const LLM_ANALYSIS: &str = "llm_analysis";
    pub const QUARANTINE_ANALYSIS: &str = "quarantine_analysis";
    pub const THRESHOLD: &str = "threshold";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub final_decision: Decision,
    pub final_score: Option<f32>,
    pub safe_to_use: bool,
    pub blocked_at: Option<String>,
    pub reason: Option<String>,
    pub input_analysis: Option<Value>,
    pub llm_analysis: Option<Value>,
    pub quarantine_analysis: Option<Value>,
    pub keyword_detection: Option<Value>,
    pub function_chaining_info: Option<Value>,
    pub warning: Option<String>,
    pub review_required: bool,
}

impl AnalyzeResponse {
    pub fn blocked(at: &str, reason: impl Into<String>) -> Self {
        Self {
            final_decision: Decision::Blocked,
            final_score: None,
            safe_to_use: false,
            blocked_at: Some(at.to_string()),
            reason: Some(reason.into()),
            input_analysis: None,
            llm_analysis: None,
            quarantine_analysis: None,
            keyword_detection: None,
            function_chaining_info: None,
            warning: None,
            review_required: false,
        }
    }
}
