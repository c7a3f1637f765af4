use serde::{Deserialize, Serialize};

/// Final pipeline decision. `REVIEW_REQUIRED` is deliberately not a variant
/// here — it is a sub-flag on `ALLOWED` (see
/// [`crate::models::request::AnalyzeResponse::review_required`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allowed,
    Blocked,
    AllowedWithWarning,
}

impl Decision {
    pub fn safe_to_use(self) -> bool {
        !matches!(self, Decision::Blocked)
    }
}

/// Per-stage soft decision, distinct from the pipeline-level [`Decision`].
/// Stages that can fail open (the LLM analyst, the quarantine probe) use
/// this three-way result so the orchestrator can tell "the stage ran and
/// said allow/block" apart from "the stage could not run".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageDecision {
    Allow,
    Block,
    Error,
}
