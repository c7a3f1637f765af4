//! Append-only record of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::decision::Decision;
use crate::models::request::{AnalyzeRequest, AnalyzeResponse};

/// `review_status` is the only field of a trace allowed to change after
/// `append` — everything else is write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Reviewed,
}

impl ReviewStatus {
    /// Whether `self -> next` is a legal transition. Only `pending` may move;
    /// the three terminal states do not transition further.
    pub fn can_transition_to(self, next: ReviewStatus) -> bool {
        matches!(self, ReviewStatus::Pending) && next != ReviewStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTrace {
    pub id: Uuid,
    pub owner_id: String,
    pub client_metadata: Option<Value>,

    pub request: AnalyzeRequest,

    pub input_score: Option<f32>,
    pub llm_score: Option<f32>,
    pub quarantine_score: Option<f32>,

    pub final_decision: Decision,
    pub safe_to_use: bool,
    pub blocked_at: Option<String>,
    pub reason: Option<String>,
    pub review_required: bool,

    pub response: AnalyzeResponse,

    pub review_status: ReviewStatus,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl AnalysisTrace {
    pub fn from_response(
        owner_id: impl Into<String>,
        request: AnalyzeRequest,
        response: AnalyzeResponse,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            client_metadata: None,
            input_score: response
                .input_analysis
                .as_ref()
                .and_then(|v| v.get("score"))
                .and_then(Value::as_f64)
                .map(|f| f as f32),
            llm_score: response
                .llm_analysis
                .as_ref()
                .and_then(|v| v.get("score"))
                .and_then(Value::as_f64)
                .map(|f| f as f32),
            quarantine_score: response
                .quarantine_analysis
                .as_ref()
                .and_then(|v| v.get("score"))
                .and_then(Value::as_f64)
                .map(|f| f as f32),
            final_decision: response.final_decision,
            safe_to_use: response.safe_to_use,
            blocked_at: response.blocked_at.clone(),
            reason: response.reason.clone(),
            review_required: response.review_required,
            response,
            request,
            review_status: ReviewStatus::Pending,
            reviewer: None,
            review_notes: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_status_only_leaves_pending_once() {
        assert!(ReviewStatus::Pending.can_transition_to(ReviewStatus::Approved));
        assert!(!ReviewStatus::Approved.can_transition_to(ReviewStatus::Rejected));
        assert!(!ReviewStatus::Pending.can_transition_to(ReviewStatus::Pending));
    }
}
