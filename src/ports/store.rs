//! Policy and trace persistence ports, abstracted away from any concrete
//! database; see [`crate::store::memory`] for the in-process reference
//! implementation used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::models::policy::Policy;
use crate::models::trace::{AnalysisTrace, ReviewStatus};

/// Sets of top-level policy keys that changed in a deep-merge update,
/// returned alongside the new policy for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyUpdateDiff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TraceFilters {
    pub function_name: Option<String>,
    pub final_decision: Option<String>,
    pub review_status: Option<ReviewStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSeriesInterval {
    Minute,
    Hour,
    Day,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn create(&self, policy: Policy) -> Result<Policy, GatewayError>;
    async fn get_by_key(&self, policy_key: &str, owner_id: &str) -> Result<Policy, GatewayError>;
    async fn get_default(&self, owner_id: &str) -> Result<Policy, GatewayError>;
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Policy>, GatewayError>;
    async fn update(&self, id: Uuid, patch: Value) -> Result<(Policy, PolicyUpdateDiff), GatewayError>;
    async fn delete(&self, id: Uuid) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn append(&self, trace: AnalysisTrace) -> Result<(), GatewayError>;
    async fn list(&self, owner_id: &str, filters: TraceFilters) -> Result<Vec<AnalysisTrace>, GatewayError>;
    async fn get(&self, id: Uuid, owner_id: &str) -> Result<AnalysisTrace, GatewayError>;
    async fn update_review_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<AnalysisTrace, GatewayError>;

    async fn counts_by_decision(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<(String, u64)>, GatewayError>;
    async fn counts_by_function(&self, owner_id: &str) -> Result<Vec<(String, u64)>, GatewayError>;
    async fn time_series(
        &self,
        owner_id: &str,
        interval: TimeSeriesInterval,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesPoint>, GatewayError>;
}
