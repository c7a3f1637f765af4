//! In-process reference implementations of [`PolicyStore`] and
//! [`TraceStore`]. These exist so the pipeline is exercisable and testable
//! without a real database — not a production persistence layer. One lock
//! per logical store, kept to a single `tokio::sync::Mutex` per map since
//! there is no tiered remote cache in scope here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::middleware::policy_eval::deep_merge_update;
use crate::models::policy::Policy;
use crate::models::trace::{AnalysisTrace, ReviewStatus};
use crate::ports::store::{
    PolicyStore, PolicyUpdateDiff, TimeSeriesInterval, TimeSeriesPoint, TraceFilters, TraceStore,
};

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: Mutex<HashMap<Uuid, Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears `is_default` on every other policy owned by
    /// `owner_id` when `keep` is the new default.
    fn clear_other_defaults(map: &mut HashMap<Uuid, Policy>, owner_id: &str, keep: Uuid) {
        for (id, policy) in map.iter_mut() {
            if *id != keep && policy.owner_id == owner_id {
                policy.is_default = false;
            }
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, mut policy: Policy) -> Result<Policy, GatewayError> {
        let mut map = self.policies.lock().await;

        let conflict = map
            .values()
            .any(|p| p.owner_id == policy.owner_id && p.policy_key == policy.policy_key);
        if conflict {
            return Err(GatewayError::PolicyConflict(policy.policy_key.clone()));
        }

        policy.backfill_severity_defaults();
        policy.decision_thresholds.validate()?;

        let id = policy.id;
        if policy.is_default {
            Self::clear_other_defaults(&mut map, &policy.owner_id, id);
        }
        map.insert(id, policy.clone());
        Ok(policy)
    }

    async fn get_by_key(&self, policy_key: &str, owner_id: &str) -> Result<Policy, GatewayError> {
        let map = self.policies.lock().await;
        map.values()
            .find(|p| p.owner_id == owner_id && p.policy_key == policy_key)
            .cloned()
            .ok_or(GatewayError::PolicyNotFound)
    }

    async fn get_default(&self, owner_id: &str) -> Result<Policy, GatewayError> {
        let mut map = self.policies.lock().await;
        if let Some(p) = map.values().find(|p| p.owner_id == owner_id && p.is_default) {
            return Ok(p.clone());
        }

        // Auto-materialize: first lookup for an owner with no configured
        // default gets an empty, permissive-by-absence policy.
        let mut policy = Policy::new("default", owner_id);
        policy.is_default = true;
        map.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Policy>, GatewayError> {
        let map = self.policies.lock().await;
        Ok(map
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, patch: Value) -> Result<(Policy, PolicyUpdateDiff), GatewayError> {
        let mut map = self.policies.lock().await;
        let current = map.get(&id).ok_or(GatewayError::PolicyNotFound)?;
        let (mut merged, diff) = deep_merge_update(current, &patch)?;
        merged.id = id;

        if merged.is_default {
            Self::clear_other_defaults(&mut map, &merged.owner_id, id);
        }
        map.insert(id, merged.clone());
        Ok((merged, diff))
    }

    async fn delete(&self, id: Uuid) -> Result<(), GatewayError> {
        let mut map = self.policies.lock().await;
        map.remove(&id).ok_or(GatewayError::PolicyNotFound)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTraceStore {
    traces: Mutex<HashMap<Uuid, AnalysisTrace>>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceStore for InMemoryTraceStore {
    async fn append(&self, trace: AnalysisTrace) -> Result<(), GatewayError> {
        let mut map = self.traces.lock().await;
        map.insert(trace.id, trace);
        Ok(())
    }

    async fn list(&self, owner_id: &str, filters: TraceFilters) -> Result<Vec<AnalysisTrace>, GatewayError> {
        let map = self.traces.lock().await;
        Ok(map
            .values()
            .filter(|t| t.owner_id == owner_id)
            .filter(|t| {
                filters
                    .function_name
                    .as_deref()
                    .map(|f| t.request.function_name == f)
                    .unwrap_or(true)
            })
            .filter(|t| {
                filters
                    .review_status
                    .map(|s| t.review_status == s)
                    .unwrap_or(true)
            })
            .filter(|t| filters.since.map(|since| t.created_at >= since).unwrap_or(true))
            .filter(|t| filters.until.map(|until| t.created_at <= until).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid, owner_id: &str) -> Result<AnalysisTrace, GatewayError> {
        let map = self.traces.lock().await;
        map.get(&id)
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .ok_or(GatewayError::PolicyNotFound)
    }

    async fn update_review_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<AnalysisTrace, GatewayError> {
        let mut map = self.traces.lock().await;
        let trace = map.get_mut(&id).ok_or(GatewayError::PolicyNotFound)?;
        if !trace.review_status.can_transition_to(status) {
            return Err(GatewayError::BadRequest(format!(
                "cannot transition review_status from {:?} to {:?}",
                trace.review_status, status
            )));
        }
        trace.review_status = status;
        trace.reviewer = Some(reviewer.to_string());
        trace.review_notes = notes.map(str::to_string);
        Ok(trace.clone())
    }

    async fn counts_by_decision(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<(String, u64)>, GatewayError> {
        let map = self.traces.lock().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for t in map
            .values()
            .filter(|t| t.owner_id == owner_id && t.created_at >= since && t.created_at <= until)
        {
            let key = format!("{:?}", t.final_decision);
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn counts_by_function(&self, owner_id: &str) -> Result<Vec<(String, u64)>, GatewayError> {
        let map = self.traces.lock().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for t in map.values().filter(|t| t.owner_id == owner_id) {
            *counts.entry(t.request.function_name.clone()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn time_series(
        &self,
        owner_id: &str,
        interval: TimeSeriesInterval,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesPoint>, GatewayError> {
        let map = self.traces.lock().await;
        let mut buckets: HashMap<DateTime<Utc>, u64> = HashMap::new();

        for t in map
            .values()
            .filter(|t| t.owner_id == owner_id && t.created_at >= since && t.created_at <= until)
        {
            let bucket_start = truncate_to_interval(t.created_at, interval);
            *buckets.entry(bucket_start).or_insert(0) += 1;
        }

        let mut points: Vec<TimeSeriesPoint> = buckets
            .into_iter()
            .map(|(bucket_start, count)| TimeSeriesPoint { bucket_start, count })
            .collect();
        points.sort_by_key(|p| p.bucket_start);
        Ok(points)
    }
}

fn truncate_to_interval(ts: DateTime<Utc>, interval: TimeSeriesInterval) -> DateTime<Utc> {
    use chrono::Timelike;
    match interval {
        TimeSeriesInterval::Minute => ts.with_second(0).unwrap().with_nanosecond(0).unwrap(),
        TimeSeriesInterval::Hour => ts
            .with_minute(0)
            .unwrap()
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
        TimeSeriesInterval::Day => ts
            .with_hour(0)
            .unwrap()
            .with_minute(0)
            .unwrap()
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
    }
}
