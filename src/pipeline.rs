//! Pipeline orchestrator. Sequences the seven gates, short-circuiting on the
//! first `BLOCKED`, and fuses the accumulated per-stage scores into the
//! final decision.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::analyst::{run_analyst, AnalystRequest};
use crate::middleware::chaining::chaining_permits;
use crate::middleware::keyword::detect_keywords;
use crate::middleware::policy_eval::context_rule_action;
use crate::middleware::rbac::role_permits;
use crate::models::decision::{Decision, StageDecision};
use crate::models::policy::Policy;
use crate::models::request::{blocked_at, AnalyzeRequest, AnalyzeResponse};
use crate::models::severity::Severity;
use crate::ports::classifier::Classifier;
use crate::ports::completer::ChatCompleter;
use crate::prompts::AnalysisMode;
use crate::quarantine::{run_quarantine, QuarantineRequest};

/// Model identifiers and timeout a pipeline run is constructed with —
/// narrower than [`crate::config::GatewayConfig`] since a pipeline only
/// needs the handful of values a given request's stages will use.
#[derive(Debug, Clone)]
pub struct PipelineModels {
    pub analysis_model: String,
    pub infection_model: String,
    pub completer_timeout: Duration,
}

impl Default for PipelineModels {
    fn default() -> Self {
        Self {
            analysis_model: "gpt-4o-mini".to_string(),
            infection_model: "gpt-4o-mini".to_string(),
            completer_timeout: Duration::from_secs(30),
        }
    }
}

/// A per-request immutable context: no global mutable pipeline singleton —
/// a caller constructs one of these per request from the loaded policy and
/// injected ports.
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    analysis_completer: Arc<dyn ChatCompleter>,
    infection_completer: Arc<dyn ChatCompleter>,
    models: PipelineModels,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        analysis_completer: Arc<dyn ChatCompleter>,
        infection_completer: Arc<dyn ChatCompleter>,
        models: PipelineModels,
    ) -> Self {
        Self {
            classifier,
            analysis_completer,
            infection_completer,
            models,
        }
    }

    /// Infallible by design: every internal failure degrades to a
    /// documented fallback rather than bubbling up as `Err`.
    pub async fn analyze(&self, policy: &Policy, request: AnalyzeRequest) -> AnalyzeResponse {
        let call = request.function_call();
        let function_chaining_info = policy
            .function_chaining
            .get(&call.function_name)
            .map(|c| {
                serde_json::json!({
                    "allowed_targets": c.allowed_targets,
                    "blocked_targets": c.blocked_targets,
                })
            });

        // 1. RBAC
        if let Some(role) = &request.user_role {
            if !role_permits(policy, role, &request.function_name) {
                tracing::warn!(function = %request.function_name, role, "blocked at rbac");
                let mut resp = AnalyzeResponse::blocked(
                    blocked_at::RBAC,
                    format!("role '{role}' is not permitted to call '{}'", request.function_name),
                );
                resp.function_chaining_info = function_chaining_info;
                return resp;
            }
        }

        // 2. Chaining
        if let Some(target) = &request.target_function {
            if !chaining_permits(policy, &request.function_name, target) {
                tracing::warn!(function = %request.function_name, target, "blocked at function_chaining");
                let mut resp = AnalyzeResponse::blocked(
                    blocked_at::FUNCTION_CHAINING,
                    format!("'{}' may not chain into '{target}'", request.function_name),
                );
                resp.function_chaining_info = function_chaining_info;
                return resp;
            }
        }

        let mut stage_scores: Vec<f32> = Vec::new();
        let mut stage_severities: Vec<Severity> = Vec::new();
        let mut input_analysis_json: Option<Value> = None;
        let mut llm_analysis_json: Option<Value> = None;
        let mut quarantine_analysis_json: Option<Value> = None;
        let mut keyword_detection_json: Option<Value> = None;
        let mut review_required = false;
        let mut warning: Option<String> = None;

        // 3. Input classification
        if request.input_analysis {
            let name_score = self.classifier.score(&request.function_name);
            let result_score = self.classifier.score(&serde_json::to_string(&request.function_result).unwrap_or_default());
            let score = match &request.function_args {
                Some(args) => {
                    let args_score = self.classifier.score(&serde_json::to_string(args).unwrap_or_default());
                    0.2 * name_score + 0.3 * args_score + 0.5 * result_score
                }
                None => 0.3 * name_score + 0.7 * result_score,
            };
            let severity = Severity::from_score(score, &[0.1, 0.3, 0.5, 0.7, 0.9]);
            stage_scores.push(score);
            stage_severities.push(severity);
            input_analysis_json = Some(serde_json::json!({ "score": score, "severity": severity.as_str() }));

            if policy.severity_rule(severity).block {
                let mut resp = AnalyzeResponse::blocked(
                    blocked_at::INPUT_ANALYSIS,
                    format!("input classification severity '{}' is blocked by policy", severity.as_str()),
                );
                resp.final_score = Some(score);
                resp.input_analysis = input_analysis_json;
                resp.function_chaining_info = function_chaining_info;
                return resp;
            }

            if let Some(target) = &request.target_function {
                let cannot_trigger = policy
                    .functions
                    .get(&request.function_name)
                    .and_then(|f| f.output_restrictions.as_ref())
                    .map(|r| r.cannot_trigger_functions)
                    .unwrap_or(false);
                if cannot_trigger {
                    let mut resp = AnalyzeResponse::blocked(
                        blocked_at::OUTPUT_RESTRICTION,
                        format!("'{}' output may not trigger '{target}'", request.function_name),
                    );
                    resp.final_score = Some(score);
                    resp.input_analysis = input_analysis_json;
                    resp.function_chaining_info = function_chaining_info;
                    return resp;
                }
            }

            if let Some(action) = context_rule_action(policy, &request.function_name, &request.function_result, severity) {
                if action.block {
                    let mut resp = AnalyzeResponse::blocked(
                        blocked_at::CONTEXT_RULE,
                        action.reason.clone().unwrap_or_else(|| "context rule matched".to_string()),
                    );
                    resp.final_score = Some(score);
                    resp.input_analysis = input_analysis_json;
                    resp.function_chaining_info = function_chaining_info;
                    return resp;
                }
            }
        }

        // 4. Keyword detection
        if request.enable_keyword_detection {
            let detection = detect_keywords(&request.function_result, request.keywords.as_deref());
            keyword_detection_json = Some(serde_json::json!({
                "detected": detection.detected,
                "occurrences": detection.occurrences,
                "risk_score": detection.risk_score,
                "severity": detection.severity.as_str(),
            }));

            if detection.severity >= Severity::High || detection.risk_score >= 0.7 {
                tracing::warn!(
                    function = %request.function_name,
                    risk_score = detection.risk_score,
                    "blocked at keyword_detection"
                );
                let mut resp = AnalyzeResponse::blocked(
                    blocked_at::KEYWORD_DETECTION,
                    "detected high-risk keywords in function result".to_string(),
                );
                resp.keyword_detection = keyword_detection_json;
                resp.function_chaining_info = function_chaining_info;
                return resp;
            }

            stage_scores.push(detection.risk_score);
            stage_severities.push(detection.severity);
        }

        let mode = if request.quick_analysis { AnalysisMode::Quick } else { AnalysisMode::Full };

        // 5. LLM analyst
        if request.llm_analysis {
            let result = run_analyst(
                self.analysis_completer.as_ref(),
                AnalystRequest {
                    policy,
                    call: &call,
                    mode,
                    model: self.models.analysis_model.clone(),
                    timeout: self.models.completer_timeout,
                    system_override: None,
                },
            )
            .await;

            llm_analysis_json = Some(result.as_json());

            if result.decision != StageDecision::Error {
                stage_scores.push(result.score);
                if let Some(sev) = result.severity {
                    stage_severities.push(sev);
                }
            }

            if !result.policy_violations.is_empty() {
                let mut resp = AnalyzeResponse::blocked(
                    blocked_at::LLM_ANALYSIS,
                    format!("policy violations detected: {}", result.policy_violations.join(", ")),
                );
                resp.final_score = Some(result.score);
                resp.llm_analysis = llm_analysis_json;
                resp.input_analysis = input_analysis_json;
                resp.keyword_detection = keyword_detection_json;
                resp.function_chaining_info = function_chaining_info;
                return resp;
            }

            if result.decision == StageDecision::Block {
                if let Some(severity) = result.severity {
                    if policy.severity_rule(severity).block {
                        let mut resp = AnalyzeResponse::blocked(
                            blocked_at::SEVERITY_RULE_LLM_ANALYSIS,
                            result.reason.clone(),
                        );
                        resp.final_score = Some(result.score);
                        resp.llm_analysis = llm_analysis_json;
                        resp.input_analysis = input_analysis_json;
                        resp.keyword_detection = keyword_detection_json;
                        resp.function_chaining_info = function_chaining_info;
                        return resp;
                    }
                }
                // soft BLOCK without a matching severity rule: quarantine
                // still gets to run.
            }
        }

        // 6. Quarantine probe
        if request.quarantine_analysis {
            let result = run_quarantine(
                self.classifier.as_ref(),
                self.infection_completer.as_ref(),
                self.analysis_completer.as_ref(),
                QuarantineRequest {
                    policy,
                    call: &call,
                    quick: request.quick_analysis,
                    block_threshold: policy.decision_thresholds.block_threshold,
                    infection_model: self.models.infection_model.clone(),
                    analysis_model: self.models.analysis_model.clone(),
                    timeout: self.models.completer_timeout,
                },
            )
            .await;

            quarantine_analysis_json = Some(result.as_json());
            review_required = result.requires_hitl;

            match result.decision {
                StageDecision::Block => {
                    if policy.severity_rule(result.severity).block || result.severity >= Severity::High {
                        let mut resp = AnalyzeResponse::blocked(blocked_at::QUARANTINE_ANALYSIS, result.reason.clone());
                        resp.final_score = Some(result.combined_score);
                        resp.quarantine_analysis = quarantine_analysis_json;
                        resp.llm_analysis = llm_analysis_json;
                        resp.input_analysis = input_analysis_json;
                        resp.keyword_detection = keyword_detection_json;
                        resp.function_chaining_info = function_chaining_info;
                        resp.review_required = review_required;
                        return resp;
                    }
                }
                StageDecision::Error => {
                    tracing::warn!(function = %request.function_name, "quarantine probe degraded, failing open");
                    warning = Some(format!("quarantine probe degraded: {}", result.reason));
                }
                StageDecision::Allow => {}
            }

            if result.decision != StageDecision::Error {
                stage_scores.push(result.combined_score);
                stage_severities.push(result.severity);
            }
        }

        // 7. Fusion
        let final_score = stage_scores.iter().cloned().fold(None, |acc: Option<f32>, s| {
            Some(acc.map_or(s, |a| a.max(s)))
        });

        let thresholds = &policy.decision_thresholds;
        let final_decision = match final_score {
            Some(score) if score >= thresholds.block_threshold => Decision::Blocked,
            Some(score) if score < thresholds.allow_threshold => {
                if warning.is_some() {
                    Decision::AllowedWithWarning
                } else {
                    Decision::Allowed
                }
            }
            Some(_) => {
                if thresholds.use_severity_fallback {
                    let max_severity = stage_severities.iter().copied().max().unwrap_or(Severity::Safe);
                    if policy.severity_rule(max_severity).block {
                        Decision::Blocked
                    } else if warning.is_some() {
                        Decision::AllowedWithWarning
                    } else {
                        Decision::Allowed
                    }
                } else if final_score.unwrap() >= (thresholds.block_threshold + thresholds.allow_threshold) / 2.0 {
                    Decision::Blocked
                } else if warning.is_some() {
                    Decision::AllowedWithWarning
                } else {
                    Decision::Allowed
                }
            }
            None => {
                if warning.is_some() {
                    Decision::AllowedWithWarning
                } else {
                    Decision::Allowed
                }
            }
        };

        let blocked_at = matches!(final_decision, Decision::Blocked).then(|| blocked_at::THRESHOLD.to_string());
        let reason = match final_decision {
            Decision::Blocked => Some("final score/severity fusion exceeded the block threshold".to_string()),
            Decision::AllowedWithWarning => warning.clone(),
            Decision::Allowed => None,
        };

        AnalyzeResponse {
            final_decision,
            final_score,
            safe_to_use: final_decision.safe_to_use(),
            blocked_at,
            reason,
            input_analysis: input_analysis_json,
            llm_analysis: llm_analysis_json,
            quarantine_analysis: quarantine_analysis_json,
            keyword_detection: keyword_detection_json,
            function_chaining_info,
            warning,
            review_required,
        }
    }
}
