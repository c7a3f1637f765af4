//! Environment-derived configuration for the model/transport identifiers a
//! concrete `Classifier`/`ChatCompleter` adapter is constructed with.
//!
//! The gateway itself never opens an HTTP connection — this just shapes
//! which model names and timeouts a caller's adapter gets built with, using
//! the same env-var-with-fallback-default pattern throughout.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub openai_base_url: Option<String>,
    pub openai_model: String,
    pub infection_model: String,
    pub analysis_model: String,
    pub guard_model: String,
    pub guard_device: String,
    pub default_block_threshold: f32,
    pub default_allow_threshold: f32,
    pub completer_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            openai_base_url: None,
            openai_model: "gpt-4o-mini".into(),
            infection_model: "gpt-4o-mini".into(),
            analysis_model: "gpt-4o-mini".into(),
            guard_model: "protectai/deberta-v3-base-prompt-injection-v2".into(),
            guard_device: "cpu".into(),
            default_block_threshold: 0.7,
            default_allow_threshold: 0.3,
            completer_timeout: Duration::from_secs(30),
        }
    }
}

pub fn load() -> GatewayConfig {
    dotenvy::dotenv().ok();
    let default = GatewayConfig::default();

    GatewayConfig {
        openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
        openai_model: std::env::var("OPENAI_MODEL").unwrap_or(default.openai_model),
        infection_model: std::env::var("INFECTION_MODEL").unwrap_or(default.infection_model),
        analysis_model: std::env::var("ANALYSIS_MODEL").unwrap_or(default.analysis_model),
        guard_model: std::env::var("GUARD_MODEL").unwrap_or(default.guard_model),
        guard_device: std::env::var("GUARD_DEVICE").unwrap_or(default.guard_device),
        default_block_threshold: std::env::var("DEFAULT_BLOCK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.default_block_threshold),
        default_allow_threshold: std::env::var("DEFAULT_ALLOW_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.default_allow_threshold),
        completer_timeout: std::env::var("COMPLETER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(default.completer_timeout),
    }
}
