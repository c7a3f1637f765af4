//! The per-tenant policy document.
//!
//! Shaped around conditions, actions, and rule lists, scoped to the five
//! concrete checks this gateway actually needs: role permissions, call
//! chaining, severity rules, output restrictions, and context rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::severity::{Severity, SeverityComparator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub policy_key: String,
    pub owner_id: String,
    pub roles: HashMap<String, RolePermissions>,
    pub functions: HashMap<String, FunctionPolicy>,
    pub severity_rules: HashMap<Severity, SeverityRule>,
    pub output_restrictions: HashMap<String, OutputRestriction>,
    pub function_chaining: HashMap<String, ChainingRule>,
    pub context_rules: Vec<ContextRule>,
    pub decision_thresholds: DecisionThresholds,
    pub custom_prompts: HashMap<String, String>,
    pub is_active: bool,
    pub is_default: bool,
}

impl Policy {
    /// A new, empty policy for `owner_id` with sane defaults: all five
    /// severity levels present and sane thresholds.
    pub fn new(policy_key: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy_key: policy_key.into(),
            owner_id: owner_id.into(),
            roles: HashMap::new(),
            functions: HashMap::new(),
            severity_rules: default_severity_rules(),
            output_restrictions: HashMap::new(),
            function_chaining: HashMap::new(),
            context_rules: Vec::new(),
            decision_thresholds: DecisionThresholds::default(),
            custom_prompts: HashMap::new(),
            is_active: true,
            is_default: false,
        }
    }

    /// Fill in any of the five severity levels missing from
    /// `severity_rules` with their documented default. Call this after
    /// loading a policy from a store, since a persisted policy may only
    /// carry the levels an operator explicitly configured.
    pub fn backfill_severity_defaults(&mut self) {
        for (level, rule) in default_severity_rules() {
            self.severity_rules.entry(level).or_insert(rule);
        }
    }

    pub fn severity_rule(&self, level: Severity) -> &SeverityRule {
        self.severity_rules
            .get(&level)
            .unwrap_or_else(|| self.severity_rules.get(&Severity::Safe).expect(
                "severity_rules must always expose `safe`; call backfill_severity_defaults on load",
            ))
    }
}

/// `roles[role_name]`: the set of functions a role may call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolePermissions {
    /// Either a literal list of function names, or `["*"]` for "all".
    pub permissions: Vec<String>,
}

impl RolePermissions {
    pub fn allows_all(&self) -> bool {
        self.permissions.iter().any(|p| p == "*")
    }

    pub fn allows(&self, function_name: &str) -> bool {
        self.allows_all() || self.permissions.iter().any(|p| p == function_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionPolicy {
    pub allowed_roles: Vec<String>,
    pub output_restrictions: Option<OutputRestriction>,
    pub hitl_rules: Option<String>,
    pub quarantine_exclude: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityRule {
    pub allow_function_calls: bool,
    pub allow_output_use: bool,
    pub block: bool,
}

fn default_severity_rules() -> HashMap<Severity, SeverityRule> {
    use Severity::*;
    let mut m = HashMap::new();
    m.insert(
        Safe,
        SeverityRule {
            allow_function_calls: true,
            allow_output_use: true,
            block: false,
        },
    );
    m.insert(
        Low,
        SeverityRule {
            allow_function_calls: true,
            allow_output_use: true,
            block: false,
        },
    );
    m.insert(
        Medium,
        SeverityRule {
            allow_function_calls: true,
            allow_output_use: true,
            block: false,
        },
    );
    m.insert(
        High,
        SeverityRule {
            allow_function_calls: false,
            allow_output_use: false,
            block: true,
        },
    );
    m.insert(
        Critical,
        SeverityRule {
            allow_function_calls: false,
            allow_output_use: false,
            block: true,
        },
    );
    m
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputRestriction {
    pub cannot_trigger_functions: bool,
    pub max_severity_for_use: Option<Severity>,
}

/// `function_chaining[source_function]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainingRule {
    pub allowed_targets: Vec<String>,
    pub blocked_targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRule {
    pub function: String,
    pub condition: ContextCondition,
    pub action: ContextAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextCondition {
    pub severity: Option<(SeverityComparatorWire, Severity)>,
    pub contains_keywords: Option<Vec<String>>,
    pub contains_patterns: Option<Vec<String>>,
    pub contains_urls: Option<bool>,
}

/// `SeverityComparator` wrapped for serde — the domain type lives in
/// `models::severity` and is not itself `Serialize`/`Deserialize` since its
/// wire form is a short token (`">="`, `"="`, ...) rather than a variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityComparatorWire(pub SeverityComparator);

impl Serialize for SeverityComparatorWire {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let token = match self.0 {
            SeverityComparator::Ge => ">=",
            SeverityComparator::Gt => ">",
            SeverityComparator::Le => "<=",
            SeverityComparator::Lt => "<",
            SeverityComparator::Eq => "=",
        };
        s.serialize_str(token)
    }
}

impl<'de> Deserialize<'de> for SeverityComparatorWire {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        SeverityComparator::parse(&raw)
            .map(SeverityComparatorWire)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAction {
    pub block: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionThresholds {
    pub block_threshold: f32,
    pub allow_threshold: f32,
    pub use_severity_fallback: bool,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            block_threshold: 0.7,
            allow_threshold: 0.3,
            use_severity_fallback: true,
        }
    }
}

impl DecisionThresholds {
    /// `allow_threshold` must never exceed `block_threshold`.
    pub fn validate(&self) -> Result<(), crate::errors::GatewayError> {
        if self.allow_threshold > self.block_threshold {
            return Err(crate::errors::GatewayError::BadRequest(format!(
                "allow_threshold ({}) must be <= block_threshold ({})",
                self.allow_threshold, self.block_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.allow_threshold) || !(0.0..=1.0).contains(&self.block_threshold)
        {
            return Err(crate::errors::GatewayError::BadRequest(
                "thresholds must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_policy_has_all_five_severity_levels() {
        let p = Policy::new("default", "owner-1");
        for level in Severity::ALL {
            assert!(p.severity_rules.contains_key(&level), "missing {level:?}");
        }
    }

    #[test]
    fn role_permissions_wildcard() {
        let r = RolePermissions {
            permissions: vec!["*".into()],
        };
        assert!(r.allows("anything"));
    }

    #[test]
    fn role_permissions_explicit() {
        let r = RolePermissions {
            permissions: vec!["send_mail".into()],
        };
        assert!(r.allows("send_mail"));
        assert!(!r.allows("delete_account"));
    }

    #[test]
    fn threshold_validation_rejects_inverted_bounds() {
        let t = DecisionThresholds {
            block_threshold: 0.3,
            allow_threshold: 0.7,
            use_severity_fallback: true,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn backfill_preserves_explicit_overrides() {
        let mut p = Policy::new("k", "o");
        p.severity_rules.insert(
            Severity::High,
            SeverityRule {
                allow_function_calls: true,
                allow_output_use: true,
                block: false,
            },
        );
        p.backfill_severity_defaults();
        assert!(p.severity_rules.get(&Severity::High).unwrap().allow_function_calls);
    }
}
