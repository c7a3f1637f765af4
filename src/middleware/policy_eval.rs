//! Context-rule matching and deep-merge policy updates.
//!
//! The condition interpreter is scoped down to the handful of checks this
//! gateway needs rather than a generic condition tree.

use serde_json::{Map, Value};

use crate::errors::GatewayError;
use crate::models::policy::{ContextAction, ContextCondition, Policy};
use crate::models::severity::Severity;
use crate::ports::store::PolicyUpdateDiff;

const URL_MARKERS: [&str; 6] = ["http://", "https://", "www.", ".com", ".org", ".net"];

/// Linearly scans `policy.context_rules` for rules whose `function` matches
/// and whose condition is satisfied; returns the first match's action.
/// First-match wins.
pub fn context_rule_action(
    policy: &Policy,
    function_name: &str,
    result: &Value,
    severity: Severity,
) -> Option<&ContextAction> {
    let serialized_lower = serde_json::to_string(result).unwrap_or_default().to_lowercase();

    policy
        .context_rules
        .iter()
        .find(|rule| rule.function == function_name && condition_matches(&rule.condition, severity, &serialized_lower))
        .map(|rule| &rule.action)
}

fn condition_matches(condition: &ContextCondition, severity: Severity, serialized_lower: &str) -> bool {
    if let Some((comparator, expected)) = condition.severity {
        if !comparator.0.apply(severity, expected) {
            return false;
        }
    }

    if let Some(keywords) = &condition.contains_keywords {
        if !keywords.iter().any(|k| serialized_lower.contains(&k.to_lowercase())) {
            return false;
        }
    }

    if let Some(patterns) = &condition.contains_patterns {
        if !patterns.iter().any(|p| serialized_lower.contains(&p.to_lowercase())) {
            return false;
        }
    }

    if let Some(true) = condition.contains_urls {
        if !URL_MARKERS.iter().any(|m| serialized_lower.contains(m)) {
            return false;
        }
    }

    true
}

/// Top-level policy fields merged key-by-key rather than replaced wholesale.
const MERGED_DICT_FIELDS: [&str; 7] = [
    "roles",
    "functions",
    "severity_rules",
    "output_restrictions",
    "function_chaining",
    "decision_thresholds",
    "custom_prompts",
];

/// Deep-merges `patch` into `policy` and returns the new policy plus a diff
/// of the top-level `"field.key"` entries that were added, updated, or
/// removed. `context_rules` is replaced wholesale when present in `patch`,
/// never merged.
///
/// A `null` value for a nested key in the patch deletes that key from the
/// corresponding map (the conventional deep-merge deletion sentinel).
pub fn deep_merge_update(policy: &Policy, patch: &Value) -> Result<(Policy, PolicyUpdateDiff), GatewayError> {
    let mut current = serde_json::to_value(policy)
        .map_err(|e| GatewayError::BadRequest(format!("policy failed to serialize: {e}")))?;
    let current_obj = current
        .as_object_mut()
        .ok_or_else(|| GatewayError::BadRequest("policy did not serialize to an object".into()))?;

    let patch_obj = patch
        .as_object()
        .ok_or_else(|| GatewayError::BadRequest("patch must be a JSON object".into()))?;

    let mut diff = PolicyUpdateDiff::default();

    for (field, patch_value) in patch_obj {
        if field == "context_rules" {
            current_obj.insert(field.clone(), patch_value.clone());
            diff.updated.push(field.clone());
            continue;
        }

        if MERGED_DICT_FIELDS.contains(&field.as_str()) {
            let patch_map = patch_value
                .as_object()
                .ok_or_else(|| GatewayError::BadRequest(format!("{field} patch must be an object")))?;
            let existing = current_obj
                .entry(field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let existing_map = existing
                .as_object_mut()
                .ok_or_else(|| GatewayError::BadRequest(format!("existing {field} is not an object")))?;

            for (key, value) in patch_map {
                let full_key = format!("{field}.{key}");
                if value.is_null() {
                    if existing_map.remove(key).is_some() {
                        diff.removed.push(full_key);
                    }
                } else if existing_map.contains_key(key) {
                    if existing_map.get(key) != Some(value) {
                        diff.updated.push(full_key);
                    }
                    existing_map.insert(key.clone(), value.clone());
                } else {
                    diff.added.push(full_key);
                    existing_map.insert(key.clone(), value.clone());
                }
            }
            continue;
        }

        // scalar top-level fields (policy_key, owner_id, is_active, is_default, ...)
        if current_obj.get(field) != Some(patch_value) {
            diff.updated.push(field.clone());
        }
        current_obj.insert(field.clone(), patch_value.clone());
    }

    let mut merged: Policy = serde_json::from_value(current)
        .map_err(|e| GatewayError::BadRequest(format!("merged policy is invalid: {e}")))?;
    merged.backfill_severity_defaults();
    merged.decision_thresholds.validate()?;

    Ok((merged, diff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::{ContextAction, ContextRule, RolePermissions, SeverityComparatorWire};
    use crate::models::severity::SeverityComparator;
    use serde_json::json;

    #[test]
    fn context_rule_first_match_wins() {
        let mut policy = Policy::new("default", "owner-1");
        policy.context_rules.push(ContextRule {
            function: "get_mail".into(),
            condition: ContextCondition {
                severity: Some((SeverityComparatorWire(SeverityComparator::Ge), Severity::Medium)),
                ..Default::default()
            },
            action: ContextAction {
                block: true,
                reason: Some("first rule".into()),
            },
        });
        policy.context_rules.push(ContextRule {
            function: "get_mail".into(),
            condition: ContextCondition::default(),
            action: ContextAction {
                block: false,
                reason: Some("second rule".into()),
            },
        });

        let action = context_rule_action(&policy, "get_mail", &json!({}), Severity::High).unwrap();
        assert!(action.block);
        assert_eq!(action.reason.as_deref(), Some("first rule"));
    }

    #[test]
    fn contains_urls_detects_marker() {
        let mut policy = Policy::new("default", "owner-1");
        policy.context_rules.push(ContextRule {
            function: "fetch_page".into(),
            condition: ContextCondition {
                contains_urls: Some(true),
                ..Default::default()
            },
            action: ContextAction {
                block: true,
                reason: Some("url present".into()),
            },
        });

        let matched = context_rule_action(
            &policy,
            "fetch_page",
            &json!("visit https://example.com now"),
            Severity::Safe,
        );
        assert!(matched.is_some());

        let not_matched = context_rule_action(&policy, "fetch_page", &json!("no links here"), Severity::Safe);
        assert!(not_matched.is_none());
    }

    #[test]
    fn deep_merge_adds_new_role_without_touching_others() {
        let mut policy = Policy::new("default", "owner-1");
        policy.roles.insert(
            "admin".into(),
            RolePermissions {
                permissions: vec!["*".into()],
            },
        );

        let patch = json!({
            "roles": {
                "guest": { "permissions": [] }
            }
        });

        let (merged, diff) = deep_merge_update(&policy, &patch).unwrap();
        assert!(merged.roles.contains_key("admin"));
        assert!(merged.roles.contains_key("guest"));
        assert_eq!(diff.added, vec!["roles.guest".to_string()]);
    }

    #[test]
    fn deep_merge_is_idempotent() {
        let policy = Policy::new("default", "owner-1");
        let patch = json!({
            "roles": { "admin": { "permissions": ["*"] } },
            "decision_thresholds": { "block_threshold": 0.8 }
        });

        let (once, _) = deep_merge_update(&policy, &patch).unwrap();
        let (twice, _) = deep_merge_update(&once, &patch).unwrap();

        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn null_patch_value_removes_key() {
        let mut policy = Policy::new("default", "owner-1");
        policy.roles.insert("guest".into(), RolePermissions::default());

        let patch = json!({ "roles": { "guest": null } });
        let (merged, diff) = deep_merge_update(&policy, &patch).unwrap();
        assert!(!merged.roles.contains_key("guest"));
        assert_eq!(diff.removed, vec!["roles.guest".to_string()]);
    }
}
