//! Function-chaining gate.

use crate::models::policy::Policy;

/// Whether `src` is permitted to trigger `tgt` as its next function call.
/// Block-list always wins; absent any configured rule the default is
/// permissive.
pub fn chaining_permits(policy: &Policy, src: &str, tgt: &str) -> bool {
    let Some(rule) = policy.function_chaining.get(src) else {
        return true;
    };

    if rule.blocked_targets.iter().any(|t| t == "*") {
        return false;
    }
    if rule.blocked_targets.iter().any(|t| t == tgt) {
        return false;
    }
    if rule.allowed_targets.iter().any(|t| t == "*" || t == tgt) {
        return true;
    }

    true
}
