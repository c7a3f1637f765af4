//! RBAC gate: a single role/permission predicate this gateway needs.

use crate::models::policy::Policy;

/// `role` may call `function_name` if the role's permission list grants it
/// (`"*"` or an explicit entry), OR the function's own `allowed_roles` names
/// the role.
pub fn role_permits(policy: &Policy, role: &str, function_name: &str) -> bool {
    let via_role = policy
        .roles
        .get(role)
        .map(|perms| perms.allows(function_name))
        .unwrap_or(false);

    let via_function = policy
        .functions
        .get(function_name)
        .map(|f| f.allowed_roles.iter().any(|r| r == role))
        .unwrap_or(false);

    via_role || via_function
}
