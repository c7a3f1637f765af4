//! Policy store round trips through the public `PolicyStore` port: create,
//! patch via deep merge, and re-fetch, confirming the diff and the store's
//! invariants survive a full create → update → get cycle.

use hipocap_guard::models::policy::Policy;
use hipocap_guard::ports::store::PolicyStore;
use hipocap_guard::store::InMemoryPolicyStore;
use serde_json::json;

#[tokio::test]
async fn create_then_patch_then_refetch_reflects_the_merge() {
    let store = InMemoryPolicyStore::new();
    let policy = store.create(Policy::new("default", "owner-1")).await.unwrap();

    let patch = json!({
        "roles": { "guest": { "permissions": ["read_mail"] } },
        "decision_thresholds": { "block_threshold": 0.85 }
    });
    let (updated, diff) = store.update(policy.id, patch).await.unwrap();
    assert_eq!(diff.added, vec!["roles.guest".to_string()]);
    assert!(diff.updated.contains(&"decision_thresholds.block_threshold".to_string()));

    let fetched = store.get_by_key("default", "owner-1").await.unwrap();
    assert_eq!(fetched.id, updated.id);
    assert!(fetched.roles.contains_key("guest"));
    assert_eq!(fetched.decision_thresholds.block_threshold, 0.85);
}

#[tokio::test]
async fn duplicate_policy_key_for_the_same_owner_is_rejected() {
    let store = InMemoryPolicyStore::new();
    store.create(Policy::new("default", "owner-1")).await.unwrap();
    assert!(store.create(Policy::new("default", "owner-1")).await.is_err());

    // a different owner may reuse the same key.
    assert!(store.create(Policy::new("default", "owner-2")).await.is_ok());
}

#[tokio::test]
async fn repeated_identical_patch_is_idempotent_through_the_store() {
    let store = InMemoryPolicyStore::new();
    let policy = store.create(Policy::new("default", "owner-1")).await.unwrap();

    let patch = json!({ "roles": { "admin": { "permissions": ["*"] } } });
    let (first, _) = store.update(policy.id, patch.clone()).await.unwrap();
    let (second, _) = store.update(policy.id, patch).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}
