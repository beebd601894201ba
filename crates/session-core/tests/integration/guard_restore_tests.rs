//! E2E tests for session restore policy and route guarding.

use session_core::guard::{AccessDecision, RedirectTarget};
use session_core::state::UserProfile;
use session_core::storage::{StorageBackend, TOKEN_KEY, USER_KEY};
use session_test_utils::{StateAssertions, TestRealm, TokenBuilder};

const SHELL: &str = "https://shell.example";

fn persisted_user() -> String {
    serde_json::to_string(&UserProfile {
        id: "test-user".to_string(),
        email: "test-user@test.example".to_string(),
        name: "Test User".to_string(),
        roles: vec!["user".to_string()],
        permissions: vec!["read".to_string()],
        tenant_id: "test-tenant".to_string(),
        preferred_username: "test-user@test.example".to_string(),
    })
    .unwrap_or_default()
}

#[tokio::test]
async fn test_expired_persisted_token_denies_access_after_restore() -> Result<(), anyhow::Error> {
    // Arrange: a persisted session whose token expiry is in the past.
    let realm = TestRealm::new();
    let storage = realm.storage();
    storage.set(TOKEN_KEY, &TokenBuilder::new().expired().build())?;
    storage.set(USER_KEY, &persisted_user())?;

    // Act: startup restore runs inside the kernel constructor.
    let shell = realm.spawn_context(SHELL, &[]);

    // Assert: the dead session was not resurrected and the guard denies.
    shell.state().assert_unauthenticated();
    assert!(!shell.guard().can_access(None, None));
    assert_eq!(storage.get(TOKEN_KEY)?, None, "dead session must be cleared");

    Ok(())
}

#[tokio::test]
async fn test_live_persisted_token_restores_session() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let storage = realm.storage();
    storage.set(TOKEN_KEY, &TokenBuilder::new().build())?;
    storage.set(USER_KEY, &persisted_user())?;

    let shell = realm.spawn_context(SHELL, &[]);

    shell.state().assert_authenticated_as("test-user");
    assert!(shell.guard().can_access(None, None));

    Ok(())
}

#[tokio::test]
async fn test_guard_permission_requirement_denies_read_only_user() -> Result<(), anyhow::Error> {
    // Arrange: demo-user-2 holds permissions = ["read"].
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;
    shell.switch_user(1).await?;

    // Assert
    let guard = shell.guard();
    assert!(guard.can_access(None, Some(&["read"])));
    assert!(!guard.can_access(None, Some(&["write"])));

    Ok(())
}

#[tokio::test]
async fn test_guard_role_or_semantics_end_to_end() -> Result<(), anyhow::Error> {
    // demo-user-3 is manager+user.
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;
    shell.switch_user(2).await?;

    let guard = shell.guard();
    assert!(guard.can_access(Some(&["admin", "manager"]), None));
    assert!(!guard.can_access(Some(&["admin"]), None));

    Ok(())
}

#[tokio::test]
async fn test_denied_navigation_records_return_url_for_login() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);

    let decision = shell.guard().check("/reports/weekly", None, None);
    assert_eq!(
        decision,
        AccessDecision::Deny {
            redirect: RedirectTarget::Login
        }
    );

    shell.login().await?;
    assert_eq!(
        shell.take_return_url().as_deref(),
        Some("/reports/weekly"),
        "return URL survives until consumed"
    );
    assert_eq!(shell.take_return_url(), None, "consumed once");

    Ok(())
}

#[tokio::test]
async fn test_insufficient_role_redirects_to_unauthorized() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;
    shell.switch_user(1).await?; // plain user

    let decision = shell.guard().check("/admin", Some(&["admin"]), None);
    assert_eq!(
        decision,
        AccessDecision::Deny {
            redirect: RedirectTarget::Unauthorized
        }
    );

    Ok(())
}
