//! E2E tests for demo-mode login flows.
//!
//! ## Test Categories
//!
//! - **Login**: roster selection, synthetic token shape, loading states
//! - **User switch**: role-set changes and the profile-updated event
//! - **Concurrency**: overlapping login attempts
//!
//! ## Test Naming
//!
//! Tests follow the convention: `test_<feature>_<scenario>_<expected_result>`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_core::broadcast::EventKind;
use session_core::errors::AuthError;
use session_core::manager::LoginOutcome;
use session_core::token;
use session_test_utils::{settle, StateAssertions, TestRealm};
use tokio::sync::mpsc;

const SHELL: &str = "https://shell.example";

#[tokio::test]
async fn test_login_authenticates_first_roster_user() -> Result<(), anyhow::Error> {
    // Arrange
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    let before = chrono::Utc::now().timestamp();

    // Act
    let outcome = shell.login().await?;

    // Assert
    let LoginOutcome::Completed(result) = outcome else {
        anyhow::bail!("demo login should complete without interaction");
    };
    let roster = shell.demo_users().ok_or_else(|| anyhow::anyhow!("demo roster"))?;
    assert_eq!(result.user.id, roster.first().map(|u| u.id.clone()).unwrap_or_default());

    let state = shell.state();
    state.assert_authenticated_as("demo-user-1").assert_idle();

    // Synthetic token expires about an hour out.
    let access = state.access_token.ok_or_else(|| anyhow::anyhow!("token"))?;
    let exp = token::decode_payload(&access)?.exp.ok_or_else(|| anyhow::anyhow!("exp"))?;
    assert!((exp - before - 3600).abs() <= 5, "exp should be ~now+3600s");

    Ok(())
}

#[tokio::test]
async fn test_login_shows_loading_state_during_latency() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);

    let observed_loading = Arc::new(Mutex::new(Vec::new()));
    let sink = observed_loading.clone();
    let _sub = shell.subscribe(move |state| {
        if let Ok(mut v) = sink.lock() {
            v.push(state.is_loading);
        }
    });

    shell.login().await?;

    let observed = observed_loading.lock().map_err(|_| anyhow::anyhow!("lock"))?;
    // Loading turned on for the simulated round trip, then off.
    assert_eq!(observed.first(), Some(&true));
    assert_eq!(observed.last(), Some(&false));
    Ok(())
}

#[tokio::test]
async fn test_switch_user_reflects_new_role_set() -> Result<(), anyhow::Error> {
    // Arrange
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;

    let (tx, mut profile_events) = mpsc::unbounded_channel();
    shell
        .broadcaster()
        .subscribe(EventKind::UserProfileUpdated, move |message| {
            let _ = tx.send(message.clone());
        });

    // Act
    shell.switch_user(2).await?;

    // Assert
    let state = shell.state();
    state.assert_authenticated_as("demo-user-3");
    let user = state.user.ok_or_else(|| anyhow::anyhow!("user"))?;
    assert!(user.has_role("manager"));
    assert!(!user.has_role("admin"));

    let event = tokio::time::timeout(Duration::from_secs(1), profile_events.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile event"))?;
    let payload = event.payload.ok_or_else(|| anyhow::anyhow!("payload"))?;
    assert_eq!(payload["id"], "demo-user-3");

    Ok(())
}

#[tokio::test]
async fn test_switch_user_out_of_bounds_fails_and_keeps_session() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;

    let result = shell.switch_user(42).await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidIndex { index: 42, roster_len: 3 })
    ));

    // The failed switch is reflected as an error, not a dropped session
    // invariant: user and token are still the previous ones.
    let state = shell.state();
    assert!(state.error.is_some());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_logins_initiate_exactly_one_flow() -> Result<(), anyhow::Error> {
    // Arrange
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);

    let (tx, mut login_events) = mpsc::unbounded_channel();
    shell
        .broadcaster()
        .subscribe(EventKind::LoginSuccess, move |message| {
            let _ = tx.send(message.clone());
        });

    // Act: two racing logins.
    let (first, second) = tokio::join!(shell.login(), shell.login());

    // Assert: one completed, one rejected, one broadcast.
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(AuthError::AlreadyInProgress))));

    settle().await;
    assert!(login_events.try_recv().is_ok(), "one LOGIN_SUCCESS expected");
    assert!(login_events.try_recv().is_err(), "no second LOGIN_SUCCESS");

    Ok(())
}

#[tokio::test]
async fn test_get_access_token_is_fresh_after_login() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);

    assert_eq!(shell.get_access_token().await, None);

    shell.login().await?;
    let token_str = shell
        .get_access_token()
        .await
        .ok_or_else(|| anyhow::anyhow!("token"))?;
    assert!(!token::is_expired(&token_str, chrono::Utc::now().timestamp()));

    Ok(())
}

#[tokio::test]
async fn test_logout_clears_state_and_is_idempotent() -> Result<(), anyhow::Error> {
    let realm = TestRealm::new();
    let shell = realm.spawn_context(SHELL, &[]);
    shell.login().await?;

    let (tx, mut logout_events) = mpsc::unbounded_channel();
    shell
        .broadcaster()
        .subscribe(EventKind::LogoutSuccess, move |message| {
            let _ = tx.send(message.clone());
        });

    shell.logout().await?;
    shell.state().assert_unauthenticated();

    // Second logout: state untouched, no broadcast.
    let before = shell.state();
    shell.logout().await?;
    assert_eq!(shell.state(), before);

    settle().await;
    assert!(logout_events.try_recv().is_ok(), "one LOGOUT_SUCCESS expected");
    assert!(logout_events.try_recv().is_err(), "no second LOGOUT_SUCCESS");

    Ok(())
}
