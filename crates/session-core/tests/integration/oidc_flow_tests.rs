//! E2E tests for the OIDC adapter's interactive and silent flows, against a
//! mock identity provider.

use std::sync::Arc;
use std::time::Duration;

use session_core::config::{Deployment, ProviderConfig, SessionConfig, TokenPolicy};
use session_core::errors::AuthError;
use session_core::manager::{LoginOutcome, SessionManager};
use session_core::provider::RedirectCallback;
use session_core::token;
use session_test_utils::{MockIdp, StateAssertions, TestRealm, TokenBuilder};
use tokio::sync::oneshot;

const SHELL: &str = "https://shell.example";

fn oidc_session_config(idp: &MockIdp) -> SessionConfig {
    SessionConfig {
        deployment: Deployment::Development,
        provider: ProviderConfig::Oidc(idp.oidc_config(SHELL)),
        local_origin: SHELL.to_string(),
        peer_origins: Vec::new(),
        policy: TokenPolicy::default().with_interaction_timeout(Duration::from_millis(200)),
    }
}

fn callback(code: &str) -> RedirectCallback {
    RedirectCallback {
        code: code.to_string(),
        state: None,
    }
}

async fn spawn_oidc(idp: &MockIdp) -> (TestRealm, Arc<SessionManager>) {
    let realm = TestRealm::new();
    let manager = realm.spawn_context_with(oidc_session_config(idp));
    (realm, manager)
}

#[tokio::test]
async fn test_login_without_session_requires_redirect() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    let outcome = shell.login().await?;
    let LoginOutcome::RedirectRequired(url) = outcome else {
        anyhow::bail!("first OIDC login must go interactive");
    };

    assert!(url.starts_with(&format!("{}/authorize?", idp.authority())));
    assert!(url.contains("client_id=test-client"));
    assert!(url.contains("response_type=code"));

    Ok(())
}

#[tokio::test]
async fn test_redirect_callback_completes_login() -> Result<(), anyhow::Error> {
    // Arrange
    let idp = MockIdp::start().await;
    let alice = TokenBuilder::new().subject("alice").roles(&["user"]);
    idp.accept_code_exchange(&alice).await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    // Act: the host navigated, the provider called back with a code.
    let result = shell.complete_redirect_login(callback("auth-code-1")).await?;

    // Assert
    assert_eq!(result.user.id, "alice");
    shell.state().assert_authenticated_as("alice").assert_idle();

    Ok(())
}

#[tokio::test]
async fn test_popup_result_completes_login() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let alice = TokenBuilder::new().subject("alice");
    idp.accept_code_exchange(&alice).await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    let (tx, rx) = oneshot::channel();
    let login = shell.login_popup(rx);
    tx.send(Ok(callback("popup-code")))
        .map_err(|_| anyhow::anyhow!("send"))?;

    let result = login.await?;
    assert_eq!(result.user.id, "alice");
    shell.state().assert_authenticated_as("alice");

    Ok(())
}

#[tokio::test]
async fn test_closed_popup_is_user_cancelled() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    let (tx, rx) = oneshot::channel::<session_core::errors::Result<RedirectCallback>>();
    drop(tx); // the user closed the window

    let result = shell.login_popup(rx).await;
    assert!(matches!(result, Err(AuthError::UserCancelled)));
    shell.state().assert_unauthenticated();
    shell.state().assert_error_contains("cancelled");

    Ok(())
}

#[tokio::test]
async fn test_unanswered_popup_times_out() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    let (_tx, rx) = oneshot::channel();
    let result = shell.login_popup(rx).await;

    assert!(matches!(result, Err(AuthError::InteractionTimeout)));
    shell.state().assert_error_contains("timed out");

    Ok(())
}

#[tokio::test]
async fn test_get_access_token_renews_expiring_token_silently() -> Result<(), anyhow::Error> {
    // Arrange: the interactive login issues a token already inside the
    // refresh threshold; the refresh grant issues a fresh one.
    let idp = MockIdp::start().await;
    let now = chrono::Utc::now().timestamp();
    let stale = TokenBuilder::new().subject("alice").expires_at(now + 60);
    let fresh = TokenBuilder::new().subject("alice").expires_at(now + 3600);
    idp.accept_code_exchange(&stale).await;
    idp.accept_refresh(&fresh).await;
    let (_realm, shell) = spawn_oidc(&idp).await;
    shell.complete_redirect_login(callback("code")).await?;

    // Act
    let access = shell
        .get_access_token()
        .await
        .ok_or_else(|| anyhow::anyhow!("token"))?;

    // Assert: the returned token is the renewed one.
    let exp = token::decode_payload(&access)?
        .exp
        .ok_or_else(|| anyhow::anyhow!("exp"))?;
    assert!(exp >= now + 3000, "expected the refreshed token");

    Ok(())
}

#[tokio::test]
async fn test_get_access_token_returns_none_when_renewal_needs_interaction(
) -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let now = chrono::Utc::now().timestamp();
    let stale = TokenBuilder::new().subject("alice").expires_at(now + 60);
    idp.accept_code_exchange(&stale).await;
    idp.reject_refresh().await;
    let (_realm, shell) = spawn_oidc(&idp).await;
    shell.complete_redirect_login(callback("code")).await?;

    // Renewal is rejected; the caller gets None, never an exception.
    assert_eq!(shell.get_access_token().await, None);

    Ok(())
}

#[tokio::test]
async fn test_provider_outage_surfaces_as_network_error() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    idp.go_down().await;
    let (_realm, shell) = spawn_oidc(&idp).await;

    let result = shell.complete_redirect_login(callback("code")).await;
    assert!(matches!(result, Err(AuthError::Network(_))));

    let state = shell.state();
    state.assert_idle().assert_error_contains("Network");
    assert!(!state.is_authenticated);

    Ok(())
}

#[tokio::test]
async fn test_logout_returns_end_session_url() -> Result<(), anyhow::Error> {
    let idp = MockIdp::start().await;
    let alice = TokenBuilder::new().subject("alice");
    idp.accept_code_exchange(&alice).await;
    let (_realm, shell) = spawn_oidc(&idp).await;
    shell.complete_redirect_login(callback("code")).await?;

    let end_session = shell.logout().await?;

    // Local state cleared first, regardless of what the host does with the
    // end-session URL.
    shell.state().assert_unauthenticated();
    let url = end_session.ok_or_else(|| anyhow::anyhow!("end-session URL"))?;
    assert!(url.starts_with(&format!("{}/logout?", idp.authority())));

    Ok(())
}
