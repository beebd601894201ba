//! Mock OIDC identity provider over wiremock.

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use session_core::config::OidcConfig;
use session_core::secrecy::SecretString;

use crate::token_builders::TokenBuilder;

/// A wiremock server speaking just enough of the token endpoint protocol.
pub struct MockIdp {
    server: MockServer,
}

impl MockIdp {
    /// Start the mock provider.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// The authority URL to put in [`OidcConfig`].
    #[must_use]
    pub fn authority(&self) -> String {
        self.server.uri()
    }

    /// An [`OidcConfig`] pointed at this mock.
    #[must_use]
    pub fn oidc_config(&self, redirect_uri: &str) -> OidcConfig {
        OidcConfig {
            authority: self.authority(),
            client_id: "test-client".to_string(),
            client_secret: SecretString::from("test-secret"),
            redirect_uri: redirect_uri.to_string(),
            post_logout_redirect_uri: redirect_uri.to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
        }
    }

    /// Accept authorization-code exchanges, issuing tokens for `user` built
    /// by the given builder, plus a refresh token.
    pub async fn accept_code_exchange(&self, user: &TokenBuilder) {
        let id_token = user.build();
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": id_token.clone(),
                "id_token": id_token,
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "mock-refresh-token"
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept refresh-token grants, issuing fresh tokens for `user`.
    pub async fn accept_refresh(&self, user: &TokenBuilder) {
        let id_token = user.build();
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": id_token.clone(),
                "id_token": id_token,
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
    }

    /// Reject refresh-token grants with `interaction_required`.
    pub async fn reject_refresh(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "interaction_required"})),
            )
            .mount(&self.server)
            .await;
    }

    /// Fail every token request at the transport level's nearest equivalent:
    /// a 503 from the provider.
    pub async fn go_down(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }
}
