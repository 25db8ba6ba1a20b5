use super::token_store::TokenRefresher;
use super::types::{AuthError, TokenExchangeFailure, TokenGrant, TokenResponse};
use crate::config::Config;
use crate::platform::{GatewayResponse, HttpGateway, PlatformEndpoints};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, warn};

/// OAuth2 client registration for this project
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl OAuthClientConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Names of the required client settings that are empty
    fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.is_empty() {
            missing.push("client_secret");
        }
        missing
    }
}

impl From<&Config> for OAuthClientConfig {
    fn from(config: &Config) -> Self {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri(),
        )
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Client for the platform's OAuth2 token endpoint
#[derive(Clone)]
pub struct PlatformOAuthClient {
    config: OAuthClientConfig,
    endpoints: PlatformEndpoints,
    gateway: HttpGateway,
}

impl PlatformOAuthClient {
    pub fn new(config: OAuthClientConfig, endpoints: PlatformEndpoints, gateway: HttpGateway) -> Self {
        Self {
            config,
            endpoints,
            gateway,
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Exchange an authorization code for a token set.
    ///
    /// Fails with [`AuthError::Configuration`] before any network call when
    /// the code or client credentials are empty.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let mut missing = self.config.missing_credentials();
        if code.is_empty() {
            missing.push("authorization code");
        }
        if !missing.is_empty() {
            let missing = missing.join(", ");
            error!(missing = %missing, "Client credentials or code are unavailable");
            return Err(AuthError::Configuration(missing));
        }

        #[derive(Serialize)]
        struct AuthorizationCodeRequest<'a> {
            grant_type: &'a str,
            redirect_uri: &'a str,
            code: &'a str,
        }

        let request = AuthorizationCodeRequest {
            grant_type: "authorization_code",
            redirect_uri: &self.config.redirect_uri,
            code,
        };

        debug!(code_length = code.len(), "Exchanging authorization code");
        let response = self.post_token_request(&request).await?;

        decode_token_response(&response).map_err(AuthError::TokenExchange)
    }

    /// Refresh access token using refresh token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let missing = self.config.missing_credentials();
        if !missing.is_empty() {
            return Err(AuthError::Configuration(missing.join(", ")));
        }

        #[derive(Serialize)]
        struct RefreshRequest<'a> {
            grant_type: &'a str,
            refresh_token: &'a str,
        }

        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        };

        let response = self.post_token_request(&request).await?;

        decode_token_response(&response).map_err(AuthError::Refresh)
    }

    async fn post_token_request<T: Serialize>(
        &self,
        form: &T,
    ) -> Result<GatewayResponse, AuthError> {
        Ok(self
            .gateway
            .post_form_basic(
                &self.endpoints.token(),
                &self.config.client_id,
                &self.config.client_secret,
                form,
            )
            .await?)
    }
}

#[async_trait]
impl TokenRefresher for PlatformOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.refresh_access_token(refresh_token).await
    }
}

/// The token endpoint's status code is not trusted; only the body decides.
fn decode_token_response(response: &GatewayResponse) -> Result<TokenGrant, TokenExchangeFailure> {
    match TokenResponse::decode(response.body()) {
        Some(TokenResponse::Success(grant)) if grant.is_usable() => Ok(grant),
        Some(TokenResponse::Success(grant)) => {
            warn!(
                status = response.status().as_u16(),
                expires_in = grant.expires_in,
                "Token response carried empty tokens or an invalid lifetime"
            );
            Err(TokenExchangeFailure::Malformed {
                status: response.status().as_u16(),
            })
        }
        Some(TokenResponse::Failure {
            error,
            error_description,
        }) => {
            debug!(
                error = %error,
                status = response.status().as_u16(),
                "Error in token exchange"
            );
            Err(TokenExchangeFailure::Rejected {
                error,
                description: error_description,
            })
        }
        None => {
            warn!(
                status = response.status().as_u16(),
                "Neither token nor error info in platform response"
            );
            Err(TokenExchangeFailure::Malformed {
                status: response.status().as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn get_test_client(client_id: &str, client_secret: &str) -> PlatformOAuthClient {
        PlatformOAuthClient::new(
            OAuthClientConfig::new(
                client_id.to_string(),
                client_secret.to_string(),
                "http://127.0.0.1:5000/complete".to_string(),
            ),
            // Unroutable: any request attempted here would fail with a transport error
            PlatformEndpoints::new("http://127.0.0.1:9").unwrap(),
            HttpGateway::new(Duration::from_secs(1)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_missing_secret_fails_before_network() {
        let client = get_test_client("id", "");
        match client.exchange_code("abc123").await {
            Err(AuthError::Configuration(missing)) => assert_eq!(missing, "client_secret"),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_code_and_id_are_reported_together() {
        let client = get_test_client("", "secret");
        match client.exchange_code("").await {
            Err(AuthError::Configuration(missing)) => {
                assert_eq!(missing, "client_id, authorization code")
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let config = OAuthClientConfig::new("id".into(), "hunter2".into(), "http://x/complete".into());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
