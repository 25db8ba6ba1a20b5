use super::oauth::PlatformOAuthClient;
use super::types::AuthError;
use crate::members::{Member, MemberDirectory};
use crate::platform::{ExchangeMemberResponse, HttpGateway, PlatformEndpoints};
use reqwest::StatusCode;
use tracing::{info, instrument};

/// Turns an authorization code into a stored [`Member`]
pub struct AuthExchanger {
    oauth_client: PlatformOAuthClient,
    endpoints: PlatformEndpoints,
    gateway: HttpGateway,
    directory: MemberDirectory,
}

impl AuthExchanger {
    pub fn new(
        oauth_client: PlatformOAuthClient,
        endpoints: PlatformEndpoints,
        gateway: HttpGateway,
        directory: MemberDirectory,
    ) -> Self {
        Self {
            oauth_client,
            endpoints,
            gateway,
            directory,
        }
    }

    pub fn oauth_client(&self) -> &PlatformOAuthClient {
        &self.oauth_client
    }

    /// Exchange `code` for tokens, look up the member they belong to, and
    /// create or re-authorize that member.
    #[instrument(skip_all, fields(code_length = code.len()))]
    pub async fn exchange_code_for_member(&self, code: &str) -> Result<Member, AuthError> {
        let grant = self.oauth_client.exchange_code(code).await?;
        let member_id = self.fetch_member_id(&grant.access_token).await?;

        let member = self
            .directory
            .upsert(
                &member_id,
                grant.access_token,
                grant.refresh_token,
                grant.expires_in,
            )
            .await?;

        info!(member_id = %member.member_id, "Member authorized");
        Ok(member)
    }

    /// Ask the platform which project member an access token belongs to
    pub async fn fetch_member_id(&self, access_token: &str) -> Result<String, AuthError> {
        let response = self
            .gateway
            .get_with_token(&self.endpoints.exchange_member(), access_token)
            .await?;

        if response.status() != StatusCode::OK {
            return Err(AuthError::IdentityFetch {
                url: response.url().to_string(),
                status: response.status().as_u16(),
            });
        }

        let identity: ExchangeMemberResponse = response.json()?;
        Ok(identity.project_member_id)
    }
}
