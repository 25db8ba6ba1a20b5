use bytes::Bytes;
use reqwest::{header, Body, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("oh-data-source/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised before a usable HTTP status is available
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Status and buffered body of a platform response
#[derive(Debug)]
pub struct GatewayResponse {
    url: String,
    status: StatusCode,
    body: Bytes,
}

impl GatewayResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Endpoint URL with the query string removed
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|source| GatewayError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}

/// Thin HTTP wrapper for platform calls.
///
/// Access tokens travel as the `access_token` query parameter, the way the
/// direct-sharing API expects. Every URL that ends up in an error or a log
/// line has its query stripped first.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
}

impl HttpGateway {
    /// Create a gateway whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(GatewayError::ClientBuild)?;

        Ok(Self { client })
    }

    /// GET authenticated with an access token
    pub async fn get_with_token(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let request = self
            .client
            .get(url)
            .query(&[("access_token", access_token)]);
        self.send("GET", url, request).await
    }

    /// Form-encoded POST authenticated with an access token
    pub async fn post_form_with_token<T: Serialize + ?Sized>(
        &self,
        url: &str,
        access_token: &str,
        form: &T,
    ) -> Result<GatewayResponse, GatewayError> {
        let request = self
            .client
            .post(url)
            .query(&[("access_token", access_token)])
            .form(form);
        self.send("POST", url, request).await
    }

    /// Form-encoded POST with HTTP Basic client authentication
    pub async fn post_form_basic<T: Serialize + ?Sized>(
        &self,
        url: &str,
        client_id: &str,
        client_secret: &str,
        form: &T,
    ) -> Result<GatewayResponse, GatewayError> {
        let request = self
            .client
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .form(form);
        self.send("POST", url, request).await
    }

    /// Unauthenticated PUT of a raw body; the URL itself carries the credential
    pub async fn put(
        &self,
        url: &str,
        body: Body,
        content_length: Option<u64>,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut request = self.client.put(url).body(body);
        if let Some(length) = content_length {
            request = request.header(header::CONTENT_LENGTH, length);
        }
        self.send("PUT", url, request).await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<GatewayResponse, GatewayError> {
        let url = redact_url(url);
        debug!(method, url = %url, "Sending platform request");

        let response = request.send().await.map_err(|e| GatewayError::Transport {
            url: url.clone(),
            source: e.without_url(),
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| GatewayError::Transport {
            url: url.clone(),
            source: e.without_url(),
        })?;

        debug!(method, url = %url, status = status.as_u16(), "Platform responded");

        Ok(GatewayResponse { url, status, body })
    }
}

/// Strip query string and fragment so tokens and signatures never leak
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}
