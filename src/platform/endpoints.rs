use url::Url;

/// Default platform host
pub const DEFAULT_PLATFORM_BASE_URL: &str = "https://www.openhumans.org";

const TOKEN_PATH: &str = "/oauth2/token/";
const AUTHORIZE_PATH: &str = "/direct-sharing/projects/oauth2/authorize/";
const DIRECT_SHARING_PATH: &str = "/api/direct-sharing";

/// Platform endpoint URLs, all derived from one base URL
#[derive(Debug, Clone)]
pub struct PlatformEndpoints {
    base_url: String,
}

impl PlatformEndpoints {
    /// Create endpoints rooted at `base_url` (e.g. `https://www.openhumans.org`)
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(base_url)?;
        if parsed.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// OAuth2 token endpoint (code and refresh grants)
    pub fn token(&self) -> String {
        format!("{}{}", self.base_url, TOKEN_PATH)
    }

    /// Member identity lookup for an access token
    pub fn exchange_member(&self) -> String {
        self.direct_sharing("/project/exchange-member/")
    }

    pub fn delete_files(&self) -> String {
        self.direct_sharing("/project/files/delete/")
    }

    /// First phase of a direct upload: request a pre-signed target
    pub fn direct_upload(&self) -> String {
        self.direct_sharing("/project/files/upload/direct/")
    }

    /// Last phase of a direct upload: confirm the transfer
    pub fn upload_complete(&self) -> String {
        self.direct_sharing("/project/files/upload/complete/")
    }

    /// Browser-facing authorization URL that sends the member back to
    /// `redirect_uri` with a `code` query parameter
    pub fn authorize_url(&self, client_id: &str, redirect_uri: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, AUTHORIZE_PATH))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri);
        Ok(url)
    }

    fn direct_sharing(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, DIRECT_SHARING_PATH, path)
    }
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PLATFORM_BASE_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = PlatformEndpoints::default();
        assert_eq!(endpoints.token(), "https://www.openhumans.org/oauth2/token/");
        assert_eq!(
            endpoints.exchange_member(),
            "https://www.openhumans.org/api/direct-sharing/project/exchange-member/"
        );
        assert_eq!(
            endpoints.direct_upload(),
            "https://www.openhumans.org/api/direct-sharing/project/files/upload/direct/"
        );
        assert_eq!(
            endpoints.upload_complete(),
            "https://www.openhumans.org/api/direct-sharing/project/files/upload/complete/"
        );
        assert_eq!(
            endpoints.delete_files(),
            "https://www.openhumans.org/api/direct-sharing/project/files/delete/"
        );
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let endpoints = PlatformEndpoints::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(endpoints.token(), "http://127.0.0.1:8080/oauth2/token/");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(PlatformEndpoints::new("not a url").is_err());
        assert!(PlatformEndpoints::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_authorize_url() {
        let endpoints = PlatformEndpoints::default();
        let url = endpoints
            .authorize_url("client-1", "http://127.0.0.1:5000/complete")
            .unwrap();

        assert_eq!(url.path(), "/direct-sharing/projects/oauth2/authorize/");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params.get("client_id"), Some(&"client-1".to_string()));
        assert_eq!(params.get("response_type"), Some(&"code".to_string()));
        assert_eq!(
            params.get("redirect_uri"),
            Some(&"http://127.0.0.1:5000/complete".to_string())
        );
    }
}
