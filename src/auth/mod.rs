pub mod exchanger;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use exchanger::AuthExchanger;
pub use oauth::{OAuthClientConfig, PlatformOAuthClient};
pub use token_store::{TokenRefresher, TokenStore};
pub use types::{AuthError, TokenExchangeFailure, TokenGrant, TokenResponse};
