pub mod auth;
pub mod config;
pub mod http_server;
pub mod members;
pub mod platform;
pub mod session;
pub mod upload;

pub use auth::{AuthError, AuthExchanger, OAuthClientConfig, PlatformOAuthClient, TokenStore};
pub use config::Config;
pub use http_server::{create_app, run_server, AppState};
pub use members::{InMemoryMemberRepository, JsonFileMemberRepository, Member, MemberDirectory};
pub use platform::{HttpGateway, PlatformEndpoints};
pub use upload::{DeletePolicy, UploadError, UploadOrchestrator, UploadRequest, UploadState};
