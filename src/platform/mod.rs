//! HTTP access to the data-sharing platform

pub mod endpoints;
pub mod gateway;
pub mod types;

pub use endpoints::{PlatformEndpoints, DEFAULT_PLATFORM_BASE_URL};
pub use gateway::{redact_url, GatewayError, GatewayResponse, HttpGateway};
pub use types::{ExchangeMemberResponse, UploadTarget};
