//! Direct-upload of member files to the platform

pub mod orchestrator;
pub mod request;

pub use orchestrator::{DeletePolicy, UploadError, UploadOrchestrator, UploadReport, UploadState};
pub use request::{ContentSpool, ContentStream, FileMetadata, UploadContent, UploadRequest};
