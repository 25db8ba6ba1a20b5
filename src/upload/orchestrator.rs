use super::request::UploadRequest;
use crate::auth::{AuthError, TokenStore};
use crate::members::Member;
use crate::platform::types::{CompleteUploadForm, DeleteFilesForm, DirectUploadForm};
use crate::platform::{redact_url, GatewayError, HttpGateway, PlatformEndpoints, UploadTarget};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Phases of one direct upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Deleting,
    RequestingTarget,
    Transferring,
    Completing,
    Done,
    Failed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Idle => "idle",
            UploadState::Deleting => "deleting existing files",
            UploadState::RequestingTarget => "requesting upload target",
            UploadState::Transferring => "transferring file",
            UploadState::Completing => "completing upload",
            UploadState::Done => "done",
            UploadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How the result of the delete-existing-files step is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Ignore the response; a failed delete does not block the upload
    #[default]
    BestEffort,
    /// Abort the upload unless the delete call returns 2xx
    Strict,
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(DeletePolicy::BestEffort),
            "strict" => Ok(DeletePolicy::Strict),
            other => Err(format!(
                "unknown delete policy '{}', expected 'best-effort' or 'strict'",
                other
            )),
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload request is invalid: {0}")]
    InvalidRequest(String),

    #[error("Could not obtain an access token while {phase}: {source}")]
    Token {
        phase: UploadState,
        #[source]
        source: AuthError,
    },

    #[error("Deleting existing files at {url} failed with status {status}")]
    Delete { url: String, status: u16 },

    #[error("Starting upload at {url} failed with status {status}")]
    Initiation { url: String, status: u16 },

    #[error("Uploading to target {url} failed with status {status}")]
    Transfer { url: String, status: u16 },

    #[error("Completing upload at {url} failed with status {status}")]
    Completion { url: String, status: u16 },

    #[error("Upload failed while {phase}: {source}")]
    Gateway {
        phase: UploadState,
        #[source]
        source: GatewayError,
    },
}

impl UploadError {
    /// Phase that was running when the upload failed
    pub fn phase(&self) -> UploadState {
        match self {
            UploadError::InvalidRequest(_) => UploadState::Idle,
            UploadError::Delete { .. } => UploadState::Deleting,
            UploadError::Initiation { .. } => UploadState::RequestingTarget,
            UploadError::Transfer { .. } => UploadState::Transferring,
            UploadError::Completion { .. } => UploadState::Completing,
            UploadError::Token { phase, .. } | UploadError::Gateway { phase, .. } => *phase,
        }
    }

    /// HTTP status returned by the platform, if the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Delete { status, .. }
            | UploadError::Initiation { status, .. }
            | UploadError::Transfer { status, .. }
            | UploadError::Completion { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the platform rejected the access token
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub member_id: String,
    pub filename: String,
    /// Platform-side file id
    pub file_id: String,
    pub state: UploadState,
}

/// Replaces a member's file on the platform using the direct-upload protocol.
///
/// The calls run strictly in order: delete existing files, request a
/// pre-signed target, PUT the content, confirm completion. Any failure after
/// the delete step aborts the remaining calls; nothing is rolled back.
pub struct UploadOrchestrator {
    gateway: HttpGateway,
    endpoints: PlatformEndpoints,
    token_store: Arc<TokenStore>,
    delete_policy: DeletePolicy,
}

impl UploadOrchestrator {
    pub fn new(
        gateway: HttpGateway,
        endpoints: PlatformEndpoints,
        token_store: Arc<TokenStore>,
        delete_policy: DeletePolicy,
    ) -> Self {
        Self {
            gateway,
            endpoints,
            token_store,
            delete_policy,
        }
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    #[instrument(
        skip_all,
        fields(run_id = %Uuid::new_v4(), member_id = %member.member_id, filename = %request.filename)
    )]
    pub async fn upload(
        &self,
        member: &Member,
        request: UploadRequest,
    ) -> Result<UploadReport, UploadError> {
        let mut state = UploadState::Idle;
        let result = self.run(member, request, &mut state).await;

        if let Err(e) = &result {
            warn!(phase = %state, error = %e, "Upload failed");
            transition(&mut state, UploadState::Failed);
        }

        result
    }

    async fn run(
        &self,
        member: &Member,
        request: UploadRequest,
        state: &mut UploadState,
    ) -> Result<UploadReport, UploadError> {
        if request.filename.trim().is_empty() {
            return Err(UploadError::InvalidRequest("filename is required".to_string()));
        }

        let filename = request.filename.clone();

        transition(state, UploadState::Deleting);
        let access_token = self.access_token(member, UploadState::Deleting).await?;
        self.delete_existing_files(member, &access_token).await?;

        transition(state, UploadState::RequestingTarget);
        let target = self.request_target(member, &access_token, &request).await?;

        transition(state, UploadState::Transferring);
        self.transfer(&target, request).await?;

        // The transfer may outlast the token's remaining lifetime
        transition(state, UploadState::Completing);
        let access_token = self.access_token(member, UploadState::Completing).await?;
        self.complete(member, &access_token, &target).await?;

        transition(state, UploadState::Done);
        info!(file_id = %target.file_id, "Upload done");
        Ok(UploadReport {
            member_id: member.member_id.clone(),
            filename,
            file_id: target.file_id,
            state: *state,
        })
    }

    async fn access_token(&self, member: &Member, phase: UploadState) -> Result<String, UploadError> {
        self.token_store
            .current_access_token(member)
            .await
            .map_err(|source| UploadError::Token { phase, source })
    }

    async fn delete_existing_files(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<(), UploadError> {
        let form = DeleteFilesForm {
            project_member_id: &member.member_id,
            all_files: true,
        };

        let result = self
            .gateway
            .post_form_with_token(&self.endpoints.delete_files(), access_token, &form)
            .await;

        match (self.delete_policy, result) {
            (DeletePolicy::Strict, Ok(response)) if !response.status().is_success() => {
                Err(UploadError::Delete {
                    url: response.url().to_string(),
                    status: response.status().as_u16(),
                })
            }
            (DeletePolicy::Strict, Err(source)) => Err(UploadError::Gateway {
                phase: UploadState::Deleting,
                source,
            }),
            (DeletePolicy::BestEffort, Ok(response)) if !response.status().is_success() => {
                warn!(
                    status = response.status().as_u16(),
                    "Deleting existing files failed, continuing with upload"
                );
                Ok(())
            }
            (DeletePolicy::BestEffort, Err(e)) => {
                warn!(error = %e, "Deleting existing files failed, continuing with upload");
                Ok(())
            }
            (_, Ok(_)) => Ok(()),
        }
    }

    async fn request_target(
        &self,
        member: &Member,
        access_token: &str,
        request: &UploadRequest,
    ) -> Result<UploadTarget, UploadError> {
        let metadata = serde_json::to_string(&request.metadata).map_err(|e| {
            UploadError::InvalidRequest(format!("metadata is not serializable: {}", e))
        })?;
        let form = DirectUploadForm {
            project_member_id: &member.member_id,
            filename: &request.filename,
            metadata,
        };

        let response = self
            .gateway
            .post_form_with_token(&self.endpoints.direct_upload(), access_token, &form)
            .await
            .map_err(|source| UploadError::Gateway {
                phase: UploadState::RequestingTarget,
                source,
            })?;

        if response.status() != StatusCode::CREATED {
            return Err(UploadError::Initiation {
                url: response.url().to_string(),
                status: response.status().as_u16(),
            });
        }

        let target: UploadTarget = response.json().map_err(|source| UploadError::Gateway {
            phase: UploadState::RequestingTarget,
            source,
        })?;
        debug!(file_id = %target.file_id, "Received upload target");
        Ok(target)
    }

    async fn transfer(&self, target: &UploadTarget, request: UploadRequest) -> Result<(), UploadError> {
        let (body, content_length) = request.content.into_body();

        let response = self
            .gateway
            .put(&target.url, body, content_length)
            .await
            .map_err(|source| UploadError::Gateway {
                phase: UploadState::Transferring,
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(UploadError::Transfer {
                url: redact_url(&target.url),
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    async fn complete(
        &self,
        member: &Member,
        access_token: &str,
        target: &UploadTarget,
    ) -> Result<(), UploadError> {
        let form = CompleteUploadForm {
            project_member_id: &member.member_id,
            file_id: &target.file_id,
        };

        let response = self
            .gateway
            .post_form_with_token(&self.endpoints.upload_complete(), access_token, &form)
            .await
            .map_err(|source| UploadError::Gateway {
                phase: UploadState::Completing,
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(UploadError::Completion {
                url: response.url().to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

fn transition(state: &mut UploadState, next: UploadState) {
    debug!(from = %state, to = %next, "Upload state transition");
    *state = next;
}
