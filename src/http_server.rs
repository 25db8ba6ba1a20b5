use crate::auth::{AuthError, AuthExchanger, OAuthClientConfig, PlatformOAuthClient, TokenStore};
use crate::config::Config;
use crate::members::{MemberDirectory, MemberRepository, StorageError};
use crate::platform::{GatewayError, HttpGateway, PlatformEndpoints};
use crate::session::{SessionError, SessionManager};
use crate::upload::{ContentSpool, UploadError, UploadOrchestrator, UploadRequest};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Errors while wiring the application together
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Invalid platform base URL: {0}")]
    InvalidPlatformUrl(#[from] url::ParseError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Query parameters of the OAuth2 redirect back from the platform
#[derive(Debug, Deserialize)]
pub struct CompleteParams {
    #[serde(default)]
    code: Option<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    endpoints: PlatformEndpoints,
    exchanger: Arc<AuthExchanger>,
    orchestrator: Arc<UploadOrchestrator>,
    directory: MemberDirectory,
    sessions: Arc<SessionManager>,
}

impl AppState {
    /// Build every component from `config`, storing members in `repository`
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn MemberRepository>,
    ) -> Result<Self, SetupError> {
        let endpoints = PlatformEndpoints::new(&config.platform_base_url)?;
        let gateway = HttpGateway::new(Duration::from_secs(config.request_timeout_secs))?;
        let directory = MemberDirectory::new(repository);

        let oauth_client = PlatformOAuthClient::new(
            OAuthClientConfig::from(config.as_ref()),
            endpoints.clone(),
            gateway.clone(),
        );
        let token_store = Arc::new(TokenStore::with_refresher(
            directory.clone(),
            Arc::new(oauth_client.clone()),
        ));

        let exchanger = AuthExchanger::new(
            oauth_client,
            endpoints.clone(),
            gateway.clone(),
            directory.clone(),
        );
        let orchestrator = UploadOrchestrator::new(
            gateway,
            endpoints.clone(),
            token_store,
            config.delete_policy,
        );
        let sessions = SessionManager::new(&config.session_key);

        Ok(Self {
            config,
            endpoints,
            exchanger: Arc::new(exchanger),
            orchestrator: Arc::new(orchestrator),
            directory,
            sessions: Arc::new(sessions),
        })
    }
}

/// Failures surfaced to the browser
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Session rejected: {0}")]
    Session(#[from] SessionError),

    #[error("Session refers to unknown member {0}")]
    UnknownMember(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("Invalid upload form: {0}")]
    BadForm(String),

    #[error("Failed to buffer upload: {0}")]
    Spool(#[source] std::io::Error),

    #[error("Failed to render page: {0}")]
    Render(String),
}

impl AppError {
    /// Status code and the message shown to the member
    fn status_and_message(&self) -> (StatusCode, String) {
        const REAUTHORIZE: &str =
            "Your authorization with Open Humans has expired. Please authorize this project again.";
        const UNREACHABLE: &str = "Open Humans could not be reached. Please try again later.";

        match self {
            AppError::Auth(AuthError::Configuration(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "This project is not configured to connect to Open Humans.".to_string(),
            ),
            AppError::Auth(AuthError::TokenExchange(_)) => (
                StatusCode::BAD_REQUEST,
                "Authorization with Open Humans could not be completed. Please try again."
                    .to_string(),
            ),
            AppError::Auth(AuthError::Refresh(_)) => {
                (StatusCode::UNAUTHORIZED, REAUTHORIZE.to_string())
            }
            AppError::Auth(AuthError::IdentityFetch { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Your Open Humans member identity could not be retrieved.".to_string(),
            ),
            AppError::Auth(AuthError::Gateway(_)) => {
                (StatusCode::BAD_GATEWAY, UNREACHABLE.to_string())
            }
            AppError::Auth(AuthError::Storage(_)) | AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Member records could not be accessed.".to_string(),
            ),
            AppError::Upload(e) if e.is_unauthorized() => {
                (StatusCode::UNAUTHORIZED, REAUTHORIZE.to_string())
            }
            AppError::Upload(UploadError::Token {
                source: AuthError::Refresh(_),
                ..
            }) => {
                (StatusCode::UNAUTHORIZED, REAUTHORIZE.to_string())
            }
            AppError::Upload(UploadError::Token { .. }) => {
                (StatusCode::BAD_GATEWAY, UNREACHABLE.to_string())
            }
            AppError::Upload(UploadError::InvalidRequest(reason)) => {
                (StatusCode::BAD_REQUEST, format!("The upload is invalid: {}.", reason))
            }
            AppError::Upload(UploadError::Delete { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Your previously uploaded file could not be removed.".to_string(),
            ),
            AppError::Upload(UploadError::Initiation { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Open Humans refused to start the upload.".to_string(),
            ),
            AppError::Upload(UploadError::Transfer { .. }) => (
                StatusCode::BAD_GATEWAY,
                "The file could not be transferred to storage.".to_string(),
            ),
            AppError::Upload(UploadError::Completion { .. }) => (
                StatusCode::BAD_GATEWAY,
                "Open Humans did not confirm the upload.".to_string(),
            ),
            AppError::Upload(UploadError::Gateway { .. }) => {
                (StatusCode::BAD_GATEWAY, UNREACHABLE.to_string())
            }
            AppError::Session(_) | AppError::UnknownMember(_) => (
                StatusCode::UNAUTHORIZED,
                "Please authorize this project with Open Humans before uploading.".to_string(),
            ),
            AppError::Multipart(e) => (e.status(), e.body_text()),
            AppError::BadForm(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            AppError::Spool(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The uploaded file could not be stored for transfer.".to_string(),
            ),
            AppError::Render(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong.".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        (
            status,
            page(
                "Something went wrong",
                &format!(
                    r#"<p class="error">{}</p><p><a href="/">Return to the start page</a></p>"#,
                    escape_html(&message)
                ),
            ),
        )
            .into_response()
    }
}

/// Starting page with the authorization link
async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let authorize_url = state
        .endpoints
        .authorize_url(&state.config.client_id, &state.config.redirect_uri())
        .map_err(|e| AppError::Render(e.to_string()))?;

    Ok(page(
        "Connect your Twitter archive",
        &format!(
            r#"<p>Add your Twitter archive to your Open Humans account.</p>
<p><a class="button" href="{}">Connect with Open Humans</a></p>
<p><a href="{}">About this project</a></p>"#,
            escape_html(authorize_url.as_str()),
            escape_html(&state.config.activity_page),
        ),
    ))
}

/// Member returning from the platform with an authorization code
async fn complete(
    State(state): State<AppState>,
    Query(params): Query<CompleteParams>,
) -> Result<Response, AppError> {
    info!("Received user returning from Open Humans");

    let Some(code) = params.code.filter(|code| !code.is_empty()) else {
        info!("No authorization code, returning user to start page");
        return Ok(Redirect::to("/").into_response());
    };

    let member = state.exchanger.exchange_code_for_member(&code).await?;
    let cookie = state.sessions.login_cookie(&member.member_id)?;

    let body = format!(
        r#"<p>Connected as Open Humans member <strong>{}</strong>.</p>
<form method="post" action="/complete" enctype="multipart/form-data">
  <label for="file">Select file</label>
  <input type="file" name="file" id="file" required>
  <p class="help">please select your twitter archive csv file</p>
  <button type="submit">Upload</button>
</form>"#,
        escape_html(&member.member_id)
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        page("Upload your archive", &body),
    )
        .into_response())
}

/// Upload form submission from a logged-in member
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let member_id = state.sessions.member_id(&headers)?;
    let member = state
        .directory
        .get(&member_id)
        .await?
        .ok_or_else(|| AppError::UnknownMember(member_id.clone()))?;

    let request = read_upload_form(multipart).await?;
    let report = state.orchestrator.upload(&member, request).await?;

    Ok(page(
        "Upload complete",
        &format!(
            r#"<p><strong>{}</strong> was added to Open Humans member <strong>{}</strong>.</p>
<p><a href="{}">View the project on Open Humans</a></p>"#,
            escape_html(&report.filename),
            escape_html(&report.member_id),
            escape_html(&state.config.activity_page),
        ),
    ))
}

/// Pull the `file` field out of the form
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(base_filename)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadForm("No file was selected.".to_string()))?;
        let mut spool = ContentSpool::new().map_err(AppError::Spool)?;
        while let Some(chunk) = field.chunk().await? {
            spool.write(&chunk).await.map_err(AppError::Spool)?;
        }
        let content = spool.finish().await.map_err(AppError::Spool)?;

        return Ok(UploadRequest::new(filename, content));
    }

    Err(AppError::BadForm("No file was selected.".to_string()))
}

/// Browsers may send a full client-side path
fn base_filename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or_default().trim().to_string()
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Create and configure the HTTP server
pub fn create_app(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/complete", get(complete).post(upload))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload_bytes)),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(state: AppState) -> Result<(), SetupError> {
    let port = state.config.port;
    let redirect_uri = state.config.redirect_uri();
    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| SetupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("HTTP server listening on {}", addr);
    info!("OAuth redirect URI: {}", redirect_uri);

    axum::serve(listener, app).await.map_err(SetupError::Serve)?;
    Ok(())
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 640px; margin: 3rem auto; color: #2d3748; }}
        .button {{ background: #2b6cb0; color: white; padding: 0.6rem 1.2rem; border-radius: 6px; text-decoration: none; }}
        .error {{ color: #c53030; }}
        .help {{ color: #718096; font-size: 0.9rem; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    {body}
</body>
</html>"#,
        title = escape_html(title),
        body = body,
    ))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
