use chrono::Utc;
use oh_data_source::auth::{AuthError, TokenExchangeFailure};
use oh_data_source::{
    AuthExchanger, HttpGateway, InMemoryMemberRepository, MemberDirectory, OAuthClientConfig,
    PlatformEndpoints, PlatformOAuthClient,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{any, basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXCHANGE_MEMBER_PATH: &str = "/api/direct-sharing/project/exchange-member/";

fn oauth_client(server: &MockServer, client_secret: &str) -> PlatformOAuthClient {
    PlatformOAuthClient::new(
        OAuthClientConfig::new(
            "test_client_id".to_string(),
            client_secret.to_string(),
            "http://127.0.0.1:5000/complete".to_string(),
        ),
        PlatformEndpoints::new(&server.uri()).unwrap(),
        HttpGateway::new(Duration::from_secs(5)).unwrap(),
    )
}

fn exchanger(server: &MockServer, repo: &InMemoryMemberRepository) -> AuthExchanger {
    exchanger_with_secret(server, repo, "test_client_secret")
}

fn exchanger_with_secret(
    server: &MockServer,
    repo: &InMemoryMemberRepository,
    client_secret: &str,
) -> AuthExchanger {
    AuthExchanger::new(
        oauth_client(server, client_secret),
        PlatformEndpoints::new(&server.uri()).unwrap(),
        HttpGateway::new(Duration::from_secs(5)).unwrap(),
        MemberDirectory::new(Arc::new(repo.clone())),
    )
}

async fn mount_token_response(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token/"))
        .and(basic_auth("test_client_id", "test_client_secret"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2F127.0.0.1%3A5000%2Fcomplete",
        ))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_identity(server: &MockServer, token: &str, member_id: &str) {
    Mock::given(method("GET"))
        .and(path(EXCHANGE_MEMBER_PATH))
        .and(query_param("access_token", token))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "project_member_id": member_id })),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Code exchange creates a member, re-authorization updates it in place
#[tokio::test]
async fn test_exchange_creates_then_reauthorizes_member() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();
    let exchanger = exchanger(&server, &repo);

    mount_token_response(
        &server,
        200,
        serde_json::json!({
            "access_token": "T1",
            "refresh_token": "R1",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "read write"
        }),
    )
    .await;
    mount_identity(&server, "T1", "42").await;

    let member = tokio_test::assert_ok!(exchanger.exchange_code_for_member("abc123").await);
    assert_eq!(member.member_id, "42");
    assert_eq!(member.access_token, "T1");
    assert_eq!(member.refresh_token, "R1");
    assert!(member.token_expires_at > Utc::now());
    assert_eq!(repo.len().await, 1);

    server.verify().await;
    server.reset().await;

    mount_token_response(
        &server,
        200,
        serde_json::json!({ "access_token": "T2", "refresh_token": "R2", "expires_in": 3600 }),
    )
    .await;
    mount_identity(&server, "T2", "42").await;

    let member = tokio_test::assert_ok!(exchanger.exchange_code_for_member("abc123").await);
    assert_eq!(member.member_id, "42");
    assert_eq!(member.access_token, "T2");
    assert_eq!(repo.len().await, 1, "re-authorization must not duplicate the member");

    use oh_data_source::members::MemberRepository;
    let stored = repo.get("42").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "T2");
    assert_eq!(stored.refresh_token, "R2");
}

/// Numeric member ids from the identity endpoint are accepted
#[tokio::test]
async fn test_numeric_member_id() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();

    mount_token_response(
        &server,
        200,
        serde_json::json!({ "access_token": "T1", "refresh_token": "R1", "expires_in": 3600 }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(EXCHANGE_MEMBER_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "project_member_id": 12345678 })),
        )
        .mount(&server)
        .await;

    let member = exchanger(&server, &repo)
        .exchange_code_for_member("abc123")
        .await
        .unwrap();
    assert_eq!(member.member_id, "12345678");
}

/// An `error` field in the token response is a rejected exchange
#[tokio::test]
async fn test_token_error_response() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();

    mount_token_response(
        &server,
        400,
        serde_json::json!({ "error": "invalid_grant", "error_description": "Invalid code" }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(EXCHANGE_MEMBER_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = exchanger(&server, &repo)
        .exchange_code_for_member("abc123")
        .await;

    match result {
        Err(AuthError::TokenExchange(TokenExchangeFailure::Rejected { error, description })) => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("Invalid code"));
        }
        other => panic!("Expected rejected token exchange, got {:?}", other),
    }
    assert!(repo.is_empty().await);
}

/// A response with neither tokens nor an error is malformed
#[tokio::test]
async fn test_token_response_without_tokens_or_error() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();

    mount_token_response(&server, 200, serde_json::json!({ "detail": "unexpected" })).await;

    let result = exchanger(&server, &repo)
        .exchange_code_for_member("abc123")
        .await;

    match result {
        Err(AuthError::TokenExchange(TokenExchangeFailure::Malformed { status })) => {
            assert_eq!(status, 200)
        }
        other => panic!("Expected malformed token response, got {:?}", other),
    }
    assert!(repo.is_empty().await);
}

/// Token sets that cannot be used are malformed, whatever the status
#[tokio::test]
async fn test_unusable_token_sets_are_malformed() {
    let unusable = [
        serde_json::json!({ "access_token": "", "refresh_token": "", "expires_in": -10 }),
        serde_json::json!({ "access_token": "T1", "refresh_token": "R1", "expires_in": 0 }),
        serde_json::json!({ "access_token": "T1", "refresh_token": "", "expires_in": 3600 }),
        serde_json::json!({ "access_token": "T1", "refresh_token": "R1", "expires_in": i64::MAX }),
    ];

    for body in unusable {
        let server = MockServer::start().await;
        let repo = InMemoryMemberRepository::new();

        mount_token_response(&server, 200, body.clone()).await;
        Mock::given(method("GET"))
            .and(path(EXCHANGE_MEMBER_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = exchanger(&server, &repo)
            .exchange_code_for_member("abc123")
            .await;

        assert!(
            matches!(
                result,
                Err(AuthError::TokenExchange(TokenExchangeFailure::Malformed { status: 200 }))
            ),
            "body {} gave {:?}",
            body,
            result
        );
        assert!(repo.is_empty().await);
    }
}

/// A non-200 identity response fails without storing a member
#[tokio::test]
async fn test_identity_fetch_failure() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();

    mount_token_response(
        &server,
        200,
        serde_json::json!({ "access_token": "T1", "refresh_token": "R1", "expires_in": 3600 }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(EXCHANGE_MEMBER_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = exchanger(&server, &repo)
        .exchange_code_for_member("abc123")
        .await;

    match result {
        Err(AuthError::IdentityFetch { url, status }) => {
            assert_eq!(url, format!("{}{}", server.uri(), EXCHANGE_MEMBER_PATH));
            assert_eq!(status, 403);
            assert!(!url.contains("T1"), "access token must not leak into errors");
        }
        other => panic!("Expected IdentityFetch error, got {:?}", other),
    }
    assert!(repo.is_empty().await);
}

/// Missing credentials fail before any request is made
#[tokio::test]
async fn test_missing_client_secret_makes_no_request() {
    let server = MockServer::start().await;
    let repo = InMemoryMemberRepository::new();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = exchanger_with_secret(&server, &repo, "")
        .exchange_code_for_member("abc123")
        .await;

    assert!(matches!(result, Err(AuthError::Configuration(_))));
}

/// Refresh grant is sent with Basic auth and decoded like a code exchange
#[tokio::test]
async fn test_refresh_access_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token/"))
        .and(basic_auth("test_client_id", "test_client_secret"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T-new",
            "refresh_token": "R-new",
            "expires_in": 36000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = oauth_client(&server, "test_client_secret")
        .refresh_access_token("R1")
        .await
        .unwrap();

    assert_eq!(grant.access_token, "T-new");
    assert_eq!(grant.refresh_token, "R-new");
    assert_eq!(grant.expires_in, 36000);
}

/// A rejected refresh is reported as a refresh failure
#[tokio::test]
async fn test_refresh_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;

    let result = oauth_client(&server, "test_client_secret")
        .refresh_access_token("R-old")
        .await;

    assert!(matches!(
        result,
        Err(AuthError::Refresh(TokenExchangeFailure::Rejected { .. }))
    ));
}

/// A refresh answered with an unusable token set fails instead of storing it
#[tokio::test]
async fn test_refresh_with_unusable_token_set() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T-new",
            "refresh_token": "R-new",
            "expires_in": i64::MAX
        })))
        .mount(&server)
        .await;

    let result = oauth_client(&server, "test_client_secret")
        .refresh_access_token("R1")
        .await;

    assert!(matches!(
        result,
        Err(AuthError::Refresh(TokenExchangeFailure::Malformed { status: 200 }))
    ));
}
