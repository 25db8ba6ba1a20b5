use super::types::{AuthError, TokenGrant};
use crate::members::{Member, MemberDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Capability to trade a refresh token for a new token set
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Hands out access tokens for members, refreshing expired ones when a
/// [`TokenRefresher`] is available.
///
/// Refreshed credentials are written back through [`MemberDirectory::upsert`].
/// Without a refresher an expired token is returned as is, and the platform
/// call that uses it fails with 401.
pub struct TokenStore {
    directory: MemberDirectory,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl TokenStore {
    /// Token store that never refreshes
    pub fn new(directory: MemberDirectory) -> Self {
        Self {
            directory,
            refresher: None,
        }
    }

    pub fn with_refresher(directory: MemberDirectory, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            directory,
            refresher: Some(refresher),
        }
    }

    /// Get a valid access token for `member`, refreshing if necessary
    pub async fn current_access_token(&self, member: &Member) -> Result<String, AuthError> {
        if !member.is_expired() {
            return Ok(member.access_token.clone());
        }

        // Another request may already have refreshed this member
        let stored = self
            .directory
            .get(&member.member_id)
            .await?
            .unwrap_or_else(|| member.clone());
        if !stored.is_expired() {
            debug!(member_id = %member.member_id, "Using token refreshed elsewhere");
            return Ok(stored.access_token);
        }

        let Some(refresher) = &self.refresher else {
            warn!(
                member_id = %member.member_id,
                expired_at = %stored.token_expires_at,
                "Access token expired and no refresher configured"
            );
            return Ok(stored.access_token);
        };

        let grant = refresher.refresh(&stored.refresh_token).await?;
        let refreshed = self
            .directory
            .upsert(
                &stored.member_id,
                grant.access_token,
                grant.refresh_token,
                grant.expires_in,
            )
            .await?;

        info!(
            member_id = %refreshed.member_id,
            expires_at = %refreshed.token_expires_at,
            "Access token refreshed"
        );
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::InMemoryMemberRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
            assert_eq!(refresh_token, "R1");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenGrant {
                access_token: "T-new".into(),
                refresh_token: "R-new".into(),
                expires_in: 3600,
            })
        }
    }

    async fn directory_with(expires_in: i64) -> (MemberDirectory, Member) {
        let directory = MemberDirectory::new(Arc::new(InMemoryMemberRepository::new()));
        let member = directory
            .upsert("42", "T1".into(), "R1".into(), expires_in)
            .await
            .unwrap();
        (directory, member)
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let (directory, member) = directory_with(3600).await;
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let store = TokenStore::with_refresher(directory, refresher.clone());

        assert_eq!(store.current_access_token(&member).await.unwrap(), "T1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let (directory, member) = directory_with(0).await;
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let store = TokenStore::with_refresher(directory.clone(), refresher.clone());

        assert_eq!(store.current_access_token(&member).await.unwrap(), "T-new");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let stored = directory.get("42").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "T-new");
        assert_eq!(stored.refresh_token, "R-new");

        // The stale copy held by the caller resolves to the stored token
        assert_eq!(store.current_access_token(&member).await.unwrap(), "T-new");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_passes_through_without_refresher() {
        let (directory, member) = directory_with(0).await;
        let store = TokenStore::new(directory);

        assert_eq!(store.current_access_token(&member).await.unwrap(), "T1");
    }
}
