use super::member::Member;
use super::repository::{MemberRepository, StorageError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Owner of member records.
///
/// `upsert` is the only path that writes member credentials; both the code
/// exchange and token refresh go through it.
#[derive(Clone)]
pub struct MemberDirectory {
    repository: Arc<dyn MemberRepository>,
    // Serializes read-modify-write cycles
    write_lock: Arc<Mutex<()>>,
}

impl MemberDirectory {
    pub fn new(repository: Arc<dyn MemberRepository>) -> Self {
        Self {
            repository,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, member_id: &str) -> Result<Option<Member>, StorageError> {
        self.repository.get(member_id).await
    }

    /// Create the member, or replace the tokens of an existing one in place
    pub async fn upsert(
        &self,
        member_id: &str,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    ) -> Result<Member, StorageError> {
        let _guard = self.write_lock.lock().await;

        let member = match self.repository.get(member_id).await? {
            Some(mut existing) => {
                existing.replace_tokens(access_token, refresh_token, expires_in);
                self.repository.put(&existing).await?;
                debug!(member_id = %member_id, "Member re-authorized");
                existing
            }
            None => {
                let created = Member::new(
                    member_id.to_string(),
                    access_token,
                    refresh_token,
                    expires_in,
                );
                self.repository.put(&created).await?;
                debug!(member_id = %member_id, "Member created");
                created
            }
        };

        Ok(member)
    }
}
