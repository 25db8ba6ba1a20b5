use super::member::Member;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Member store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Member store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key-value persistence for member records, keyed by member id
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn get(&self, member_id: &str) -> Result<Option<Member>, StorageError>;

    /// Insert or replace the record stored under `member.member_id`
    async fn put(&self, member: &Member) -> Result<(), StorageError>;
}

/// Process-local member storage
#[derive(Clone, Default)]
pub struct InMemoryMemberRepository {
    members: Arc<RwLock<HashMap<String, Member>>>,
}

impl InMemoryMemberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

#[async_trait]
impl MemberRepository for InMemoryMemberRepository {
    async fn get(&self, member_id: &str) -> Result<Option<Member>, StorageError> {
        Ok(self.members.read().await.get(member_id).cloned())
    }

    async fn put(&self, member: &Member) -> Result<(), StorageError> {
        self.members
            .write()
            .await
            .insert(member.member_id.clone(), member.clone());
        Ok(())
    }
}

/// Member storage backed by a single JSON file.
///
/// The whole map is held in memory and rewritten on every `put`
/// through a temporary file followed by a rename.
pub struct JsonFileMemberRepository {
    path: PathBuf,
    members: RwLock<HashMap<String, Member>>,
}

impl JsonFileMemberRepository {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let members = match tokio::fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(io_error(&path, source)),
        };

        info!(
            path = %path.display(),
            member_count = members.len(),
            "Opened member store"
        );

        Ok(Self {
            path,
            members: RwLock::new(members),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, members: &HashMap<String, Member>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
        }

        let contents = serde_json::to_vec_pretty(members)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| io_error(&tmp_path, e))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        debug!(path = %self.path.display(), "Member store written");
        Ok(())
    }
}

#[async_trait]
impl MemberRepository for JsonFileMemberRepository {
    async fn get(&self, member_id: &str) -> Result<Option<Member>, StorageError> {
        Ok(self.members.read().await.get(member_id).cloned())
    }

    async fn put(&self, member: &Member) -> Result<(), StorageError> {
        let mut members = self.members.write().await;
        let previous = members.insert(member.member_id.clone(), member.clone());

        if let Err(e) = self.persist(&members).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => members.insert(old.member_id.clone(), old),
                None => members.remove(&member.member_id),
            };
            return Err(e);
        }

        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, token: &str) -> Member {
        Member::new(id.to_string(), token.to_string(), "R".to_string(), 3600)
    }

    #[tokio::test]
    async fn test_in_memory_put_replaces() {
        let repo = InMemoryMemberRepository::new();
        repo.put(&member("42", "T1")).await.unwrap();
        repo.put(&member("42", "T2")).await.unwrap();

        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.get("42").await.unwrap().unwrap().access_token, "T2");
        assert!(repo.get("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("members.json");

        let repo = JsonFileMemberRepository::open(&path).await.unwrap();
        repo.put(&member("42", "T1")).await.unwrap();
        repo.put(&member("43", "T3")).await.unwrap();
        drop(repo);

        let reopened = JsonFileMemberRepository::open(&path).await.unwrap();
        assert_eq!(reopened.get("42").await.unwrap().unwrap().access_token, "T1");
        assert_eq!(reopened.get("43").await.unwrap().unwrap().access_token, "T3");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_file_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFileMemberRepository::open(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }
}
