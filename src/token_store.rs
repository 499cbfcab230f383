//! File-backed OAuth token cache
//!
//! Holds a single credential (access token, refresh token, expiry, granted
//! scopes) as JSON. It plugs into `yup-oauth2` as its token storage, so the
//! authenticator reads and refreshes through it, and it lets the caller
//! inspect the credential before any network traffic happens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::yup_oauth2::storage::{TokenInfo, TokenStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{secure_token_file, CredentialStatus};
use crate::error::Result;

/// Serialized form of the cached credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredCredential {
    /// Whether the credential was granted every scope in `scopes`
    pub fn covers(&self, scopes: &[&str]) -> bool {
        scopes
            .iter()
            .all(|wanted| self.scopes.iter().any(|granted| granted == wanted))
    }

    fn from_token_info(scopes: &[&str], token: TokenInfo) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_at
                .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
            id_token: token.id_token,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn to_token_info(&self) -> TokenInfo {
        TokenInfo {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self
                .expires_at
                .and_then(|at| time::OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()),
            id_token: self.id_token.clone(),
        }
    }
}

pub struct FileTokenStore {
    path: PathBuf,
    cached: Mutex<Option<StoredCredential>>,
}

impl FileTokenStore {
    /// Open the token cache at `path`
    ///
    /// A missing file is an empty cache. An unreadable or corrupt file is
    /// logged and treated as empty, so the next successful authorization
    /// overwrites it.
    pub async fn open(path: &Path) -> Result<Self> {
        let cached = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<StoredCredential>(&content) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!("Ignoring unreadable token cache {:?}: {}", path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            cached: Mutex::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn credential(&self) -> Option<StoredCredential> {
        self.cached.lock().await.clone()
    }

    pub async fn status(&self, scopes: &[&str], now: DateTime<Utc>) -> CredentialStatus {
        CredentialStatus::assess(self.cached.lock().await.as_ref(), scopes, now)
    }

    /// Forget the cached credential and delete the file
    pub async fn clear(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *cached = None;
        Ok(())
    }

    async fn persist(&self, credential: &StoredCredential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(credential)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // New files are private from the first byte written
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        // `mode` only applies on creation; tighten files left by older runs
        secure_token_file(&self.path).await?;
        debug!("Saved token cache to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl TokenStorage for FileTokenStore {
    async fn set(&self, scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let mut cached = self.cached.lock().await;
        let mut credential = StoredCredential::from_token_info(scopes, token);

        // Refresh responses usually omit the refresh token
        if credential.refresh_token.is_none() {
            credential.refresh_token = cached.as_ref().and_then(|c| c.refresh_token.clone());
        }

        self.persist(&credential).await?;
        *cached = Some(credential);
        Ok(())
    }

    async fn get(&self, target_scopes: &[&str]) -> Option<TokenInfo> {
        self.cached
            .lock()
            .await
            .as_ref()
            .filter(|credential| credential.covers(target_scopes))
            .map(StoredCredential::to_token_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::READONLY_SCOPES;
    use chrono::Duration;

    fn token_info(access: &str, refresh: Option<&str>, expires_in_secs: i64) -> TokenInfo {
        TokenInfo {
            access_token: Some(access.to_string()),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(
                time::OffsetDateTime::now_utc() + time::Duration::seconds(expires_in_secs),
            ),
            id_token: None,
        }
    }

    #[tokio::test]
    async fn test_open_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(&dir.path().join("token.json"))
            .await
            .unwrap();

        assert!(store.credential().await.is_none());
        assert_eq!(
            store.status(READONLY_SCOPES, Utc::now()).await,
            CredentialStatus::Absent
        );
        assert!(store.get(READONLY_SCOPES).await.is_none());
    }

    #[tokio::test]
    async fn test_set_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("token.json");

        let store = FileTokenStore::open(&path).await.unwrap();
        store
            .set(READONLY_SCOPES, token_info("at-1", Some("rt-1"), 3600))
            .await
            .unwrap();

        let reopened = FileTokenStore::open(&path).await.unwrap();
        let credential = reopened.credential().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("at-1"));
        assert_eq!(credential.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(credential.scopes, vec![READONLY_SCOPES[0].to_string()]);
        assert_eq!(
            reopened.status(READONLY_SCOPES, Utc::now()).await,
            CredentialStatus::Valid
        );

        let token = reopened.get(READONLY_SCOPES).await.unwrap();
        assert_eq!(token.access_token.as_deref(), Some("at-1"));
        assert!(token.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_get_requires_matching_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(&dir.path().join("token.json"))
            .await
            .unwrap();
        store
            .set(READONLY_SCOPES, token_info("at", Some("rt"), 3600))
            .await
            .unwrap();

        let broader = ["https://www.googleapis.com/auth/gmail.modify"];
        assert!(store.get(&broader).await.is_none());
        assert_eq!(
            store.status(&broader, Utc::now()).await,
            CredentialStatus::Absent
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(&dir.path().join("token.json"))
            .await
            .unwrap();

        store
            .set(READONLY_SCOPES, token_info("at-1", Some("rt-1"), -10))
            .await
            .unwrap();
        assert_eq!(
            store.status(READONLY_SCOPES, Utc::now()).await,
            CredentialStatus::ExpiredRefreshable
        );

        store
            .set(READONLY_SCOPES, token_info("at-2", None, 3600))
            .await
            .unwrap();

        let credential = store.credential().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("at-2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_corrupt_file_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(
            store.status(READONLY_SCOPES, Utc::now()).await,
            CredentialStatus::Absent
        );
    }

    #[tokio::test]
    async fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = FileTokenStore::open(&path).await.unwrap();
        store
            .set(READONLY_SCOPES, token_info("at", None, 3600))
            .await
            .unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(!path.exists());
        assert!(store.credential().await.is_none());

        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[test]
    fn test_expiry_survives_conversion() {
        let expires_at = Utc::now() + Duration::hours(1);
        let credential = StoredCredential {
            access_token: Some("at".to_string()),
            refresh_token: None,
            expires_at: Some(expires_at),
            id_token: None,
            scopes: vec![],
        };

        let info = credential.to_token_info();
        let back = StoredCredential::from_token_info(&[], info);
        assert_eq!(
            back.expires_at.map(|t| t.timestamp()),
            Some(expires_at.timestamp())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_world_readable_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{}").await.unwrap();
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
            .await
            .unwrap();

        let store = FileTokenStore::open(&path).await.unwrap();
        store
            .set(READONLY_SCOPES, token_info("at", Some("rt"), 3600))
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // Shorter content fully replaces the old file
        let reopened = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.credential().await.unwrap().access_token.as_deref(),
            Some("at")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = FileTokenStore::open(&path).await.unwrap();
        store
            .set(READONLY_SCOPES, token_info("at", None, 3600))
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
