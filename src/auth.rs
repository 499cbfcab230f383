//! OAuth2 authentication management for Gmail API

use chrono::{DateTime, Duration, Utc};
use google_gmail1::yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::error::{GmailError, Result};
use crate::token_store::{FileTokenStore, StoredCredential};

/// Read-only mailbox access; enough to list messages and read their metadata
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub const READONLY_SCOPES: &[&str] = &[READONLY_SCOPE];

/// Tokens expiring within this window are treated as already expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Where secrets and tokens live, which scopes to request, and whether a
/// browser consent flow may be started
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    pub token_cache_path: PathBuf,
    pub scopes: Vec<String>,
    pub interactive: bool,
}

impl AuthConfig {
    pub fn new(credentials_path: impl Into<PathBuf>, token_cache_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_cache_path: token_cache_path.into(),
            scopes: READONLY_SCOPES.iter().map(|s| s.to_string()).collect(),
            interactive: true,
        }
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn scope_refs(&self) -> Vec<&str> {
        self.scopes.iter().map(String::as_str).collect()
    }
}

/// State of the cached credential relative to the scopes we need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Nothing usable cached (no file, unreadable file, or scopes not granted)
    Absent,
    /// Access token expired but a refresh token is available
    ExpiredRefreshable,
    /// Access token expired and there is no refresh token
    ExpiredUnrefreshable,
    /// Access token present and not about to expire
    Valid,
}

/// What the authenticator has to do to produce a usable token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    UseCached,
    Refresh,
    Consent,
}

impl CredentialStatus {
    pub fn assess(stored: Option<&StoredCredential>, scopes: &[&str], now: DateTime<Utc>) -> Self {
        let Some(credential) = stored else {
            return CredentialStatus::Absent;
        };
        if !credential.covers(scopes) {
            return CredentialStatus::Absent;
        }

        let unexpired = match credential.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        };

        match (&credential.access_token, &credential.refresh_token) {
            (Some(_), _) if unexpired => CredentialStatus::Valid,
            (_, Some(_)) => CredentialStatus::ExpiredRefreshable,
            (_, None) => CredentialStatus::ExpiredUnrefreshable,
        }
    }

    /// Transition rules from a cached credential to the next auth step
    ///
    /// Absent and unrefreshable credentials need the browser consent flow,
    /// which is an error when interactive consent is disabled.
    pub fn required_action(self, interactive: bool) -> Result<AuthAction> {
        match self {
            CredentialStatus::Valid => Ok(AuthAction::UseCached),
            CredentialStatus::ExpiredRefreshable => Ok(AuthAction::Refresh),
            CredentialStatus::Absent | CredentialStatus::ExpiredUnrefreshable if interactive => {
                Ok(AuthAction::Consent)
            }
            CredentialStatus::Absent | CredentialStatus::ExpiredUnrefreshable => {
                Err(GmailError::AuthError(format!(
                    "stored credential is {} and interactive consent is disabled; \
                     run `gmail-top-senders auth` first",
                    self
                )))
            }
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CredentialStatus::Absent => "absent",
            CredentialStatus::ExpiredRefreshable => "expired (refreshable)",
            CredentialStatus::ExpiredUnrefreshable => "expired (not refreshable)",
            CredentialStatus::Valid => "valid",
        };
        f.write_str(text)
    }
}

/// Flow delegate that refuses to present a consent URL
struct ConsentDisabled;

impl InstalledFlowDelegate for ConsentDisabled {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async { Err("interactive consent is disabled".to_string()) })
    }
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Sets up:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence through [`FileTokenStore`] for silent refresh
/// - HTTP/1 client with TLS support
///
/// Fails with [`GmailError::AuthError`] when the client secrets cannot be
/// read, consent is denied, or no usable credential exists and the config
/// forbids interactive consent.
pub async fn initialize_gmail_hub(config: &AuthConfig) -> Result<GmailHub> {
    let secret = read_application_secret(&config.credentials_path).await?;

    let store = FileTokenStore::open(&config.token_cache_path).await?;
    let scopes = config.scope_refs();
    let status = store.status(&scopes, Utc::now()).await;
    let action = status.required_action(config.interactive)?;
    info!("Cached credential is {}; next step: {:?}", status, action);

    let mut builder = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .with_storage(Box::new(store));

    // A refresh can still fail (revoked grant); never fall back to a browser then
    if !config.interactive {
        builder = builder.flow_delegate(Box::new(ConsentDisabled));
    }

    let auth = builder
        .build()
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token now so consent or refresh problems surface before any traversal
    auth.token(scopes.as_slice())
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;
    debug!("Access token ready for scopes {:?}", scopes);

    // Use HTTP/1 for compatibility (HTTP/1 works better with google-gmail1)
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Read the OAuth2 client secrets
///
/// Uses the Google "installed app" JSON at `path` when it exists and falls
/// back to [`load_credentials_from_env`] otherwise.
pub async fn read_application_secret(path: &Path) -> Result<ApplicationSecret> {
    if path.exists() {
        return yup_oauth2::read_application_secret(path).await.map_err(|e| {
            GmailError::AuthError(format!("Failed to read credentials {:?}: {}", path, e))
        });
    }

    load_credentials_from_env().map_err(|_| {
        GmailError::AuthError(format!(
            "Client secrets file {:?} not found and GMAIL_CLIENT_ID/GMAIL_CLIENT_SECRET are not set",
            path
        ))
    })
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token file to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
