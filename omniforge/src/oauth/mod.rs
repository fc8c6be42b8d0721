//! OAuth integration: authorization-code flows with refresh.
//!
//! The manager drives the code→token exchange and token refresh against
//! provider endpoints; credentials are encrypted at rest through the
//! [`TokenCipher`] seam and stored behind the OAuth repository.

pub mod manager;

pub use manager::OAuthManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the OAuth layer.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The integration id is not configured.
    #[error("integration '{0}' is not configured")]
    IntegrationNotConfigured(String),

    /// The state token is unknown or expired.
    #[error("OAuth state error: {0}")]
    State(String),

    /// Token exchange or refresh failed.
    #[error("OAuth token error: {0}")]
    Token(String),

    /// The caller does not own the credential.
    #[error("credential access denied")]
    PermissionDenied,

    /// No credential with the given id exists.
    #[error("credential '{0}' not found")]
    CredentialNotFound(String),

    /// Encryption or decryption of a stored token failed.
    #[error("credential cipher error: {0}")]
    Cipher(String),

    /// The backing repository rejected the operation.
    #[error("credential storage error: {0}")]
    Storage(String),
}

/// Encryption seam for tokens at rest. The core never stores plaintext
/// tokens; concrete ciphers are a deployment concern.
pub trait TokenCipher: Send + Sync {
    /// Encrypt a plaintext token.
    fn encrypt(&self, plaintext: &str) -> Result<String, OAuthError>;
    /// Decrypt a stored token.
    fn decrypt(&self, ciphertext: &str) -> Result<String, OAuthError>;
}

/// OAuth configuration for one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Integration id, e.g. "notion", "slack".
    pub integration_id: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Provider authorization endpoint.
    pub authorize_url: String,
    /// Provider token endpoint.
    pub token_url: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
}

/// Tokens returned by a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokens {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when granted.
    pub refresh_token: Option<String>,
    /// Token type, usually "Bearer".
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, when reported.
    pub expires_in: Option<i64>,
    /// Granted scopes as a provider-formatted string.
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A pending authorization flow's state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateRecord {
    /// The state token, the record key.
    pub state: String,
    /// User who initiated the flow.
    pub user_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Integration being authorized.
    pub integration_id: String,
    /// Session to route the callback to.
    pub session_id: String,
    /// When the flow started.
    pub created_at: DateTime<Utc>,
    /// When the state stops being acceptable.
    pub expires_at: DateTime<Utc>,
}

/// A stored, encrypted credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// Credential id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Integration the credential belongs to.
    pub integration_id: String,
    /// Provider workspace name, when reported.
    pub workspace_name: Option<String>,
    /// Encrypted access token.
    pub access_token_encrypted: String,
    /// Encrypted refresh token, when granted.
    pub refresh_token_encrypted: Option<String>,
    /// Token type, usually "Bearer".
    pub token_type: String,
    /// Access-token expiry, when known.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last refresh timestamp.
    pub updated_at: DateTime<Utc>,
}
