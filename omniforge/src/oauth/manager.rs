//! OAuth flow management: authorize-URL construction, state-protected
//! code→token exchange, and expiry-driven refresh.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use super::{
    OAuthConfig, OAuthCredential, OAuthError, OAuthStateRecord, OAuthTokens, TokenCipher,
};
use crate::storage::OAuthRepository;

/// How long a pending flow state stays valid.
const STATE_LIFETIME_SECONDS: i64 = 600;
/// Tokens expiring within this window are refreshed before use.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Manages OAuth flows for configured integrations.
pub struct OAuthManager {
    configs: HashMap<String, OAuthConfig>,
    cipher: Arc<dyn TokenCipher>,
    repository: Arc<dyn OAuthRepository>,
    http: reqwest::Client,
}

impl OAuthManager {
    /// Manager over integration configs, a token cipher, and the OAuth
    /// store.
    #[must_use]
    pub fn new(
        configs: HashMap<String, OAuthConfig>,
        cipher: Arc<dyn TokenCipher>,
        repository: Arc<dyn OAuthRepository>,
    ) -> Self {
        Self {
            configs,
            cipher,
            repository,
            http: reqwest::Client::new(),
        }
    }

    /// Start an authorization flow.
    ///
    /// Generates a CSRF state token, persists it with a ten-minute expiry,
    /// and returns the provider's authorization URL plus the state.
    pub async fn initiate_flow(
        &self,
        integration_id: &str,
        user_id: &str,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<(String, String), OAuthError> {
        let config = self.config(integration_id)?;
        let state = generate_state(user_id, tenant_id, integration_id, session_id);

        let now = Utc::now();
        self.repository
            .save_state(&OAuthStateRecord {
                state: state.clone(),
                user_id: user_id.to_string(),
                tenant_id: tenant_id.to_string(),
                integration_id: integration_id.to_string(),
                session_id: session_id.to_string(),
                created_at: now,
                expires_at: now + Duration::seconds(STATE_LIFETIME_SECONDS),
            })
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;

        let mut url = Url::parse(&config.authorize_url)
            .map_err(|e| OAuthError::Token(format!("invalid authorize_url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("state", &state);
            if !config.scopes.is_empty() {
                // Notion wants "+" between scopes; everyone else a space.
                let separator = if integration_id == "notion" { "+" } else { " " };
                query.append_pair("scope", &config.scopes.join(separator));
            }
        }

        debug!(integration_id, user_id, "OAuth flow initiated");
        Ok((url.to_string(), state))
    }

    /// Complete a flow from the provider callback.
    ///
    /// Validates the state, exchanges the code for tokens, encrypts and
    /// stores them, and deletes the consumed state. Returns the credential
    /// id.
    pub async fn complete_flow(
        &self,
        code: &str,
        state: &str,
        workspace_name: Option<String>,
    ) -> Result<String, OAuthError> {
        let record = self
            .repository
            .get_state(state)
            .await
            .ok_or_else(|| OAuthError::State("invalid or expired OAuth state".to_string()))?;
        if record.expires_at < Utc::now() {
            return Err(OAuthError::State("OAuth state expired".to_string()));
        }

        let config = self.config(&record.integration_id)?;
        let tokens = self.exchange_code(config, code).await?;
        let credential = self.build_credential(&record, config, &tokens, workspace_name)?;

        self.repository
            .save_credential(&credential)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;
        self.repository
            .delete_state(state)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;

        info!(
            integration_id = record.integration_id,
            credential_id = credential.id,
            "OAuth flow completed"
        );
        Ok(credential.id)
    }

    /// Return a plaintext access token, refreshing first when the stored
    /// one is expired or about to expire.
    pub async fn get_access_token(
        &self,
        credential_id: &str,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<String, OAuthError> {
        let mut credential = self
            .repository
            .get_credential(credential_id)
            .await
            .ok_or_else(|| OAuthError::CredentialNotFound(credential_id.to_string()))?;

        if credential.user_id != user_id || credential.tenant_id != tenant_id {
            return Err(OAuthError::PermissionDenied);
        }

        if is_expiring(&credential) && credential.refresh_token_encrypted.is_some() {
            credential = self.refresh_token(credential).await?;
        }

        self.cipher.decrypt(&credential.access_token_encrypted)
    }

    /// Refresh a credential's tokens at the provider.
    pub async fn refresh_token(
        &self,
        mut credential: OAuthCredential,
    ) -> Result<OAuthCredential, OAuthError> {
        let refresh_encrypted = credential
            .refresh_token_encrypted
            .clone()
            .ok_or_else(|| OAuthError::Token("no refresh token available".to_string()))?;
        let refresh_token = self.cipher.decrypt(&refresh_encrypted)?;
        let config = self.config(&credential.integration_id)?;

        let response = self
            .http
            .post(&config.token_url)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Token(format!("token refresh failed: {e}")))?
            .error_for_status()
            .map_err(|e| OAuthError::Token(format!("token refresh failed: {e}")))?;

        let tokens: OAuthTokens = response
            .json()
            .await
            .map_err(|e| OAuthError::Token(format!("token refresh failed: {e}")))?;

        credential.access_token_encrypted = self.cipher.encrypt(&tokens.access_token)?;
        if let Some(refresh) = &tokens.refresh_token {
            credential.refresh_token_encrypted = Some(self.cipher.encrypt(refresh)?);
        }
        if let Some(expires_in) = tokens.expires_in {
            credential.expires_at = Some(Utc::now() + Duration::seconds(expires_in));
        }
        credential.updated_at = Utc::now();

        self.repository
            .update_credential(&credential)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;
        Ok(credential)
    }

    /// Delete every expired pending state; returns how many were removed.
    pub async fn cleanup_expired_states(&self) -> usize {
        self.repository.delete_expired_states(Utc::now()).await
    }

    fn config(&self, integration_id: &str) -> Result<&OAuthConfig, OAuthError> {
        self.configs
            .get(integration_id)
            .ok_or_else(|| OAuthError::IntegrationNotConfigured(integration_id.to_string()))
    }

    async fn exchange_code(
        &self,
        config: &OAuthConfig,
        code: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        let response = self
            .http
            .post(&config.token_url)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Token(format!("token exchange failed: {e}")))?
            .error_for_status()
            .map_err(|e| OAuthError::Token(format!("token exchange failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| OAuthError::Token(format!("token exchange failed: {e}")))
    }

    fn build_credential(
        &self,
        record: &OAuthStateRecord,
        config: &OAuthConfig,
        tokens: &OAuthTokens,
        workspace_name: Option<String>,
    ) -> Result<OAuthCredential, OAuthError> {
        let now = Utc::now();
        let scopes = tokens
            .scope
            .as_ref()
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| config.scopes.clone());
        Ok(OAuthCredential {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: record.user_id.clone(),
            tenant_id: record.tenant_id.clone(),
            integration_id: record.integration_id.clone(),
            workspace_name,
            access_token_encrypted: self.cipher.encrypt(&tokens.access_token)?,
            refresh_token_encrypted: tokens
                .refresh_token
                .as_ref()
                .map(|token| self.cipher.encrypt(token))
                .transpose()?,
            token_type: tokens.token_type.clone(),
            expires_at: tokens
                .expires_in
                .map(|seconds| now + Duration::seconds(seconds)),
            scopes,
            created_at: now,
            updated_at: now,
        })
    }
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("integrations", &self.configs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Cryptographically strong state token: hash of 32 random bytes plus the
/// flow context.
fn generate_state(
    user_id: &str,
    tenant_id: &str,
    integration_id: &str,
    session_id: &str,
) -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);

    let mut hasher = Sha256::new();
    hasher.update(random_bytes);
    hasher.update(format!("{user_id}:{tenant_id}:{integration_id}:{session_id}"));
    format!("{:x}", hasher.finalize())
}

/// Whether the credential is expired or inside the refresh buffer.
fn is_expiring(credential: &OAuthCredential) -> bool {
    match credential.expires_at {
        Some(expires_at) => expires_at < Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES),
        None => false,
    }
}
