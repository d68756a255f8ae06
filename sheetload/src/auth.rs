//! Access-credential seam
//!
//! Acquiring and refreshing OAuth tokens belongs to an external
//! collaborator. The importer only asks for a bearer token before each
//! request and surfaces `AuthError` when none can be produced.

use async_trait::async_trait;
use thiserror::Error;

/// Environment variable read by `StaticTokenProvider::from_env`
pub const ACCESS_TOKEN_ENV: &str = "SHEETLOAD_ACCESS_TOKEN";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No access token configured (set {0} or pass --access-token)")]
    Missing(&'static str),

    #[error("Credential provider failed: {0}")]
    Provider(String),
}

/// Supplies a bearer token for the remote service
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Token handed in by the caller (CLI flag or environment)
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Read the token from `SHEETLOAD_ACCESS_TOKEN`
    pub fn from_env() -> Self {
        Self {
            token: std::env::var(ACCESS_TOKEN_ENV).ok(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(AuthError::Missing(ACCESS_TOKEN_ENV)),
        }
    }
}
