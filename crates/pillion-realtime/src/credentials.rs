//! Credential lookup for opening connections.
//!
//! The session layer owns token issuance and refresh; the realtime client
//! only needs a bearer token at connect time. The provider is consulted
//! once per `connect()` call and the token is held by the live connection,
//! so automatic reconnect attempts reuse it rather than hammering the
//! session layer.

use async_trait::async_trait;
use thiserror::Error;

/// Why a bearer token could not be produced.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No user session is active.
    #[error("no active session")]
    NoSession,

    /// The underlying session layer failed.
    #[error("credential lookup failed: {0}")]
    Provider(String),
}

/// Supplies the bearer token embedded in the connection target.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// Produce a currently valid bearer token.
    async fn bearer_token(&self) -> Result<String, CredentialError>;
}

/// A fixed token, for tests and hosts that manage refresh themselves.
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an already issued token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}
