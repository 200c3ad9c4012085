//! Credentials for the tutor service.
//!
//! The client never stores a token itself; it asks a [`CredentialProvider`]
//! immediately before each request so that rotated tokens are picked up.

use crate::error::CredentialError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tracing::debug;

/// A bearer token, redacted from `Debug` output.
#[derive(Debug)]
pub struct Credential(SecretString);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a currently valid credential.
    async fn credential(&self) -> Result<Credential, CredentialError>;

    /// Returns a credential after the service rejected the previous one.
    async fn refresh(&self) -> Result<Credential, CredentialError> {
        self.credential().await
    }
}

/// Always hands out the same token.
#[derive(Debug)]
pub struct StaticCredentialProvider {
    token: SecretString,
}

impl StaticCredentialProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        let token = self.token.expose_secret().trim();
        if token.is_empty() {
            return Err(CredentialError::Unavailable("the token is empty".to_string()));
        }
        Ok(Credential::new(token))
    }
}

/// Reads the token from a file on every call, so an external process can
/// rotate it while a session is running.
#[derive(Debug, Clone)]
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CredentialError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let token = contents.trim();
        if token.is_empty() {
            return Err(CredentialError::Unavailable(format!(
                "'{}' is empty",
                self.path.display()
            )));
        }
        debug!(path = %self.path.display(), "Loaded credential from file");
        Ok(Credential::new(token))
    }
}
