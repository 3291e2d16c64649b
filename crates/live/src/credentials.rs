//! Access-token sources.
//!
//! A source is consulted when a transport is constructed and again on
//! every `connect()`, so a token that rotates between attempts is picked up.

use std::path::PathBuf;

use tracing::warn;

/// Synchronous accessor for the current access token
pub trait CredentialSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        normalize_token(self())
    }
}

/// A fixed token (or none at all)
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl CredentialSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        normalize_token(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvToken {
    fn access_token(&self) -> Option<String> {
        normalize_token(std::env::var(&self.var).ok())
    }
}

/// Reads the token from a file on every call; a missing file means no token
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileToken {
    fn access_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => normalize_token(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    component = "credentials",
                    event = "credentials.read_failed",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read token file"
                );
                None
            }
        }
    }
}

fn normalize_token(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
