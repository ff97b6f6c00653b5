//! Forge credentials
//!
//! The credential is never taken from a command-line argument. It comes from
//! an environment variable, from a line on a reader (stdin), or is injected
//! directly in tests.

use crate::{MapError, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Default environment variable holding the forge token or password
pub const DEFAULT_TOKEN_VAR: &str = "CONTRIB_MAP_TOKEN";

/// Username and secret for HTTP basic auth against the forge
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Supplies the secret for a given forge username
pub trait CredentialProvider {
    fn credentials(&self, username: &str) -> Result<Credentials>;
}

/// Reads the secret from an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn is_set(&self) -> bool {
        std::env::var(&self.var).map(|v| !v.is_empty()).unwrap_or(false)
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_VAR)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self, username: &str) -> Result<Credentials> {
        match std::env::var(&self.var) {
            Ok(secret) if !secret.is_empty() => Ok(Credentials::new(username, secret)),
            _ => Err(MapError::MissingCredential(format!(
                "{} (set {})",
                username, self.var
            ))),
        }
    }
}

/// Reads the secret as the first line of a reader, optionally printing a prompt
pub struct ReaderCredentials<R> {
    reader: Mutex<R>,
    prompt: bool,
}

impl<R: BufRead> ReaderCredentials<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
            prompt: false,
        }
    }

    /// Print "Forge token for <user>: " on stderr before reading
    pub fn with_prompt(mut self) -> Self {
        self.prompt = true;
        self
    }
}

impl<R: BufRead> CredentialProvider for ReaderCredentials<R> {
    fn credentials(&self, username: &str) -> Result<Credentials> {
        if self.prompt {
            let mut stderr = std::io::stderr();
            write!(stderr, "Forge token for {}: ", username)?;
            stderr.flush()?;
        }

        let mut line = String::new();
        {
            let mut reader = self
                .reader
                .lock()
                .map_err(|_| MapError::MissingCredential(username.to_string()))?;
            reader.read_line(&mut line)?;
        }

        let secret = line.trim_end_matches(&['\r', '\n'][..]);
        if secret.is_empty() {
            return Err(MapError::MissingCredential(username.to_string()));
        }
        Ok(Credentials::new(username, secret))
    }
}

/// Fixed credentials
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self, _username: &str) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}
