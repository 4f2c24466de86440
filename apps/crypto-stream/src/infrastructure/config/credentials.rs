//! Credential Providers
//!
//! Load Alpaca API credentials from the environment or from a `.env` file.
//! The streaming core never reads these itself; the binary loads them once
//! and hands an explicit [`Credentials`] value to the client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::ConfigError;
use crate::infrastructure::alpaca::Credentials;

/// Primary key variable.
pub const KEY_VAR: &str = "ALPACA_KEY";
/// Primary secret variable.
pub const SECRET_VAR: &str = "ALPACA_SECRET";
/// Fallback key variable.
pub const FALLBACK_KEY_VAR: &str = "API_KEY";
/// Fallback secret variable.
pub const FALLBACK_SECRET_VAR: &str = "SECRET_KEY";

/// Source of API credentials.
pub trait CredentialProvider {
    /// Load credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or secret is missing or empty.
    fn load_credentials(&self) -> Result<Credentials, ConfigError>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables.
pub struct EnvCredentialProvider {
    lookup: Lookup,
}

impl std::fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentialProvider").finish_non_exhaustive()
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvCredentialProvider {
    /// Read from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary variable lookup.
    #[must_use]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn load_credentials(&self) -> Result<Credentials, ConfigError> {
        credentials_from(&*self.lookup)
    }
}

/// Reads credentials from a `.env` file.
///
/// Variables already present in the process environment take precedence
/// over the file, matching `dotenvy`'s loading rules.
#[derive(Debug, Clone)]
pub struct DotenvCredentialProvider {
    path: PathBuf,
}

impl DotenvCredentialProvider {
    /// Read from the file at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_file(&self) -> Result<HashMap<String, String>, ConfigError> {
        let env_file = |message: String| ConfigError::EnvFile {
            path: self.path.display().to_string(),
            message,
        };

        dotenvy::from_path_iter(&self.path)
            .map_err(|e| env_file(e.to_string()))?
            .map(|item| item.map_err(|e| env_file(e.to_string())))
            .collect()
    }
}

impl CredentialProvider for DotenvCredentialProvider {
    fn load_credentials(&self) -> Result<Credentials, ConfigError> {
        let file = self.read_file()?;
        credentials_from(&|key: &str| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }
}

fn credentials_from(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Credentials, ConfigError> {
    let key = first_present(lookup, KEY_VAR, FALLBACK_KEY_VAR)?;
    let secret = first_present(lookup, SECRET_VAR, FALLBACK_SECRET_VAR)?;
    Ok(Credentials::new(key, secret)?)
}

fn first_present(
    lookup: &dyn Fn(&str) -> Option<String>,
    primary: &str,
    fallback: &str,
) -> Result<String, ConfigError> {
    match (lookup(primary), lookup(fallback)) {
        (Some(value), _) if !value.trim().is_empty() => Ok(value),
        (_, Some(value)) if !value.trim().is_empty() => Ok(value),
        (Some(_), _) | (_, Some(_)) => Err(ConfigError::EmptyValue(primary.to_string())),
        (None, None) => Err(ConfigError::MissingEnvVar(primary.to_string())),
    }
}
