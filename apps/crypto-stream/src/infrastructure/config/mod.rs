//! Configuration Module
//!
//! Settings and credential loading for the stream client binary.

mod credentials;
mod settings;

pub use credentials::{
    CredentialProvider, DotenvCredentialProvider, EnvCredentialProvider, FALLBACK_KEY_VAR,
    FALLBACK_SECRET_VAR, KEY_VAR, SECRET_VAR,
};
pub use settings::{ConfigError, StreamSettings};
