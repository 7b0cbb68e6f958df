//! Startup configuration from the environment.

use std::path::{Path, PathBuf};

use memo_client::{MemoConfig, DEFAULT_BASE_URL};
use memo_crypto::{CryptoError, MemoKeyPair};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const API_KEY_VAR: &str = "MEMO_API_KEY";
pub const PRIVATE_KEY_PATH_VAR: &str = "MEMO_PRIVATE_KEY_PATH";
pub const BASE_URL_VAR: &str = "MEMO_BASE_URL";
pub const DEBUG_VAR: &str = "DEBUG";

pub const DEFAULT_PRIVATE_KEY_PATH: &str = "private.pem";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MEMO_API_KEY environment variable is required")]
    MissingApiKey,

    #[error(
        "Private key file not found: {}. Set MEMO_PRIVATE_KEY_PATH or place your private key there",
        .0.display()
    )]
    KeyFileNotFound(PathBuf),

    #[error("Failed to read private key from {}: {source}", .path.display())]
    KeyFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Private key file {} is empty", .0.display())]
    KeyFileEmpty(PathBuf),

    #[error("Invalid private key in {}: {source}", .path.display())]
    InvalidKey {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },
}

/// Everything the server needs before it can answer a request.
#[derive(Debug)]
pub struct ServerConfig {
    pub api_key: SecretString,
    pub private_key_path: PathBuf,
    pub base_url: String,
    /// Verbose logs and structured failure output from tools.
    pub debug: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            api_key: SecretString::new(api_key),
            private_key_path: var(PRIVATE_KEY_PATH_VAR)
                .unwrap_or_else(|| DEFAULT_PRIVATE_KEY_PATH.to_string())
                .into(),
            base_url: var(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            debug: var(DEBUG_VAR).is_some_and(|v| parse_flag(&v)),
        })
    }

    /// Read and parse the private key file.
    pub fn load_keys(&self) -> Result<MemoKeyPair, ConfigError> {
        load_key_file(&self.private_key_path)
    }

    pub fn memo_config(&self) -> MemoConfig {
        MemoConfig::new(self.api_key.expose_secret().as_str(), self.base_url.as_str())
    }
}

pub fn load_key_file(path: &Path) -> Result<MemoKeyPair, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::KeyFileNotFound(path.to_path_buf()));
    }

    let pem = std::fs::read_to_string(path).map_err(|source| ConfigError::KeyFileRead {
        path: path.to_path_buf(),
        source,
    })?;

    if pem.trim().is_empty() {
        return Err(ConfigError::KeyFileEmpty(path.to_path_buf()));
    }

    MemoKeyPair::from_pem(&pem).map_err(|source| ConfigError::InvalidKey {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
