use std::path::{Path, PathBuf};
use std::time::Duration;

use carport_ipld::{PackOptions, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://api.nft.storage";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote store.
    pub endpoint: Url,
    /// Number of files processed concurrently in one wave.
    pub concurrency: usize,
    /// Extra attempts after an identifier mismatch.
    pub retries: u32,
    /// Append-only log of files that never reconciled, relative to the working directory.
    pub dead_letter: PathBuf,
    /// Directory for temporary containers, the system temp directory when unset.
    pub temp_dir: Option<PathBuf>,
    /// Size of the chunks streamed to the remote store.
    pub upload_chunk_size: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub pack: PackOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.parse().expect("Failed to parse default endpoint"),
            concurrency: 1000,
            retries: 3,
            dead_letter: PathBuf::from("dead.txt"),
            temp_dir: None,
            upload_chunk_size: 1024 * 1024,
            request_timeout: Duration::from_secs(600),
            pack: PackOptions::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.upload_chunk_size == 0 {
            return invalid("upload_chunk_size must be at least 1");
        }
        if self.pack.chunk_size == 0 || self.pack.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "pack.chunk_size must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }
        if self.pack.max_children < 2 {
            return invalid("pack.max_children must be at least 2");
        }
        if self.endpoint.cannot_be_a_base() {
            return invalid("endpoint must be a base URL");
        }
        Ok(())
    }
}
