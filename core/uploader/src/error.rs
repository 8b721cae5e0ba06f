use std::io;
use std::path::PathBuf;

use carport_ipld::errors::{CarError, PackError};
use thiserror::Error;

/// Errors talking to the remote store.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Endpoint {0} cannot be used as a base URL")]
    InvalidEndpoint(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Terminal failure of a single file's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("Container {path:?} is corrupt: {source}")]
    ContainerCorrupt { path: PathBuf, source: CarError },

    #[error("Container {path:?} could not be read: {source}")]
    ContainerUnreadable { path: PathBuf, source: CarError },

    #[error("Transfer of {path:?} failed: {source}")]
    Transfer { path: PathBuf, source: ClientError },

    #[error("Status confirmation for {path:?} failed: {source}")]
    Confirmation { path: PathBuf, source: ClientError },

    #[error("Failed to delete container {path:?}: {source}")]
    Cleanup { path: PathBuf, source: io::Error },

    #[error("Failed to append {path:?} to the dead-letter log: {source}")]
    DeadLetter { path: PathBuf, source: io::Error },

    #[error("Pipeline task panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Whether the failure must stop the whole batch instead of only the affected file.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Cleanup { .. }
                | PipelineError::DeadLetter { .. }
                | PipelineError::Panicked(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to list directory {path:?}: {source}")]
    Listing { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
