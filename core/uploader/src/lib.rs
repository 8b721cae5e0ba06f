//! Verified transfer of files to a remote content addressed store.
//!
//! Every file is packed into a CAR container, checked against the remote store, uploaded and
//! reconciled: the identifier computed by the remote must match the locally computed root.
//! Files that never reconcile are recorded in a dead-letter log.
pub mod client;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod progress;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use client::{HttpStore, PinStatus, RemoteStatus, RemoteStore};
pub use config::Config;
pub use dead_letter::DeadLetterLog;
pub use error::{BatchError, ClientError, ConfigError, PipelineError};
pub use events::{Event, Reporter};
pub use pipeline::{Outcome, Pipeline};
pub use progress::TransferProgress;
pub use scheduler::{BatchReport, Scheduler};
