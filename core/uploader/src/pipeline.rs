use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use carport_ipld::errors::CarError;
use carport_ipld::{pack, CarIndexedReader, Cid, PackOptions};
use tracing::{debug, error, warn};
use typed_builder::TypedBuilder;

use crate::client::{RemoteStatus, RemoteStore};
use crate::config::Config;
use crate::dead_letter::DeadLetterLog;
use crate::error::PipelineError;
use crate::events::{Event, Reporter};
use crate::progress::TransferProgress;

/// Terminal, non-error result of a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Uploaded and reconciled. The status is `None` when the remote has not indexed it yet.
    Stored {
        root: Cid,
        status: Option<RemoteStatus>,
    },
    /// The remote already knew the root, nothing was uploaded.
    AlreadyStored { root: Cid, status: RemoteStatus },
    /// The remote never agreed on the root and the source was written to the dead-letter log.
    DeadLettered { root: Cid, attempts: u32 },
}

impl Outcome {
    pub fn root(&self) -> &Cid {
        match self {
            Outcome::Stored { root, .. }
            | Outcome::AlreadyStored { root, .. }
            | Outcome::DeadLettered { root, .. } => root,
        }
    }
}

/// Result of a single pack and upload attempt.
enum Attempt {
    Done(Outcome),
    Mismatch { root: Cid, remote: String },
    Unreadable { path: PathBuf, source: CarError },
}

/// Packs, deduplicates, uploads and reconciles a single file.
#[derive(TypedBuilder)]
pub struct Pipeline<S> {
    store: Arc<S>,
    dead_letter: DeadLetterLog,
    #[builder(default)]
    pack: PackOptions,
    /// Extra attempts after an identifier mismatch.
    #[builder(default = 3)]
    retries: u32,
    #[builder(default = std::env::temp_dir())]
    temp_dir: PathBuf,
    #[builder(default = 1024 * 1024)]
    upload_chunk_size: usize,
    #[builder(default)]
    reporter: Reporter,
}

impl<S: RemoteStore> Pipeline<S> {
    pub fn from_config(config: &Config, store: Arc<S>, reporter: Reporter) -> Self {
        Self::builder()
            .store(store)
            .dead_letter(DeadLetterLog::new(config.dead_letter.clone()))
            .pack(config.pack.clone())
            .retries(config.retries)
            .temp_dir(config.temp_dir())
            .upload_chunk_size(config.upload_chunk_size)
            .reporter(reporter)
            .build()
    }

    pub fn dead_letter(&self) -> &DeadLetterLog {
        &self.dead_letter
    }

    pub async fn run(&self, source: &Path) -> Result<Outcome, PipelineError> {
        let result = self.run_attempts(source).await;
        if let Err(e) = &result {
            self.reporter.report(Event::Failed {
                source: source.to_path_buf(),
                message: e.to_string(),
            });
        }
        result
    }

    async fn run_attempts(&self, source: &Path) -> Result<Outcome, PipelineError> {
        let attempts = self.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let container = ContainerGuard::new(self.container_path(source));
            let result = self.attempt(source, container.path()).await;
            let step = match (result, container.release().await) {
                (Ok(step), Ok(())) => step,
                (Ok(_), Err(cleanup)) => return Err(cleanup),
                (Err(e), Ok(())) => return Err(e),
                (Err(e), Err(cleanup)) => {
                    error!("{cleanup}");
                    return Err(e);
                },
            };

            let retries_left = attempts - attempt;
            match step {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Mismatch { root, remote } => {
                    self.reporter.report(Event::Mismatch {
                        source: source.to_path_buf(),
                        root,
                        remote,
                        retries_left,
                    });
                    if retries_left == 0 {
                        self.dead_letter.append(source).await.map_err(|e| {
                            PipelineError::DeadLetter {
                                path: source.to_path_buf(),
                                source: e,
                            }
                        })?;
                        self.reporter.report(Event::DeadLettered {
                            source: source.to_path_buf(),
                            log: self.dead_letter.path().to_path_buf(),
                        });
                        return Ok(Outcome::DeadLettered {
                            root,
                            attempts: attempt,
                        });
                    }
                },
                Attempt::Unreadable { path, source: e } => {
                    if retries_left == 0 {
                        return Err(PipelineError::ContainerUnreadable { path, source: e });
                    }
                    warn!("{}: container {path:?} unreadable, packing again: {e}", source.display());
                },
            }
        }
    }

    async fn attempt(&self, source: &Path, container: &Path) -> Result<Attempt, PipelineError> {
        self.reporter.report(Event::Packing {
            source: source.to_path_buf(),
        });
        let packed = pack(source, container, &self.pack).await?;
        let root = packed.root;
        self.reporter.report(Event::Packed {
            source: source.to_path_buf(),
            container: container.to_path_buf(),
            root,
        });

        match self.store.status(&root).await {
            Ok(Some(status)) => {
                self.reporter.report(Event::AlreadyStored {
                    source: source.to_path_buf(),
                    root,
                    pin_status: status.pin_status.clone(),
                });
                return Ok(Attempt::Done(Outcome::AlreadyStored { root, status }));
            },
            Ok(None) => {},
            Err(e) => warn!(
                "{}: status probe for {root} failed, treating it as absent: {e}",
                source.display()
            ),
        }

        let bytes = tokio::fs::metadata(container)
            .await
            .map(|m| m.len())
            .unwrap_or(packed.summary.file_size);
        self.reporter.report(Event::ContainerSize {
            source: source.to_path_buf(),
            bytes,
        });

        let reader = match CarIndexedReader::open(container).await {
            Ok(reader) => reader,
            Err(e) => return container_failure(container, e),
        };
        if reader.roots() != [root].as_slice() {
            return Err(PipelineError::ContainerCorrupt {
                path: container.to_path_buf(),
                source: CarError::Corrupt(format!(
                    "expected root {root}, found {:?}",
                    reader.roots()
                )),
            });
        }
        if let Some(endpoint) = self.store.endpoint() {
            self.reporter.report(Event::Endpoint {
                source: source.to_path_buf(),
                endpoint: endpoint.to_string(),
            });
        }
        let body = match reader.stream(self.upload_chunk_size).await {
            Ok(body) => body,
            Err(e) => return container_failure(container, e),
        };

        let mut progress = TransferProgress::new(
            source.to_path_buf(),
            reader.data_size(),
            self.reporter.clone(),
        );
        self.reporter.report(Event::Uploading {
            source: source.to_path_buf(),
        });
        let remote = self
            .store
            .store(body, &mut progress)
            .await
            .map_err(|e| PipelineError::Transfer {
                path: source.to_path_buf(),
                source: e,
            })?;
        debug!(
            "{}: sent {} bytes in {:?}",
            source.display(),
            progress.bytes_sent(),
            progress.elapsed()
        );
        self.reporter.report(Event::RemoteCid {
            source: source.to_path_buf(),
            cid: remote.clone(),
        });

        if remote != root.to_string() {
            return Ok(Attempt::Mismatch { root, remote });
        }

        let status = self
            .store
            .status(&root)
            .await
            .map_err(|e| PipelineError::Confirmation {
                path: source.to_path_buf(),
                source: e,
            })?;
        self.reporter.report(Event::Complete {
            source: source.to_path_buf(),
            pin_status: status.as_ref().map(|s| s.pin_status.clone()),
            check_url: self.store.check_url(&remote),
        });
        Ok(Attempt::Done(Outcome::Stored { root, status }))
    }

    /// `<temp_dir>/<basename>.<unix millis>.car`
    fn container_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.temp_dir.join(format!("{name}.{millis}.car"))
    }
}

fn container_failure(path: &Path, e: CarError) -> Result<Attempt, PipelineError> {
    if e.is_corrupt() {
        Err(PipelineError::ContainerCorrupt {
            path: path.to_path_buf(),
            source: e,
        })
    } else {
        Ok(Attempt::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Owns a temporary container path for the duration of one attempt.
///
/// [`ContainerGuard::release`] deletes the file and reports failures. If the guard is dropped
/// without being released (a panic or a cancelled task) the file is removed on a best effort
/// basis.
struct ContainerGuard {
    path: PathBuf,
    released: bool,
}

impl ContainerGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn release(mut self) -> Result<(), PipelineError> {
        let result = match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Cleanup {
                path: self.path.clone(),
                source: e,
            }),
        };
        self.released = true;
        result
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
