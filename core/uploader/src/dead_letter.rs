use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only log of source files that never reconciled, one path per line.
///
/// The log is never read back. Appends from concurrent pipelines are serialized and each line is
/// written with a single write.
#[derive(Clone, Debug)]
pub struct DeadLetterLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DeadLetterLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, source: &Path) -> io::Result<()> {
        let line = format!("{}\n", source.display());
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
