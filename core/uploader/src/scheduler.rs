use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::client::RemoteStore;
use crate::error::{BatchError, PipelineError};
use crate::pipeline::{Outcome, Pipeline};

/// Summary of a batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub stored: usize,
    pub already_stored: usize,
    pub dead_lettered: usize,
    /// Files whose pipeline failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Stored { .. } => self.stored += 1,
            Outcome::AlreadyStored { .. } => self.already_stored += 1,
            Outcome::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.stored + self.already_stored + self.dead_lettered + self.failed.len()
    }
}

/// Runs one pipeline per directory entry, in waves of at most `concurrency` files.
pub struct Scheduler<S> {
    pipeline: Arc<Pipeline<S>>,
    concurrency: usize,
}

impl<S: RemoteStore + 'static> Scheduler<S> {
    pub fn new(pipeline: Pipeline<S>, concurrency: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            concurrency: concurrency.max(1),
        }
    }

    /// Processes every file directly inside `directory`.
    ///
    /// A wave is always awaited in full. Per-file failures are collected in the report, a batch
    /// fatal failure stops admission after the current wave and is returned.
    pub async fn run_all(&self, directory: &Path) -> Result<BatchReport, BatchError> {
        let files = list_files(directory).await?;
        info!("found {} files in {directory:?}", files.len());

        let mut report = BatchReport::default();
        for (i, wave) in files.chunks(self.concurrency).enumerate() {
            info!("starting wave {} with {} files", i + 1, wave.len());
            let mut set = JoinSet::new();
            for path in wave {
                let pipeline = self.pipeline.clone();
                let path = path.clone();
                set.spawn(async move {
                    let result = pipeline.run(&path).await;
                    (path, result)
                });
            }

            let mut fatal = None;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => report.record(&outcome),
                    Ok((path, Err(e))) if e.is_batch_fatal() => {
                        error!("{}: {e}", path.display());
                        fatal.get_or_insert(e);
                    },
                    Ok((path, Err(e))) => {
                        error!("{}: {e}", path.display());
                        report.failed.push((path, e.to_string()));
                    },
                    Err(e) => {
                        error!("pipeline task failed: {e}");
                        fatal.get_or_insert(PipelineError::Panicked(e.to_string()));
                    },
                }
            }
            if let Some(e) = fatal {
                return Err(e.into());
            }
        }

        info!(
            "batch finished: {} stored, {} already stored, {} dead-lettered, {} failed",
            report.stored,
            report.already_stored,
            report.dead_lettered,
            report.failed.len()
        );
        Ok(report)
    }
}

/// Lists the files directly inside `directory`, sorted by name.
async fn list_files(directory: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let listing_err = |e| BatchError::Listing {
        path: directory.to_path_buf(),
        source: e,
    };
    let mut entries = tokio::fs::read_dir(directory).await.map_err(listing_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_err)? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => info!("skipping directory {path:?}"),
            _ => files.push(path),
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dead_letter::DeadLetterLog;
    use crate::events::Reporter;
    use crate::test_utils::{MockStore, Mode};

    fn write_files(dir: &Path, count: usize) {
        for i in 0..count {
            std::fs::write(dir.join(format!("file-{i:02}.txt")), format!("content {i}")).unwrap();
        }
    }

    fn scheduler(
        store: Arc<MockStore>,
        temp: &Path,
        dead_letter: PathBuf,
        retries: u32,
        concurrency: usize,
    ) -> Scheduler<MockStore> {
        let pipeline = Pipeline::builder()
            .store(store)
            .dead_letter(DeadLetterLog::new(dead_letter))
            .retries(retries)
            .temp_dir(temp.to_path_buf())
            .reporter(Reporter::default())
            .build();
        Scheduler::new(pipeline, concurrency)
    }

    #[tokio::test]
    async fn test_run_all() {
        let input = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_files(input.path(), 5);
        std::fs::create_dir(input.path().join("nested")).unwrap();
        std::fs::write(input.path().join("nested").join("inner.txt"), "inner").unwrap();

        let store = Arc::new(MockStore::new(Mode::Echo));
        let report = scheduler(store.clone(), temp.path(), temp.path().join("dead.txt"), 3, 2)
            .run_all(input.path())
            .await
            .unwrap();
        assert_eq!(report.stored, 5);
        assert_eq!(report.total(), 5);
        assert_eq!(store.stores(), 5);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let input = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_files(input.path(), 10);

        let store = Arc::new(MockStore::new(Mode::Echo).with_delay(Duration::from_millis(20)));
        let report = scheduler(store.clone(), temp.path(), temp.path().join("dead.txt"), 3, 3)
            .run_all(input.path())
            .await
            .unwrap();
        assert_eq!(report.stored, 10);
        assert!(store.max_in_flight() <= 3);
        assert!(store.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_file_failures_do_not_stop_the_batch() {
        let input = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_files(input.path(), 4);

        let store = Arc::new(MockStore::new(Mode::Fail));
        let report = scheduler(store.clone(), temp.path(), temp.path().join("dead.txt"), 3, 2)
            .run_all(input.path())
            .await
            .unwrap();
        assert_eq!(report.failed.len(), 4);
        assert!(report
            .failed
            .iter()
            .any(|(path, _)| path.ends_with("file-00.txt")));
        assert_eq!(store.stores(), 4);
    }

    #[tokio::test]
    async fn test_dead_lettered_files_are_counted() {
        let input = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_files(input.path(), 3);
        let dead_letter = temp.path().join("dead.txt");

        let store = Arc::new(MockStore::new(Mode::Mismatch));
        let report = scheduler(store.clone(), temp.path(), dead_letter.clone(), 1, 10)
            .run_all(input.path())
            .await
            .unwrap();
        assert_eq!(report.dead_lettered, 3);
        assert_eq!(store.stores(), 6);
        let dead = std::fs::read_to_string(dead_letter).unwrap();
        assert_eq!(dead.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_admission() {
        let input = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        write_files(input.path(), 4);
        // The dead-letter log cannot be created.
        let dead_letter = temp.path().join("missing").join("dead.txt");

        let store = Arc::new(MockStore::new(Mode::Mismatch));
        let err = scheduler(store.clone(), temp.path(), dead_letter, 0, 2)
            .run_all(input.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::Pipeline(PipelineError::DeadLetter { .. })
        ));
        // only the first wave ran
        assert_eq!(store.stores(), 2);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::new(Mode::Echo));
        let err = scheduler(store, temp.path(), temp.path().join("dead.txt"), 3, 2)
            .run_all(&temp.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Listing { .. }));
    }
}
