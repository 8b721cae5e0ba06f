use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use carport_ipld::{CarIndexedReader, CarStream, Cid};
use futures::StreamExt;

use crate::client::{PinStatus, RemoteStatus, RemoteStore};
use crate::error::ClientError;
use crate::progress::TransferProgress;

/// Root of a single raw leaf containing `hello`.
pub const HELLO_ROOT: &str = "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq";

pub const WRONG_ROOT: &str = "bafkreiabaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Answer with the root of the uploaded payload and remember it.
    #[default]
    Echo,
    /// Always answer with a different root.
    Mismatch,
    /// Fail every upload.
    Fail,
}

/// What to do to the containers in a directory on every status call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tamper {
    /// Overwrite them with bytes that are not a CAR file.
    Corrupt,
    /// Delete them.
    Delete,
}

/// In-memory remote store.
#[derive(Debug, Default)]
pub struct MockStore {
    mode: Mode,
    delay: Duration,
    known: Mutex<HashSet<String>>,
    failing_probes: AtomicUsize,
    tamper: Mutex<Option<(PathBuf, Tamper)>>,
    stores: AtomicUsize,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockStore {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next `n` status calls fail.
    pub fn with_failing_probes(self, n: usize) -> Self {
        self.failing_probes.store(n, Ordering::SeqCst);
        self
    }

    /// Tampers with every `.car` file in `dir` on each status call.
    pub fn tamper_with(&self, dir: &Path, tamper: Tamper) {
        *self.tamper.lock().unwrap() = Some((dir.to_path_buf(), tamper));
    }

    pub fn know(&self, cid: &str) {
        self.known.lock().unwrap().insert(cid.to_string());
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Reads the root out of an uploaded CARv1 payload.
async fn root_of(payload: &[u8]) -> String {
    let file = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(file.path(), payload).await.unwrap();
    let reader = CarIndexedReader::open(file.path()).await.unwrap();
    assert_eq!(reader.version(), 1);
    reader.roots()[0].to_string()
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn store(
        &self,
        mut car: CarStream,
        progress: &mut TransferProgress,
    ) -> Result<String, ClientError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut payload = Vec::new();
        while let Some(chunk) = car.next().await {
            let chunk = chunk.unwrap();
            progress.record(chunk.len());
            payload.extend_from_slice(&chunk);
        }
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.mode {
            Mode::Echo => {
                let root = root_of(&payload).await;
                self.know(&root);
                Ok(root)
            },
            Mode::Mismatch => Ok(WRONG_ROOT.to_string()),
            Mode::Fail => Err(ClientError::Api {
                status: 503,
                message: "unavailable".to_string(),
            }),
        }
    }

    async fn status(&self, cid: &Cid) -> Result<Option<RemoteStatus>, ClientError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let tamper = self.tamper.lock().unwrap().clone();
        if let Some((dir, tamper)) = tamper {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.extension().map_or(false, |ext| ext == "car") {
                    match tamper {
                        Tamper::Corrupt => std::fs::write(&path, b"not a car file").unwrap(),
                        Tamper::Delete => std::fs::remove_file(&path).unwrap(),
                    }
                }
            }
        }
        let failing = self
            .failing_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ClientError::Api {
                status: 500,
                message: "probe failed".to_string(),
            });
        }
        let cid = cid.to_string();
        let known = self.known.lock().unwrap().contains(&cid);
        Ok(known.then(|| RemoteStatus {
            cid,
            size: 0,
            created: None,
            pin_status: PinStatus::Queued,
            deals: Vec::new(),
        }))
    }
}
