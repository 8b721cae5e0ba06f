use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use carport_ipld::CarStream;
use futures::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::events::{Event, Reporter};

/// Running totals of one upload.
#[derive(Debug)]
pub struct TransferProgress {
    source: PathBuf,
    total: u64,
    bytes_sent: u64,
    chunks: u64,
    started: Instant,
    reporter: Reporter,
}

impl TransferProgress {
    pub fn new(source: PathBuf, total: u64, reporter: Reporter) -> Self {
        Self {
            source,
            total,
            bytes_sent: 0,
            chunks: 0,
            started: Instant::now(),
            reporter,
        }
    }

    /// Records a chunk handed to the transport.
    pub fn record(&mut self, chunk_size: usize) {
        self.bytes_sent += chunk_size as u64;
        self.chunks += 1;
        self.reporter.report(Event::Progress {
            source: self.source.clone(),
            bytes_sent: self.bytes_sent,
            throughput: self.throughput(),
        });
    }

    /// Size of the payload being sent.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bytes per second since the transfer started.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Polls `request` to completion while recording the chunk sizes arriving on `chunks`.
    pub async fn drive<F: Future>(
        &mut self,
        request: F,
        mut chunks: UnboundedReceiver<usize>,
    ) -> F::Output {
        tokio::pin!(request);
        loop {
            tokio::select! {
                biased;
                Some(size) = chunks.recv() => self.record(size),
                output = &mut request => {
                    while let Ok(size) = chunks.try_recv() {
                        self.record(size);
                    }
                    return output;
                },
            }
        }
    }
}

/// Wraps a body stream so that each chunk's size is sent on the returned channel once the
/// consumer has pulled the chunk after it, i.e. once the chunk has been handed off.
pub fn track(inner: CarStream) -> (ProgressStream, UnboundedReceiver<usize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = ProgressStream {
        inner,
        pending: None,
        tx,
    };
    (stream, rx)
}

pub struct ProgressStream {
    inner: CarStream,
    pending: Option<usize>,
    tx: UnboundedSender<usize>,
}

impl Stream for ProgressStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let next = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(item) = &next {
            if let Some(size) = this.pending.take() {
                let _ = this.tx.send(size);
            }
            if let Some(Ok(chunk)) = item {
                this.pending = Some(chunk.len());
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;

    fn chunks(sizes: &[usize]) -> CarStream {
        let items: Vec<std::io::Result<Bytes>> = sizes
            .iter()
            .map(|&n| Ok(Bytes::from(vec![0u8; n])))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_chunk_reported_after_handoff() {
        let (mut stream, mut rx) = track(chunks(&[3, 5, 7]));

        stream.next().await.unwrap().unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        stream.next().await.unwrap().unwrap();
        assert_eq!(rx.try_recv(), Ok(3));

        stream.next().await.unwrap().unwrap();
        assert_eq!(rx.try_recv(), Ok(5));

        assert!(stream.next().await.is_none());
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[tokio::test]
    async fn test_drive_accumulates() {
        let (stream, rx) = track(chunks(&[10, 20, 30, 40]));
        let mut progress = TransferProgress::new(PathBuf::from("f"), 100, Reporter::default());
        let consumed = progress
            .drive(
                async move {
                    let mut total = 0;
                    futures::pin_mut!(stream);
                    while let Some(chunk) = stream.next().await {
                        total += chunk.unwrap().len();
                        tokio::task::yield_now().await;
                    }
                    total
                },
                rx,
            )
            .await;
        assert_eq!(consumed, 100);
        assert_eq!(progress.bytes_sent(), 100);
        assert_eq!(progress.chunks(), 4);
        assert_eq!(progress.total(), 100);
    }
}
