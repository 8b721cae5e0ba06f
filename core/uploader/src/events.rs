use std::fmt;
use std::path::{Path, PathBuf};

use carport_ipld::Cid;
use indicatif::HumanBytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::client::PinStatus;

/// Human readable status of a single file's pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Packing {
        source: PathBuf,
    },
    Packed {
        source: PathBuf,
        container: PathBuf,
        root: Cid,
    },
    AlreadyStored {
        source: PathBuf,
        root: Cid,
        pin_status: PinStatus,
    },
    ContainerSize {
        source: PathBuf,
        bytes: u64,
    },
    Endpoint {
        source: PathBuf,
        endpoint: String,
    },
    Uploading {
        source: PathBuf,
    },
    Progress {
        source: PathBuf,
        bytes_sent: u64,
        throughput: f64,
    },
    RemoteCid {
        source: PathBuf,
        cid: String,
    },
    Mismatch {
        source: PathBuf,
        root: Cid,
        remote: String,
        retries_left: u32,
    },
    DeadLettered {
        source: PathBuf,
        log: PathBuf,
    },
    Complete {
        source: PathBuf,
        pin_status: Option<PinStatus>,
        check_url: Option<String>,
    },
    Failed {
        source: PathBuf,
        message: String,
    },
}

impl Event {
    pub fn source(&self) -> &Path {
        match self {
            Event::Packing { source }
            | Event::Packed { source, .. }
            | Event::AlreadyStored { source, .. }
            | Event::ContainerSize { source, .. }
            | Event::Endpoint { source, .. }
            | Event::Uploading { source }
            | Event::Progress { source, .. }
            | Event::RemoteCid { source, .. }
            | Event::Mismatch { source, .. }
            | Event::DeadLettered { source, .. }
            | Event::Complete { source, .. }
            | Event::Failed { source, .. } => source,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Packing { .. } => write!(f, "Packing file into CAR..."),
            Event::Packed {
                container, root, ..
            } => write!(f, "Packed into CAR at: {} (CID: {root})", container.display()),
            Event::AlreadyStored {
                root, pin_status, ..
            } => write!(f, "CID {root} is already known to the remote store ({pin_status})"),
            Event::ContainerSize { bytes, .. } => {
                write!(f, "CAR file size: {}", HumanBytes(*bytes))
            },
            Event::Endpoint { endpoint, .. } => write!(f, "Using endpoint: {endpoint}"),
            Event::Uploading { .. } => write!(f, "Uploading CAR..."),
            Event::Progress {
                bytes_sent,
                throughput,
                ..
            } => write!(
                f,
                "Uploading CAR ({} sent, {}/s)...",
                HumanBytes(*bytes_sent),
                HumanBytes(*throughput as u64)
            ),
            Event::RemoteCid { cid, .. } => {
                write!(f, "CID in response (for verification): {cid}")
            },
            Event::Mismatch {
                root,
                remote,
                retries_left,
                ..
            } => write!(
                f,
                "CIDs do not match {root} and {remote} ({retries_left} retries left)"
            ),
            Event::DeadLettered { log, .. } => write!(f, "Dead saved to {}", log.display()),
            Event::Complete {
                pin_status,
                check_url,
                ..
            } => {
                write!(f, "Upload complete")?;
                if let Some(status) = pin_status {
                    write!(f, ", status: {status}")?;
                }
                if let Some(url) = check_url {
                    write!(f, ", check status here: {url}")?;
                }
                Ok(())
            },
            Event::Failed { message, .. } => write!(f, "Error: {message}"),
        }
    }
}

/// Sink for pipeline events.
///
/// Every event is logged. When a channel is attached the event is forwarded as well, so a UI can
/// render it; a closed channel is ignored.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    sender: Option<UnboundedSender<Event>>,
}

impl Reporter {
    pub fn new(sender: UnboundedSender<Event>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn report(&self, event: Event) {
        let source = event.source().display();
        match &event {
            Event::Progress { .. } => debug!("{source}: {event}"),
            Event::Mismatch { .. } | Event::DeadLettered { .. } => warn!("{source}: {event}"),
            Event::Failed { .. } => error!("{source}: {event}"),
            _ => info!("{source}: {event}"),
        }
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_progress_text() {
        let event = Event::Progress {
            source: PathBuf::from("a.bin"),
            bytes_sent: 2048,
            throughput: 1024.0,
        };
        assert_eq!(
            event.to_string(),
            "Uploading CAR (2.00 KiB sent, 1.00 KiB/s)..."
        );
        assert_eq!(event.source(), Path::new("a.bin"));
    }

    #[test]
    fn test_reporter_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = Reporter::new(tx);
        let event = Event::Packing {
            source: PathBuf::from("a.bin"),
        };
        reporter.report(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        // A closed channel does not break reporting.
        reporter.report(event);
        Reporter::default().report(Event::Uploading {
            source: PathBuf::from("b.bin"),
        });
    }
}
