use std::io;
use std::path::PathBuf;

use ipld_core::cid::Cid;
use thiserror::Error;

/// Error type for building and decoding DAG nodes.
#[derive(Debug, Error)]
pub enum IpldError {
    #[error("IPLD error: Error parsing Cid {0}")]
    CidParsingError(#[from] ipld_core::cid::Error),

    #[error("IPLD error: Error building multihash {0}")]
    MultihashError(#[from] ipld_core::cid::multihash::Error),

    #[error("IPLD error: Error encoding DAG-PB node {0}")]
    DagPbError(#[from] ipld_dagpb::Error),

    #[error("IPLD error: UnixFS error {0}")]
    UnixFsProtobufError(#[from] quick_protobuf::Error),

    #[error("IPLD error: Error decoding UnixFS data - Cid {0}")]
    UnixFsDecodingError(Cid),

    #[error("IPLD error: Unsupported UnixFS data type - Cid {0}")]
    UnsupportedUnixFsDataType(Cid),

    #[error("IPLD error: Unsupported codec - Cid {0}")]
    UnsupportedCodec(Cid),

    #[error("IPLD error: Unsupported multihash code: {0}")]
    MultihashCodeError(u64),
}

/// Error type for reading and writing CAR containers.
///
/// `Io` failures are transient from the caller's point of view, `Corrupt` means the bytes on disk
/// cannot be trusted and retrying the same container is pointless.
#[derive(Debug, Error)]
pub enum CarError {
    #[error("CAR error: I/O failure: {0}")]
    Io(io::Error),

    #[error("CAR error: Corrupt container: {0}")]
    Corrupt(String),

    #[error("CAR error: Block not found - Cid {0}")]
    BlockNotFound(Cid),

    #[error("CAR error: Digest mismatch - Cid {0}")]
    DigestMismatch(Cid),

    #[error("CAR error: {0}")]
    Ipld(#[from] IpldError),
}

impl CarError {
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, CarError::Io(_))
    }
}

impl From<io::Error> for CarError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CarError::Corrupt("unexpected end of container".to_string())
        } else {
            CarError::Io(e)
        }
    }
}

/// Error returned by [`crate::pack`].
#[derive(Debug, Error)]
pub enum PackError {
    #[error("Failed to read source {path:?}: {source}")]
    Source { path: PathBuf, source: io::Error },

    #[error("Failed to write container {output:?} for {path:?}: {source}")]
    Container {
        path: PathBuf,
        output: PathBuf,
        source: CarError,
    },

    #[error("Failed to hash content of {path:?}: {source}")]
    Hashing { path: PathBuf, source: IpldError },
}

impl PackError {
    /// The source file being packed.
    pub fn path(&self) -> &PathBuf {
        match self {
            PackError::Source { path, .. }
            | PackError::Container { path, .. }
            | PackError::Hashing { path, .. } => path,
        }
    }
}
