use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use ipld_core::cid::Cid;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::header::{CarV2Header, FirstSection, V2_HEADER_LEN};
use super::index::{Index, IndexEntry};
use super::varint::read_varint_usize;
use crate::block::verify;
use crate::dag::DagNode;
use crate::errors::{CarError, IpldError};

/// Upper bound for a single section (and the CARv1 header) read into memory.
const MAX_ALLOC: usize = 8 * 1024 * 1024;

/// Byte stream of a container's CARv1 payload.
pub type CarStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Random access reader over a CAR file.
///
/// CARv2 files are opened through their embedded index without touching the payload. Plain CARv1
/// files are indexed with a single sequential scan.
#[derive(Debug)]
pub struct CarIndexedReader {
    path: PathBuf,
    file: BufReader<File>,
    version: u64,
    roots: Vec<Cid>,
    data_offset: u64,
    data_size: u64,
    index: Index,
}

impl CarIndexedReader {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, CarError> {
        let path = path.as_ref().to_path_buf();
        let file_len = tokio::fs::metadata(&path).await?.len();
        let mut file = BufReader::new(File::open(&path).await?);

        let (first, first_len) = read_first_section(&mut file).await?;
        let mut reader = match first {
            FirstSection::V1(roots) => Self {
                path,
                file,
                version: 1,
                roots,
                data_offset: 0,
                data_size: file_len,
                index: Index::default(),
            },
            FirstSection::V2 => {
                let mut buf = [0; V2_HEADER_LEN as usize];
                file.read_exact(&mut buf).await?;
                let header = CarV2Header::from_bytes(&buf);
                let data_end = header.data_offset.checked_add(header.data_size);
                if header.data_offset < first_len + V2_HEADER_LEN
                    || data_end.map_or(true, |end| end > file_len)
                    || header.index_offset > file_len
                {
                    return Err(CarError::Corrupt(format!(
                        "CARv2 header out of bounds: {header:?}"
                    )));
                }

                // Skip the optional padding and read the wrapped CARv1 header.
                file.seek(SeekFrom::Start(header.data_offset)).await?;
                let roots = match read_first_section(&mut file).await? {
                    (FirstSection::V1(roots), _) => roots,
                    (FirstSection::V2, _) => {
                        return Err(CarError::Corrupt("nested CARv2 payload".to_string()))
                    },
                };
                let index = if header.index_offset == 0 {
                    Index::default()
                } else {
                    file.seek(SeekFrom::Start(header.index_offset)).await?;
                    let mut bytes = Vec::new();
                    file.read_to_end(&mut bytes).await?;
                    Index::from_bytes(&bytes)?
                };
                Self {
                    path,
                    file,
                    version: 2,
                    roots,
                    data_offset: header.data_offset,
                    data_size: header.data_size,
                    index,
                }
            },
        };

        if reader.index.is_empty() {
            reader.index = reader.scan().await?;
        }
        debug!(
            "opened CARv{} {:?} with {} blocks",
            reader.version,
            reader.path,
            reader.index.len()
        );
        Ok(reader)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Number of distinct blocks in the container.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Size of the CARv1 payload.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub async fn contains(&mut self, cid: &Cid) -> Result<bool, CarError> {
        Ok(self.locate(cid).await?.is_some())
    }

    /// Reads and verifies a single block.
    pub async fn get(&mut self, cid: &Cid) -> Result<Bytes, CarError> {
        let data = self
            .locate(cid)
            .await?
            .ok_or(CarError::BlockNotFound(*cid))?;
        if !verify(cid, &data)? {
            return Err(CarError::DigestMismatch(*cid));
        }
        Ok(data)
    }

    /// Lists the CIDs of all blocks in payload order.
    pub async fn cids(&mut self) -> Result<Vec<Cid>, CarError> {
        let mut entries = self.index.entries().to_vec();
        entries.sort_by_key(IndexEntry::offset);
        let mut cids = Vec::with_capacity(entries.len());
        for entry in &entries {
            cids.push(self.read_section(entry).await?.0);
        }
        Ok(cids)
    }

    /// Streams the CARv1 payload in chunks of `chunk_size` bytes.
    pub async fn stream(&self, chunk_size: usize) -> Result<CarStream, CarError> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.data_offset)).await?;
        let reader = file.take(self.data_size);
        Ok(Box::pin(ReaderStream::with_capacity(reader, chunk_size)))
    }

    /// Walks the file DAG below `root` depth first and writes its content to `out`.
    pub async fn export<W: AsyncWrite + Unpin>(
        &mut self,
        root: &Cid,
        out: &mut W,
    ) -> Result<u64, CarError> {
        let mut stack = vec![*root];
        let mut written = 0;
        while let Some(cid) = stack.pop() {
            let data = self.get(&cid).await?;
            match DagNode::decode(&cid, &data)? {
                DagNode::Leaf(content) => {
                    out.write_all(&content).await?;
                    written += content.len() as u64;
                },
                DagNode::File(links) => stack.extend(links.iter().rev().map(|l| *l.cid())),
                DagNode::Directory(links) if links.len() == 1 => stack.push(*links[0].cid()),
                DagNode::Directory(_) => {
                    return Err(IpldError::UnsupportedUnixFsDataType(cid).into());
                },
            }
        }
        out.flush().await?;
        Ok(written)
    }

    /// Reads the section stored under exactly `cid`, skipping blocks that only share its digest.
    async fn locate(&mut self, cid: &Cid) -> Result<Option<Bytes>, CarError> {
        let candidates = self.index.find(cid.hash().digest()).to_vec();
        for entry in &candidates {
            let (section_cid, data) = self.read_section(entry).await?;
            if section_cid == *cid {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    async fn read_section(&mut self, entry: &IndexEntry) -> Result<(Cid, Bytes), CarError> {
        self.file
            .seek(SeekFrom::Start(self.data_offset + entry.offset()))
            .await?;
        let Some((len, _)) = read_varint_usize(&mut self.file).await? else {
            return Err(CarError::Corrupt(format!(
                "no section at offset {}",
                entry.offset()
            )));
        };
        let buf = self.read_bytes(len).await?;
        split_section(buf)
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, CarError> {
        if len > MAX_ALLOC {
            return Err(CarError::Corrupt("Data block too large".to_string()));
        }
        let mut buf = vec![0; len];
        self.file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Builds the index by walking every section of the payload.
    async fn scan(&mut self) -> Result<Index, CarError> {
        self.file.seek(SeekFrom::Start(self.data_offset)).await?;
        let (_, header_len) = read_first_section(&mut self.file).await?;
        let mut offset = header_len;
        let mut entries = Vec::new();
        while offset < self.data_size {
            let Some((len, prefix)) = read_varint_usize(&mut self.file).await? else {
                break;
            };
            let (cid, _) = split_section(self.read_bytes(len).await?)?;
            entries.push(IndexEntry::new(cid.hash().digest().to_vec(), offset));
            offset += (prefix + len) as u64;
        }
        Ok(Index::new(entries))
    }
}

/// Reads the length-prefixed first section and returns it with its total length.
async fn read_first_section(file: &mut BufReader<File>) -> Result<(FirstSection, u64), CarError> {
    let Some((len, prefix)) = read_varint_usize(file).await? else {
        return Err(CarError::Corrupt("empty container".to_string()));
    };
    if len == 0 || len > MAX_ALLOC {
        return Err(CarError::Corrupt(format!("invalid header length {len}")));
    }
    let mut buf = vec![0; len];
    file.read_exact(&mut buf).await?;
    Ok((FirstSection::decode(&buf)?, (prefix + len) as u64))
}

fn split_section(buf: Bytes) -> Result<(Cid, Bytes), CarError> {
    let mut cursor = Cursor::new(buf.as_ref());
    let cid = Cid::read_bytes(&mut cursor)
        .map_err(|e| CarError::Corrupt(format!("invalid section CID: {e}")))?;
    let pos = cursor.position() as usize;
    Ok((cid, buf.slice(pos..)))
}
