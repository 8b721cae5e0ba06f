use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use ipld_core::cid::multihash::Multihash;
use ipld_core::cid::Cid;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::trace;

use super::header::{encode_v1_header, CarV2Header, PRAGMA, PRAGMA_LEN, V2_HEADER_LEN};
use super::index::{Index, IndexEntry};
use crate::block::{Block, DAG_PB, SHA2_256};
use crate::errors::CarError;

/// Summary of a finished container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarSummary {
    pub root: Cid,
    pub blocks: usize,
    /// Size of the CARv1 payload, which is what gets transferred.
    pub data_size: u64,
    /// Size of the whole file on disk.
    pub file_size: u64,
}

/// Streams blocks into a CARv2 file.
///
/// The root is usually the last block produced, so the CARv1 header is first written with a
/// placeholder CID of the same encoded length and patched by [`CarWriter::finish`], together with
/// the CARv2 header.
pub struct CarWriter {
    path: PathBuf,
    file: BufWriter<File>,
    header_len: usize,
    data_size: u64,
    written: HashSet<Cid>,
    entries: Vec<IndexEntry>,
}

impl CarWriter {
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self, CarError> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path).await?);
        file.write_all(&PRAGMA).await?;
        file.write_all(&[0; V2_HEADER_LEN as usize]).await?;
        let header = encode_v1_header(&placeholder_root()?)?;
        file.write_all(&header).await?;

        Ok(Self {
            path,
            file,
            header_len: header.len(),
            data_size: header.len() as u64,
            written: HashSet::new(),
            entries: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a block. Blocks already in the container are skipped.
    pub async fn write_block(&mut self, block: &Block) -> Result<(), CarError> {
        if !self.written.insert(*block.cid()) {
            trace!("skipping duplicate block {}", block.cid());
            return Ok(());
        }
        let cid = block.cid().to_bytes();
        let mut buf = unsigned_varint::encode::usize_buffer();
        let prefix = unsigned_varint::encode::usize(cid.len() + block.len(), &mut buf);

        self.entries.push(IndexEntry::new(
            block.cid().hash().digest().to_vec(),
            self.data_size,
        ));
        self.file.write_all(prefix).await?;
        self.file.write_all(&cid).await?;
        self.file.write_all(block.data()).await?;
        self.data_size += (prefix.len() + cid.len() + block.len()) as u64;
        Ok(())
    }

    /// Writes the index, patches the headers and syncs the file.
    pub async fn finish(mut self, root: &Cid) -> Result<CarSummary, CarError> {
        let header = encode_v1_header(root)?;
        if header.len() != self.header_len {
            return Err(CarError::Corrupt(format!(
                "root {root} does not fit the reserved header"
            )));
        }

        let blocks = self.entries.len();
        let index = Index::new(self.entries).to_bytes();
        self.file.write_all(&index).await?;
        self.file.flush().await?;

        let data_offset = PRAGMA_LEN + V2_HEADER_LEN;
        let v2 = CarV2Header {
            characteristics: 0,
            data_offset,
            data_size: self.data_size,
            index_offset: data_offset + self.data_size,
        };

        let mut file = self.file.into_inner();
        file.seek(SeekFrom::Start(PRAGMA_LEN)).await?;
        file.write_all(&v2.to_bytes()).await?;
        file.write_all(&header).await?;
        file.flush().await?;
        file.sync_all().await?;

        Ok(CarSummary {
            root: *root,
            blocks,
            data_size: self.data_size,
            file_size: v2.index_offset + index.len() as u64,
        })
    }
}

fn placeholder_root() -> Result<Cid, CarError> {
    let hash = Multihash::<64>::wrap(SHA2_256, &[0; 32]).map_err(crate::errors::IpldError::from)?;
    Ok(Cid::new_v1(DAG_PB, hash))
}
