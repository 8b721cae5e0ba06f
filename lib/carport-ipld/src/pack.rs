use std::path::{Path, PathBuf};

use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tracing::debug;

use crate::car::{CarSummary, CarWriter};
use crate::chunker::Chunker;
use crate::dag::{DagBuilder, DagLink, DagNode, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHILDREN};
use crate::errors::PackError;

/// Largest leaf accepted by IPFS gateways and remote stores.
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Layout parameters for [`pack`]. Equal options and equal content give the same root.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackOptions {
    /// Leaf size in bytes.
    pub chunk_size: usize,
    /// Fan-out of internal nodes.
    pub max_children: usize,
    /// Wrap the file in a single-entry directory named after the source.
    pub wrap_with_directory: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_children: DEFAULT_MAX_CHILDREN,
            wrap_with_directory: false,
        }
    }
}

/// A container on disk produced by [`pack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packed {
    pub root: Cid,
    pub path: PathBuf,
    pub summary: CarSummary,
}

/// Packs the file at `source` into a CAR container at `output`.
///
/// The file is read in a single streaming pass and never held in memory as a whole. On failure a
/// partially written container may be left at `output`.
pub async fn pack(source: &Path, output: &Path, options: &PackOptions) -> Result<Packed, PackError> {
    let source_err = |e| PackError::Source {
        path: source.to_path_buf(),
        source: e,
    };
    let container_err = |e| PackError::Container {
        path: source.to_path_buf(),
        output: output.to_path_buf(),
        source: e,
    };
    let hashing_err = |e| PackError::Hashing {
        path: source.to_path_buf(),
        source: e,
    };

    let file = File::open(source).await.map_err(source_err)?;
    let mut chunker = Chunker::new(file, options.chunk_size);
    let mut builder = DagBuilder::new(options.max_children);
    let mut writer = CarWriter::create(output).await.map_err(container_err)?;

    while let Some(chunk) = chunker.next_chunk().await.map_err(source_err)? {
        for block in builder.push_chunk(chunk).map_err(hashing_err)? {
            writer.write_block(&block).await.map_err(container_err)?;
        }
    }
    let leaves = builder.leaves();
    let (mut root, pending) = builder.finish().map_err(hashing_err)?;
    for block in &pending {
        writer.write_block(block).await.map_err(container_err)?;
    }

    if options.wrap_with_directory {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_size = root.file_size();
        let entry = DagLink::new(*root.cid(), Some(name), root.tsize(), file_size);
        let node = DagNode::Directory(vec![entry]);
        let block = node.encode().map_err(hashing_err)?;
        writer.write_block(&block).await.map_err(container_err)?;
        root = DagLink::new(*block.cid(), None, node.tsize(block.len()), file_size);
    }

    let summary = writer.finish(root.cid()).await.map_err(container_err)?;
    debug!(
        "packed {source:?} into {output:?}: root {}, {leaves} leaves, {} blocks, {} bytes",
        summary.root, summary.blocks, summary.data_size
    );
    Ok(Packed {
        root: summary.root,
        path: output.to_path_buf(),
        summary,
    })
}
