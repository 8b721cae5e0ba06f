//! UnixFS DAG nodes.
//!
//! Files are stored as raw leaves joined by DAG-PB nodes carrying UnixFS `File` data. A node's
//! CID is derived from its canonical encoding only, so equal content always yields the same tree.
mod builder;

use bytes::Bytes;
use ipld_core::cid::Cid;
use ipld_core::codec::Codec;
use ipld_dagpb::{DagPbCodec, PbLink, PbNode};

pub use builder::{DagBuilder, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHILDREN};

use crate::block::{Block, DAG_PB, RAW};
use crate::errors::IpldError;
use crate::unixfs::{Data, DataType};

/// A link from a parent node to a child subtree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DagLink {
    cid: Cid,
    name: Option<String>,
    /// Encoded size of the whole child subtree (`Tsize`).
    tsize: u64,
    /// File bytes stored below the child.
    file_size: u64,
}

impl DagLink {
    pub fn new(cid: Cid, name: Option<String>, tsize: u64, file_size: u64) -> Self {
        Self {
            cid,
            name,
            tsize,
            file_size,
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn tsize(&self) -> u64 {
        self.tsize
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    fn to_pb(&self) -> PbLink {
        PbLink {
            cid: self.cid,
            name: Some(self.name.clone().unwrap_or_default()),
            size: Some(self.tsize),
        }
    }
}

/// A node of a UnixFS file DAG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DagNode {
    /// A chunk of file content.
    Leaf(Bytes),
    /// An internal file node, children in file order.
    File(Vec<DagLink>),
    /// A directory listing its named entries.
    Directory(Vec<DagLink>),
}

impl DagNode {
    /// Serializes the node into its canonical block.
    pub fn encode(&self) -> Result<Block, IpldError> {
        match self {
            DagNode::Leaf(data) => Block::new(RAW, data.clone()),
            DagNode::File(links) => {
                let data = Data::file(links.iter().map(DagLink::file_size).collect());
                Self::encode_pb(links, data)
            },
            DagNode::Directory(links) => Self::encode_pb(links, Data::directory()),
        }
    }

    fn encode_pb(links: &[DagLink], data: Data) -> Result<Block, IpldError> {
        let node = PbNode {
            links: links.iter().map(DagLink::to_pb).collect(),
            data: Some(Bytes::from(data.to_vec()?)),
        };
        let bytes = DagPbCodec::encode_to_vec(&node)?;
        Block::new(DAG_PB, Bytes::from(bytes))
    }

    /// Decodes a block produced by [`DagNode::encode`] (or any UnixFS file/directory block).
    pub fn decode(cid: &Cid, data: &[u8]) -> Result<Self, IpldError> {
        match cid.codec() {
            RAW => Ok(DagNode::Leaf(Bytes::copy_from_slice(data))),
            DAG_PB => {
                let node: PbNode = DagPbCodec::decode_from_slice(data)?;
                let Some(raw) = node.data.as_ref() else {
                    return Err(IpldError::UnixFsDecodingError(*cid));
                };
                let unixfs = Data::try_from(raw.as_ref())
                    .map_err(|_| IpldError::UnixFsDecodingError(*cid))?;
                match unixfs.data_type {
                    DataType::File | DataType::Raw if node.links.is_empty() => {
                        let content = unixfs.data.map(|d| d.into_owned()).unwrap_or_default();
                        Ok(DagNode::Leaf(Bytes::from(content)))
                    },
                    DataType::File => {
                        let links = node
                            .links
                            .iter()
                            .enumerate()
                            .map(|(i, link)| {
                                DagLink::new(
                                    link.cid,
                                    link.name.clone(),
                                    link.size.unwrap_or_default(),
                                    unixfs.blocksizes.get(i).copied().unwrap_or_default(),
                                )
                            })
                            .collect();
                        Ok(DagNode::File(links))
                    },
                    DataType::Directory => {
                        let links = node
                            .links
                            .iter()
                            .map(|link| {
                                DagLink::new(
                                    link.cid,
                                    link.name.clone(),
                                    link.size.unwrap_or_default(),
                                    0,
                                )
                            })
                            .collect();
                        Ok(DagNode::Directory(links))
                    },
                    _ => Err(IpldError::UnsupportedUnixFsDataType(*cid)),
                }
            },
            _ => Err(IpldError::UnsupportedCodec(*cid)),
        }
    }

    /// File bytes stored below this node.
    pub fn file_size(&self) -> u64 {
        match self {
            DagNode::Leaf(data) => data.len() as u64,
            DagNode::File(links) => links.iter().map(DagLink::file_size).sum(),
            DagNode::Directory(_) => 0,
        }
    }

    /// Cumulative encoded size of the subtree rooted at this node, given its own encoded length.
    pub fn tsize(&self, encoded_len: usize) -> u64 {
        let children: u64 = match self {
            DagNode::Leaf(_) => 0,
            DagNode::File(links) | DagNode::Directory(links) => {
                links.iter().map(DagLink::tsize).sum()
            },
        };
        encoded_len as u64 + children
    }
}
