use std::mem;

use bytes::Bytes;

use super::{DagLink, DagNode};
use crate::block::Block;
use crate::errors::IpldError;

/// Default leaf size: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default fan-out of internal nodes.
pub const DEFAULT_MAX_CHILDREN: usize = 174;

/// Streaming builder for a balanced UnixFS file DAG.
///
/// Leaves are grouped left to right into parents of at most `max_children` links, parents into
/// grandparents and so on. Only the pending links of each level are kept in memory, every
/// finished block is handed back to the caller immediately.
#[derive(Debug)]
pub struct DagBuilder {
    max_children: usize,
    levels: Vec<Vec<DagLink>>,
    leaves: u64,
}

impl DagBuilder {
    pub fn new(max_children: usize) -> Self {
        Self {
            max_children: max_children.max(2),
            levels: Vec::new(),
            leaves: 0,
        }
    }

    /// Number of leaves pushed so far.
    pub fn leaves(&self) -> u64 {
        self.leaves
    }

    /// Adds the next chunk of the file and returns the blocks completed by it, leaf first.
    pub fn push_chunk(&mut self, chunk: Bytes) -> Result<Vec<Block>, IpldError> {
        let mut out = Vec::with_capacity(1);
        let link = Self::emit(DagNode::Leaf(chunk), &mut out)?;
        self.leaves += 1;
        self.push_link(0, link, &mut out)?;
        Ok(out)
    }

    /// Flushes every partially filled level and returns the root link together with the blocks
    /// that were still pending. The root block is the last one in the list.
    pub fn finish(mut self) -> Result<(DagLink, Vec<Block>), IpldError> {
        let mut out = Vec::new();
        if self.leaves == 0 {
            // An empty file is a single empty leaf.
            out.extend(self.push_chunk(Bytes::new())?);
        }

        let mut level = 0;
        loop {
            let top = level + 1 == self.levels.len();
            let mut pending = mem::take(&mut self.levels[level]);
            if top && pending.len() == 1 {
                if let Some(root) = pending.pop() {
                    return Ok((root, out));
                }
            }
            if !pending.is_empty() {
                let parent = Self::emit(DagNode::File(pending), &mut out)?;
                self.push_link(level + 1, parent, &mut out)?;
            }
            level += 1;
        }
    }

    fn push_link(
        &mut self,
        level: usize,
        link: DagLink,
        out: &mut Vec<Block>,
    ) -> Result<(), IpldError> {
        if self.levels.len() <= level {
            self.levels.push(Vec::with_capacity(self.max_children));
        }
        self.levels[level].push(link);

        if self.levels[level].len() == self.max_children {
            let links = mem::take(&mut self.levels[level]);
            let parent = Self::emit(DagNode::File(links), out)?;
            self.push_link(level + 1, parent, out)?;
        }
        Ok(())
    }

    fn emit(node: DagNode, out: &mut Vec<Block>) -> Result<DagLink, IpldError> {
        let block = node.encode()?;
        let link = DagLink::new(
            *block.cid(),
            None,
            node.tsize(block.len()),
            node.file_size(),
        );
        out.push(block);
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ipld_core::cid::Cid;

    use super::*;
    use crate::block::{DAG_PB, RAW};

    fn build(chunks: &[&str], max_children: usize) -> (DagLink, HashMap<Cid, Block>) {
        let mut builder = DagBuilder::new(max_children);
        let mut blocks = HashMap::new();
        for chunk in chunks {
            let chunk = Bytes::copy_from_slice(chunk.as_bytes());
            for block in builder.push_chunk(chunk).unwrap() {
                blocks.insert(*block.cid(), block);
            }
        }
        let (root, rest) = builder.finish().unwrap();
        for block in rest {
            blocks.insert(*block.cid(), block);
        }
        (root, blocks)
    }

    fn depth(cid: &Cid, blocks: &HashMap<Cid, Block>) -> usize {
        let block = &blocks[cid];
        match DagNode::decode(cid, block.data()).unwrap() {
            DagNode::File(links) => 1 + depth(links[0].cid(), blocks),
            _ => 0,
        }
    }

    #[test]
    fn test_single_chunk_is_its_own_root() {
        let (root, blocks) = build(&["only"], 4);
        assert_eq!(root.cid().codec(), RAW);
        assert_eq!(root.file_size(), 4);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_empty_file_is_an_empty_leaf() {
        let (root, blocks) = build(&[], 4);
        assert_eq!(root.cid().codec(), RAW);
        assert_eq!(root.file_size(), 0);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_full_group_collapses_into_one_parent() {
        let (root, blocks) = build(&["a", "b", "c"], 3);
        assert_eq!(root.cid().codec(), DAG_PB);
        assert_eq!(root.file_size(), 3);
        assert_eq!(depth(root.cid(), &blocks), 1);
        // three distinct leaves and the root
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn test_overflow_adds_a_level() {
        let (root, blocks) = build(&["a", "b", "c", "d"], 3);
        assert_eq!(depth(root.cid(), &blocks), 2);
        let DagNode::File(links) = DagNode::decode(root.cid(), blocks[root.cid()].data()).unwrap()
        else {
            panic!("root must be a file node");
        };
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].file_size(), 3);
        assert_eq!(links[1].file_size(), 1);
        assert_eq!(root.file_size(), 4);
    }

    #[test]
    fn test_tsize_accumulates_subtree() {
        let (root, blocks) = build(&["aa", "bbb"], 174);
        let root_block = &blocks[root.cid()];
        assert_eq!(root.tsize(), root_block.len() as u64 + 5);
    }

    #[test]
    fn test_same_chunks_same_root() {
        let chunks = vec!["0", "1", "2", "3", "4", "5", "6"];
        let (a, _) = build(&chunks, 2);
        let (b, _) = build(&chunks, 2);
        assert_eq!(a, b);
        let (c, _) = build(&chunks, 3);
        assert_ne!(a.cid(), c.cid());
    }
}
