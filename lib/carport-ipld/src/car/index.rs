//! The `IndexSorted` CARv2 index.
//!
//! ```text
//! varint(0x0400) | bucket*
//! bucket = width: u32 | length: u64 | (digest | offset: u64)*
//! ```
//!
//! Buckets hold entries of equal width sorted by digest; offsets point at the start of a section
//! and are relative to the beginning of the CARv1 payload.
use std::collections::BTreeMap;

use crate::errors::CarError;

/// Multicodec of the `IndexSorted` format.
pub const INDEX_SORTED: u64 = 0x0400;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    digest: Vec<u8>,
    offset: u64,
}

impl IndexEntry {
    pub fn new(digest: Vec<u8>, offset: u64) -> Self {
        Self { digest, offset }
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Returns every entry with this digest, in offset order. Blocks of different codecs can
    /// share a digest, so callers match the section CID.
    pub fn find(&self, digest: &[u8]) -> &[IndexEntry] {
        let start = self.entries.partition_point(|e| e.digest.as_slice() < digest);
        let len = self.entries[start..].partition_point(|e| e.digest.as_slice() == digest);
        &self.entries[start..start + len]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buckets: BTreeMap<usize, Vec<&IndexEntry>> = BTreeMap::new();
        for entry in &self.entries {
            buckets
                .entry(entry.digest.len() + 8)
                .or_default()
                .push(entry);
        }

        let mut codec = unsigned_varint::encode::u64_buffer();
        let mut out = unsigned_varint::encode::u64(INDEX_SORTED, &mut codec).to_vec();
        for (width, entries) in buckets {
            out.extend_from_slice(&(width as u32).to_le_bytes());
            out.extend_from_slice(&((width * entries.len()) as u64).to_le_bytes());
            for entry in entries {
                out.extend_from_slice(&entry.digest);
                out.extend_from_slice(&entry.offset.to_le_bytes());
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CarError> {
        let (codec, mut rest) = unsigned_varint::decode::u64(bytes)
            .map_err(|e| CarError::Corrupt(format!("invalid index codec: {e}")))?;
        if codec != INDEX_SORTED {
            return Err(CarError::Corrupt(format!(
                "unsupported index codec {codec:#x}"
            )));
        }

        let mut entries = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 12 {
                return Err(CarError::Corrupt("truncated index bucket".to_string()));
            }
            let width = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            let mut len = [0; 8];
            len.copy_from_slice(&rest[4..12]);
            let len = u64::from_le_bytes(len) as usize;
            rest = &rest[12..];

            if width <= 8 || len % width != 0 || len > rest.len() {
                return Err(CarError::Corrupt(format!(
                    "invalid index bucket (width {width}, length {len})"
                )));
            }
            for raw in rest[..len].chunks_exact(width) {
                let (digest, offset) = raw.split_at(width - 8);
                let mut buf = [0; 8];
                buf.copy_from_slice(offset);
                entries.push(IndexEntry::new(digest.to_vec(), u64::from_le_bytes(buf)));
            }
            rest = &rest[len..];
        }
        Ok(Self::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_bytes_round_trip() {
        let index = Index::new(vec![
            IndexEntry::new(vec![3; 32], 300),
            IndexEntry::new(vec![1; 32], 100),
            IndexEntry::new(vec![2; 20], 200),
        ]);
        let bytes = index.to_bytes();
        assert_eq!(&bytes[..2], &[0x80, 0x08]);
        // the 28 byte wide bucket sorts before the 40 byte wide one
        assert_eq!(&bytes[2..6], &28u32.to_le_bytes());

        let decoded = Index::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.find(&[1; 32])[0].offset(), 100);
        assert!(decoded.find(&[4; 32]).is_empty());
    }

    #[test]
    fn test_find_returns_every_entry_of_a_digest() {
        let index = Index::new(vec![
            IndexEntry::new(vec![2; 32], 900),
            IndexEntry::new(vec![1; 32], 10),
            IndexEntry::new(vec![2; 32], 40),
            IndexEntry::new(vec![3; 32], 70),
        ]);
        let offsets: Vec<_> = index.find(&[2; 32]).iter().map(IndexEntry::offset).collect();
        assert_eq!(offsets, vec![40, 900]);
        assert_eq!(index.find(&[3; 32]).len(), 1);
        assert!(index.find(&[0; 32]).is_empty());
    }

    #[test]
    fn test_rejects_bad_bucket() {
        let mut bytes = Index::new(vec![IndexEntry::new(vec![1; 32], 7)]).to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Index::from_bytes(&bytes),
            Err(CarError::Corrupt(_))
        ));
        assert!(Index::from_bytes(&[0x81, 0x08]).is_err());
    }
}
