use bytes::Bytes;
use ipld_core::cid::multihash::Multihash;
use ipld_core::cid::Cid;
use multihash::{Code, MultihashDigest};

use crate::errors::IpldError;

/// Multicodec for raw leaves.
pub const RAW: u64 = 0x55;
/// Multicodec for DAG-PB nodes.
pub const DAG_PB: u64 = 0x70;
/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

/// A content addressed block: the encoded bytes of a DAG node and the CID derived from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    /// Hashes `data` and builds a CIDv1 with the given codec.
    pub fn new(codec: u64, data: Bytes) -> Result<Self, IpldError> {
        let cid = cid_for(codec, &data)?;
        Ok(Self { cid, data })
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Cid, Bytes) {
        (self.cid, self.data)
    }
}

/// Computes the CIDv1 (sha2-256) of `data` for the given codec.
pub fn cid_for(codec: u64, data: &[u8]) -> Result<Cid, IpldError> {
    let digest = Code::Sha2_256.digest(data);
    let hash = Multihash::<64>::wrap(digest.code(), digest.digest())?;
    Ok(Cid::new_v1(codec, hash))
}

/// Checks that `data` hashes to the multihash carried by `cid`.
pub fn verify(cid: &Cid, data: &[u8]) -> Result<bool, IpldError> {
    let code = cid.hash().code();
    let hasher = Code::try_from(code).map_err(|_| IpldError::MultihashCodeError(code))?;
    Ok(hasher.digest(data).digest() == cid.hash().digest())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_cid_is_stable() {
        // `echo -n hello | ipfs add --raw-leaves --cid-version 1`
        let block = Block::new(RAW, Bytes::from_static(b"hello")).unwrap();
        assert_eq!(
            block.cid().to_string(),
            "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq"
        );
        assert!(verify(block.cid(), b"hello").unwrap());
        assert!(!verify(block.cid(), b"hellO").unwrap());
    }

    #[test]
    fn test_codec_changes_cid() {
        let raw = cid_for(RAW, b"data").unwrap();
        let pb = cid_for(DAG_PB, b"data").unwrap();
        assert_ne!(raw, pb);
        assert_eq!(raw.hash(), pb.hash());
        assert_eq!(raw.encoded_len(), pb.encoded_len());
    }
}
