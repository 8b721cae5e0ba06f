#![allow(dependency_on_unit_never_type_fallback)]
//! CAR headers, adapted from https://github.com/n0-computer/iroh-car
use ipld_core::cid::Cid;
use libipld::cbor::DagCborCodec;
use libipld::codec::Codec;

use super::varint::length_prefixed;
use crate::errors::{CarError, IpldError};

/// Byte length of the CARv2 pragma.
pub const PRAGMA_LEN: u64 = 11;

/// Byte length of the fixed CARv2 header that follows the pragma.
pub const V2_HEADER_LEN: u64 = 40;

/// `varint(10) | {"version": 2}`
pub const PRAGMA: [u8; PRAGMA_LEN as usize] = [
    0x0a, 0xa1, 0x67, 0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, 0x02,
];

#[derive(Debug, Clone, Default, libipld::DagCbor, PartialEq, Eq)]
pub struct CarV1Header {
    #[ipld]
    pub roots: Vec<libipld::Cid>,
    #[ipld]
    pub version: u64,
}

#[derive(Debug, Clone, Default, libipld::DagCbor, PartialEq, Eq)]
pub struct CarV2Pragma {
    #[ipld]
    pub version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarV2Header {
    pub characteristics: u128,
    pub data_offset: u64,
    pub data_size: u64,
    pub index_offset: u64,
}

impl CarV2Header {
    pub fn to_bytes(&self) -> [u8; V2_HEADER_LEN as usize] {
        let mut buf = [0; V2_HEADER_LEN as usize];
        buf[..16].copy_from_slice(&self.characteristics.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.data_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.index_offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; V2_HEADER_LEN as usize]) -> Self {
        let mut characteristics = [0; 16];
        characteristics.copy_from_slice(&buf[..16]);
        let word = |at: usize| {
            let mut w = [0; 8];
            w.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(w)
        };
        Self {
            characteristics: u128::from_le_bytes(characteristics),
            data_offset: word(16),
            data_size: word(24),
            index_offset: word(32),
        }
    }
}

/// The first section of a container, which tells the two versions apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstSection {
    V1(Vec<Cid>),
    V2,
}

impl FirstSection {
    pub fn decode(bytes: &[u8]) -> Result<Self, CarError> {
        if let Ok(header) = DagCborCodec.decode::<CarV1Header>(bytes) {
            if header.version == 1 {
                if header.roots.is_empty() {
                    return Err(CarError::Corrupt("Car file is empty".to_string()));
                }
                let roots = header
                    .roots
                    .iter()
                    .map(from_libipld)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(FirstSection::V1(roots));
            }
        }
        let pragma: CarV2Pragma = DagCborCodec
            .decode(bytes)
            .map_err(|e| CarError::Corrupt(format!("Failed to decode header: {e:?}")))?;
        match pragma.version {
            2 => Ok(FirstSection::V2),
            v => Err(CarError::Corrupt(format!("Unsupported CAR version {v}"))),
        }
    }
}

/// Encodes the length-prefixed CARv1 header for a single root.
pub fn encode_v1_header(root: &Cid) -> Result<Vec<u8>, CarError> {
    let header = CarV1Header {
        roots: vec![to_libipld(root)?],
        version: 1,
    };
    let bytes = DagCborCodec
        .encode(&header)
        .map_err(|e| CarError::Corrupt(format!("Failed to encode header: {e:?}")))?;
    Ok(length_prefixed(&bytes))
}

fn to_libipld(cid: &Cid) -> Result<libipld::Cid, CarError> {
    libipld::Cid::try_from(cid.to_bytes().as_slice())
        .map_err(|e| CarError::Corrupt(format!("Invalid root {cid}: {e}")))
}

fn from_libipld(cid: &libipld::Cid) -> Result<Cid, CarError> {
    Ok(Cid::try_from(cid.to_bytes().as_slice()).map_err(IpldError::from)?)
}
