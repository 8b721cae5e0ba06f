//! Protobuf encoding of the UnixFS `Data` message.
//!
//! ```protobuf
//! message Data {
//!     enum DataType { Raw = 0; Directory = 1; File = 2; Metadata = 3; Symlink = 4; HAMTShard = 5; }
//!     required DataType Type = 1;
//!     optional bytes Data = 2;
//!     optional uint64 filesize = 3;
//!     repeated uint64 blocksizes = 4;
//!     optional uint64 hashType = 5;
//!     optional uint64 fanout = 6;
//! }
//! ```
use std::borrow::Cow;

use quick_protobuf::sizeofs::{sizeof_len, sizeof_varint};
use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Result, Writer, WriterBackend};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    #[default]
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HAMTShard = 5,
}

impl From<i32> for DataType {
    fn from(i: i32) -> Self {
        match i {
            0 => DataType::Raw,
            1 => DataType::Directory,
            2 => DataType::File,
            3 => DataType::Metadata,
            4 => DataType::Symlink,
            5 => DataType::HAMTShard,
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Data<'a> {
    pub data_type: DataType,
    pub data: Option<Cow<'a, [u8]>>,
    pub filesize: Option<u64>,
    pub blocksizes: Vec<u64>,
    pub hash_type: Option<u64>,
    pub fanout: Option<u64>,
}

impl<'a> MessageRead<'a> for Data<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.data_type = r.read_enum(bytes)?,
                Ok(18) => msg.data = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(24) => msg.filesize = Some(r.read_uint64(bytes)?),
                Ok(32) => msg.blocksizes.push(r.read_uint64(bytes)?),
                Ok(40) => msg.hash_type = Some(r.read_uint64(bytes)?),
                Ok(48) => msg.fanout = Some(r.read_uint64(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                },
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for Data<'_> {
    fn get_size(&self) -> usize {
        1 + sizeof_varint(self.data_type as u64)
            + self.data.as_ref().map_or(0, |m| 1 + sizeof_len(m.len()))
            + self.filesize.map_or(0, |m| 1 + sizeof_varint(m))
            + self
                .blocksizes
                .iter()
                .map(|s| 1 + sizeof_varint(*s))
                .sum::<usize>()
            + self.hash_type.map_or(0, |m| 1 + sizeof_varint(m))
            + self.fanout.map_or(0, |m| 1 + sizeof_varint(m))
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        w.write_with_tag(8, |w| w.write_enum(self.data_type as i32))?;
        if let Some(ref s) = self.data {
            w.write_with_tag(18, |w| w.write_bytes(s))?;
        }
        if let Some(s) = self.filesize {
            w.write_with_tag(24, |w| w.write_uint64(s))?;
        }
        for s in &self.blocksizes {
            w.write_with_tag(32, |w| w.write_uint64(*s))?;
        }
        if let Some(s) = self.hash_type {
            w.write_with_tag(40, |w| w.write_uint64(s))?;
        }
        if let Some(s) = self.fanout {
            w.write_with_tag(48, |w| w.write_uint64(s))?;
        }
        Ok(())
    }
}
