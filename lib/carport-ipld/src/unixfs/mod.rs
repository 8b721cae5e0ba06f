mod proto;

use std::io;

use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Writer};

pub use proto::{Data, DataType};

impl<'a> TryFrom<&'a [u8]> for Data<'a> {
    type Error = io::Error;

    fn try_from(data: &'a [u8]) -> Result<Self, Self::Error> {
        Data::from_reader(&mut BytesReader::from_bytes(data), data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Data<'_> {
    /// Message for an internal file node covering `blocksizes` bytes per child.
    pub fn file(blocksizes: Vec<u64>) -> Self {
        Self {
            data_type: DataType::File,
            filesize: Some(blocksizes.iter().sum()),
            blocksizes,
            ..Default::default()
        }
    }

    pub fn directory() -> Self {
        Self {
            data_type: DataType::Directory,
            ..Default::default()
        }
    }

    /// Encodes the message without a length prefix, as it is embedded in a DAG-PB `Data` field.
    pub fn to_vec(&self) -> Result<Vec<u8>, quick_protobuf::Error> {
        let mut buf = Vec::with_capacity(self.get_size());
        let mut writer = Writer::new(&mut buf);
        self.write_message(&mut writer)?;
        Ok(buf)
    }
}
