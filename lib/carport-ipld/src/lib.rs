//! Content addressing for carport.
//!
//! Files are split into fixed-size chunks, arranged into a balanced UnixFS DAG and written block
//! by block into an indexed CARv2 container. Roots are deterministic: they depend only on the
//! file's bytes and the [`PackOptions`].
pub mod block;
pub mod car;
pub mod chunker;
pub mod dag;
pub mod errors;
mod pack;
pub mod unixfs;

pub use block::Block;
pub use ipld_core::cid::Cid;
pub use car::{CarIndexedReader, CarStream, CarSummary, CarWriter};
pub use pack::{pack, PackOptions, Packed, MAX_CHUNK_SIZE};
