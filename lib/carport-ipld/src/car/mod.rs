//! Indexed CAR containers.
//!
//! Containers are written as CARv2: a pragma, a fixed header pointing at the payload and index,
//! the CARv1 payload (`header | section*`) and an `IndexSorted` index. The reader also accepts
//! plain CARv1 files.
pub mod header;
pub mod index;
mod reader;
mod varint;
mod writer;

pub use reader::{CarIndexedReader, CarStream};
pub use writer::{CarSummary, CarWriter};
