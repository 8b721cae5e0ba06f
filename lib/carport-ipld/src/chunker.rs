use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Splits a byte stream into fixed-size chunks.
///
/// Chunk boundaries depend only on the position in the stream: every chunk except the last is
/// exactly `chunk_size` bytes, no matter how the underlying reader splits its reads.
pub struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }

    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    async fn collect<R: AsyncRead + Unpin>(mut chunker: Chunker<R>) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_fixed_boundaries() {
        let chunks = collect(Chunker::new(Cursor::new(b"abcdefghij".to_vec()), 4)).await;
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn test_short_reads_do_not_move_boundaries() {
        // `chain` returns a short read at the seam between the two readers.
        let reader = Cursor::new(b"abc".to_vec()).chain(Cursor::new(b"defghij".to_vec()));
        let chunks = collect(Chunker::new(reader, 4)).await;
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let chunks = collect(Chunker::new(Cursor::new(Vec::new()), 4)).await;
        assert!(chunks.is_empty());
    }
}
