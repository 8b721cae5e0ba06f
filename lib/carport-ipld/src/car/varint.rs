use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::CarError;

/// Reads a varint from the provided reader.
///
/// Returns `Ok(None)` on a clean `EOF` before the first byte, which marks the end of the section
/// list. A varint cut short by `EOF` is corruption.
pub(crate) async fn read_varint_usize<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<(usize, usize)>, CarError> {
    let mut b = unsigned_varint::encode::usize_buffer();
    for i in 0..b.len() {
        let n = reader.read(&mut b[i..i + 1]).await?;
        if n == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(CarError::Corrupt("truncated varint".to_string()));
        }
        if unsigned_varint::decode::is_last(b[i]) {
            let (num, _) = unsigned_varint::decode::usize(&b[..=i])
                .map_err(|e| CarError::Corrupt(format!("invalid varint: {e}")))?;
            return Ok(Some((num, i + 1)));
        }
    }
    Err(CarError::Corrupt("varint overflow".to_string()))
}

/// Prefixes `payload` with its varint encoded length.
pub(crate) fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut buf = unsigned_varint::encode::usize_buffer();
    let prefix = unsigned_varint::encode::usize(payload.len(), &mut buf);
    let mut out = Vec::with_capacity(prefix.len() + payload.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn test_read_prefix() {
        let bytes = length_prefixed(&[7; 300]);
        assert_eq!(&bytes[..2], &[0xac, 0x02]);
        let mut reader = Cursor::new(bytes);
        assert_eq!(
            read_varint_usize(&mut reader).await.unwrap(),
            Some((300, 2))
        );
    }

    #[tokio::test]
    async fn test_eof_and_truncation() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(read_varint_usize(&mut empty).await.unwrap().is_none());

        let mut truncated = Cursor::new(vec![0x80]);
        assert!(matches!(
            read_varint_usize(&mut truncated).await,
            Err(CarError::Corrupt(_))
        ));
    }
}
