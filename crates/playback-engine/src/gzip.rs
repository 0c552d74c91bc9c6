//! Transparent inflation of gzip-wrapped files (`.vgz`).

use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::{status, EngineError, EngineResult};

pub const MAGIC: &[u8; 2] = &[0x1F, 0x8B];

/// Upper bound on inflated size.
pub const MAX_INFLATED_BYTES: u64 = 256 * 1024 * 1024;

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Inflate `data` if it is gzip, otherwise borrow it unchanged.
pub fn inflate(data: &[u8]) -> EngineResult<Cow<'_, [u8]>> {
    if !is_gzip(data) {
        return Ok(Cow::Borrowed(data));
    }

    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(MAX_INFLATED_BYTES + 1)
        .read_to_end(&mut out)
        .map_err(|e| EngineError::new(status::COMPRESSED, format!("Invalid gzip data: {e}")))?;
    if out.len() as u64 > MAX_INFLATED_BYTES {
        return Err(EngineError::new(
            status::COMPRESSED,
            format!("Inflated data exceeds {MAX_INFLATED_BYTES} bytes"),
        ));
    }
    tracing::debug!(compressed = data.len(), inflated = out.len(), "Inflated gzip input");
    Ok(Cow::Owned(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_plain_data_is_borrowed() {
        let data = b"Vgm plain";
        assert!(matches!(inflate(data).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_gzip_data_is_inflated() {
        let packed = gzip(b"Vgm payload");
        assert!(is_gzip(&packed));
        assert_eq!(&*inflate(&packed).unwrap(), b"Vgm payload");
    }

    #[test]
    fn test_corrupt_gzip_is_rejected() {
        let mut packed = gzip(&[0x55; 4096]);
        packed.truncate(packed.len() / 2);
        assert_eq!(inflate(&packed).unwrap_err().status, status::COMPRESSED);
    }
}
