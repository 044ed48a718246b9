//! LZ4 block compression for pixel payloads.
//!
//! Image data inside texture and environment records is stored LZ4
//! compressed with its uncompressed size prepended. LZ4 prioritizes
//! decompression speed, which is what matters on the load path.
//!
//! The size prefix comes from the file, so it is checked before anything is
//! allocated: callers compare [`decoded_len`] against what the record
//! expects, and [`decompress_lz4`] refuses sizes the compressed bytes cannot
//! produce.

use crate::error::{PersistError, PersistResult};

/// Bytes of the little-endian size prefix.
const PREFIX_LEN: usize = 4;

/// Upper bound of LZ4 expansion per compressed byte (a match token extended
/// by 255-valued length bytes).
const MAX_RATIO: usize = 255;

/// Compresses raw pixel data using LZ4.
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
  lz4_flex::compress_prepend_size(data)
}

/// Decoded size stored in front of an LZ4 payload.
pub fn decoded_len(data: &[u8]) -> PersistResult<usize> {
  let prefix: [u8; PREFIX_LEN] = data
    .get(..PREFIX_LEN)
    .and_then(|p| p.try_into().ok())
    .ok_or_else(|| PersistError::Codec("lz4 payload: missing size prefix".to_owned()))?;
  Ok(u32::from_le_bytes(prefix) as usize)
}

/// Largest size the compressed bytes of `data` can decode to.
pub fn max_decoded_len(data: &[u8]) -> usize {
  data
    .len()
    .saturating_sub(PREFIX_LEN)
    .saturating_mul(MAX_RATIO)
}

/// Decompresses LZ4 data produced by [`compress_lz4`] into exactly `len`
/// bytes.
///
/// `len` must equal the size prefix. The output is only allocated once the
/// prefix proved plausible for the compressed size.
pub fn decompress_lz4(data: &[u8], len: usize) -> PersistResult<Vec<u8>> {
  let prefix = decoded_len(data)?;
  if prefix != len {
    return Err(PersistError::Codec(format!(
      "lz4 payload: size prefix {prefix}, expected {len}"
    )));
  }
  if len > max_decoded_len(data) {
    return Err(PersistError::Codec(format!(
      "lz4 payload: {} compressed bytes cannot expand to {len}",
      data.len() - PREFIX_LEN
    )));
  }
  if len == 0 {
    return Ok(Vec::new());
  }

  let mut out = vec![0u8; len];
  let written = lz4_flex::decompress_into(&data[PREFIX_LEN..], &mut out)
    .map_err(|e| PersistError::Codec(format!("lz4 payload: {e}")))?;
  if written != len {
    return Err(PersistError::Codec(format!(
      "lz4 payload: decoded {written} of {len} bytes"
    )));
  }
  Ok(out)
}
