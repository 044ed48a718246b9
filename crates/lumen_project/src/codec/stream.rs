//! Streaming zlib adapters with bounded buffers.
//!
//! [`StreamWriter`] accepts writes of any size, stages them in a fixed
//! buffer and drains the compressor into the sink whenever its output buffer
//! fills. [`StreamReader`] is the inverse: it reads a declared number of
//! compressed bytes in fixed-size pieces and inflates them into a
//! [`ScratchBuffer`].

use std::io::{self, Read, Write};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::{CodecBuffers, CodecStats, CompressionLevel};
use crate::error::{PersistError, PersistResult};
use crate::scratch::ScratchBuffer;

fn codec_error(err: impl std::fmt::Display) -> PersistError {
  PersistError::Codec(err.to_string())
}

/// Compressing writer over an arbitrary sink.
pub struct StreamWriter<W: Write> {
  sink: W,
  compressor: Compress,
  staging: Vec<u8>,
  staging_len: usize,
  output: Vec<u8>,
  stats: CodecStats,
}

impl<W: Write> StreamWriter<W> {
  /// Starts a zlib stream at `level` over `sink`.
  pub fn new(sink: W, level: CompressionLevel, buffers: CodecBuffers) -> Self {
    let buffers = buffers.clamped();
    Self {
      sink,
      compressor: Compress::new(Compression::new(u32::from(level.get())), true),
      staging: Vec::with_capacity(buffers.staging),
      staging_len: buffers.staging,
      output: vec![0; buffers.output],
      stats: CodecStats::default(),
    }
  }

  /// Counters so far. `total_compressed` lags until [`Self::finish`].
  pub fn stats(&self) -> CodecStats {
    self.stats
  }

  /// Uncompressed bytes accepted so far.
  pub fn total(&self) -> u64 {
    self.stats.total
  }

  /// Stages `bytes`, compressing every time the staging buffer fills.
  pub fn write_bytes(&mut self, mut bytes: &[u8]) -> PersistResult<()> {
    while !bytes.is_empty() {
      let room = self.staging_len - self.staging.len();
      let take = room.min(bytes.len());
      self.staging.extend_from_slice(&bytes[..take]);
      self.stats.total += take as u64;
      bytes = &bytes[take..];

      if self.staging.len() == self.staging_len {
        self.drain(false)?;
      }
    }
    Ok(())
  }

  /// Compresses whatever is staged, signals end of stream and returns the
  /// sink together with the final counters.
  pub fn finish(mut self) -> PersistResult<(W, CodecStats)> {
    self.drain(true)?;
    self.sink.flush()?;
    Ok((self.sink, self.stats))
  }

  /// Feeds the staged bytes to the compressor until they are consumed (and,
  /// when finishing, until the stream end was emitted).
  fn drain(&mut self, finish: bool) -> PersistResult<()> {
    let mut consumed = 0usize;

    loop {
      let flush = if finish {
        FlushCompress::Finish
      } else {
        FlushCompress::None
      };
      let in_before = self.compressor.total_in();
      let out_before = self.compressor.total_out();

      let status = self
        .compressor
        .compress(&self.staging[consumed..], &mut self.output, flush)
        .map_err(codec_error)?;

      let read = (self.compressor.total_in() - in_before) as usize;
      let produced = (self.compressor.total_out() - out_before) as usize;
      consumed += read;

      if produced > 0 {
        self.sink.write_all(&self.output[..produced])?;
        self.stats.total_compressed += produced as u64;
      }

      let input_done = consumed == self.staging.len();
      let output_full = produced == self.output.len();

      if finish {
        if status == Status::StreamEnd {
          break;
        }
      } else if input_done && !output_full {
        break;
      }

      if read == 0 && produced == 0 {
        return Err(PersistError::Codec(format!(
          "compressor stalled with {} staged bytes pending",
          self.staging.len() - consumed
        )));
      }
    }

    self.staging.clear();
    Ok(())
  }
}

impl<W: Write> Write for StreamWriter<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self
      .write_bytes(buf)
      .map_err(|e| match e {
        PersistError::Io(io) => io,
        other => io::Error::other(other.to_string()),
      })?;
    Ok(buf.len())
  }

  /// Staged bytes are only compressed when the staging buffer fills or the
  /// stream is finished; this only flushes the sink.
  fn flush(&mut self) -> io::Result<()> {
    self.sink.flush()
  }
}

/// Decompressing reader for a body of known compressed length.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamReader {
  buffers: CodecBuffers,
}

impl StreamReader {
  pub fn new(buffers: CodecBuffers) -> Self {
    Self {
      buffers: buffers.clamped(),
    }
  }

  /// Inflates exactly `compressed_len` bytes from `source` into `sink`.
  ///
  /// Fails with [`PersistError::Codec`] if the stream is malformed or ends
  /// before its end-of-stream marker, and with
  /// [`PersistError::ScratchExhausted`] if the output outgrows `sink`.
  pub fn read_into<R: Read>(
    &self,
    source: &mut R,
    compressed_len: u64,
    sink: &mut ScratchBuffer,
  ) -> PersistResult<CodecStats> {
    let mut decompressor = Decompress::new(true);
    let mut input = vec![0u8; self.buffers.input];
    let mut output = vec![0u8; self.buffers.output];
    let mut remaining = compressed_len;
    let mut stats = CodecStats::default();
    let mut finished = false;

    while remaining > 0 && !finished {
      let want = remaining.min(input.len() as u64) as usize;
      source.read_exact(&mut input[..want])?;
      remaining -= want as u64;
      stats.total_compressed += want as u64;

      let mut offset = 0usize;
      loop {
        let in_before = decompressor.total_in();
        let out_before = decompressor.total_out();

        let status = decompressor
          .decompress(&input[offset..want], &mut output, FlushDecompress::None)
          .map_err(codec_error)?;

        let read = (decompressor.total_in() - in_before) as usize;
        let produced = (decompressor.total_out() - out_before) as usize;
        offset += read;

        if produced > 0 {
          sink.extend_from_slice(&output[..produced])?;
          stats.total += produced as u64;
        }

        if status == Status::StreamEnd {
          finished = true;
          break;
        }
        // Input piece consumed and nothing left pending: fetch the next one.
        if offset == want && produced < output.len() {
          break;
        }
        if read == 0 && produced == 0 {
          break;
        }
      }
    }

    if !finished {
      return Err(PersistError::Codec(format!(
        "compressed body ended before end of stream ({} of {} bytes consumed)",
        stats.total_compressed, compressed_len
      )));
    }

    Ok(stats)
  }
}
