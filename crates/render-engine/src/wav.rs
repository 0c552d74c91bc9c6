//! Streaming 16-bit PCM WAV writer.
//!
//! The 44-byte header is written up front with placeholder sizes and
//! patched in place by [`WavSink::close`].

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use vgmsplit_common::error::{SplitError, SplitResult};

pub const HEADER_SIZE: u64 = 44;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u64 = 2;
/// Largest `data` chunk whose RIFF size still fits in 32 bits.
const MAX_DATA_BYTES: u32 = u32::MAX - (HEADER_SIZE as u32 - 8);

/// A WAV file being written.
#[derive(Debug)]
pub struct WavSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    sample_rate: u32,
    channels: u16,
    samples_written: u64,
}

impl WavSink {
    /// Create (or truncate) `path` and write a mono header.
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> SplitResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| SplitError::file_io(&path, &e))?;
        let mut sink = Self {
            path,
            file: Some(BufWriter::new(file)),
            sample_rate,
            channels: 1,
            samples_written: 0,
        };
        let header = sink.header(0);
        sink.write_raw(&header)?;
        Ok(sink)
    }

    /// Switch to interleaved stereo. Takes effect in the finalized header.
    pub fn enable_stereo(&mut self) {
        self.channels = 2;
    }

    /// Samples written so far, counting each channel separately.
    pub fn sample_count(&self) -> u64 {
        self.samples_written
    }

    /// Append interleaved samples.
    pub fn write(&mut self, samples: &[i16]) -> SplitResult<()> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.write_raw(&bytes)?;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Patch the header sizes and close the file. Later calls do nothing.
    pub fn close(&mut self) -> SplitResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let path = &self.path;
        let io = |e: std::io::Error| SplitError::file_io(path, &e);

        let data_bytes = self.samples_written * BYTES_PER_SAMPLE;
        let data_size = u32::try_from(data_bytes)
            .ok()
            .filter(|size| *size <= MAX_DATA_BYTES)
            .ok_or_else(|| {
                tracing::warn!(path = %path.display(), data_bytes, "WAV data too large for header");
                io(std::io::Error::other(format!(
                    "{data_bytes} bytes of audio exceed the WAV size limit"
                )))
            })?;
        let header = self.header(data_size);

        file.flush().map_err(io)?;
        file.seek(SeekFrom::Start(0)).map_err(io)?;
        file.write_all(&header).map_err(io)?;
        let file = file.into_inner().map_err(|e| io(e.into_error()))?;
        file.sync_all().map_err(io)?;
        tracing::debug!(
            path = %self.path.display(),
            samples = self.samples_written,
            "Closed WAV file"
        );
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> SplitResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            SplitError::file_io(
                &self.path,
                &std::io::Error::other("file already closed"),
            )
        })?;
        file.write_all(bytes)
            .map_err(|e| SplitError::file_io(&self.path, &e))
    }

    fn header(&self, data_size: u32) -> [u8; HEADER_SIZE as usize] {
        let riff_size = data_size + (HEADER_SIZE as u32 - 8);
        let block_align = self.channels * (BITS_PER_SAMPLE / 8);
        let byte_rate = self.sample_rate * block_align as u32;

        let mut h = [0u8; HEADER_SIZE as usize];
        h[0..4].copy_from_slice(b"RIFF");
        h[4..8].copy_from_slice(&riff_size.to_le_bytes());
        h[8..12].copy_from_slice(b"WAVE");
        h[12..16].copy_from_slice(b"fmt ");
        h[16..20].copy_from_slice(&16u32.to_le_bytes());
        h[20..22].copy_from_slice(&1u16.to_le_bytes());
        h[22..24].copy_from_slice(&self.channels.to_le_bytes());
        h[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        h[28..32].copy_from_slice(&byte_rate.to_le_bytes());
        h[32..34].copy_from_slice(&block_align.to_le_bytes());
        h[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        h[36..40].copy_from_slice(b"data");
        h[40..44].copy_from_slice(&data_size.to_le_bytes());
        h
    }
}
