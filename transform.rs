//! Byte-stream transform stages and their ordered composition.
//!
//! A stored object is produced by pushing the upload through an explicit
//! ordered list of stages (compress, then encrypt) and reconstructed by the
//! exact reverse list (decrypt, then decompress). Stages are driven
//! chunk-by-chunk so the pipelines hold a bounded amount of data regardless
//! of object size.

use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;

use crate::error::ShelterError;

/// Chunk size for the pipeline copy loops (64KB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A stateful, reversible byte-stream stage.
///
/// `update` consumes a chunk and returns whatever output is ready; stages are
/// free to buffer (block alignment, compression windows). `finish` flushes
/// the remaining state and must be called exactly once, after the last
/// `update`.
pub trait Transform: Send {
    fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError>;
    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShelterError>;
}

/// Gzip compression stage backed by a `Vec`-draining encoder.
pub struct GzipCompress {
    inner: GzEncoder<Vec<u8>>,
}

impl GzipCompress {
    pub fn new() -> Self {
        Self {
            inner: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }
}

impl Default for GzipCompress {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GzipCompress {
    fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError> {
        self.inner
            .write_all(input)
            .map_err(|e| ShelterError::storage(format!("gzip compression failed: {}", e)))?;
        Ok(std::mem::take(self.inner.get_mut()))
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShelterError> {
        self.inner
            .finish()
            .map_err(|e| ShelterError::storage(format!("gzip finalization failed: {}", e)))
    }
}

/// Gzip decompression stage. Truncated or corrupt input surfaces as a read
/// error, not a key error.
pub struct GzipDecompress {
    inner: GzDecoder<Vec<u8>>,
}

impl GzipDecompress {
    pub fn new() -> Self {
        Self {
            inner: GzDecoder::new(Vec::new()),
        }
    }
}

impl Default for GzipDecompress {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GzipDecompress {
    fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError> {
        self.inner
            .write_all(input)
            .map_err(|e| ShelterError::file_read(format!("gzip stream is corrupt: {}", e)))?;
        Ok(std::mem::take(self.inner.get_mut()))
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, ShelterError> {
        self.inner
            .finish()
            .map_err(|e| ShelterError::file_read(format!("gzip stream is incomplete: {}", e)))
    }
}

/// An ordered list of stages applied as one pipeline.
///
/// Output of stage `i` feeds stage `i + 1`; the last stage's output is the
/// pipeline's. An empty chain is the identity. On `finish`, stages are
/// finalized front-to-back and each stage's tail flows through the stages
/// after it, so inner state is always flushed before outer state.
pub struct TransformChain {
    stages: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new(stages: Vec<Box<dyn Transform>>) -> Self {
        Self { stages }
    }

    pub fn update(&mut self, input: &[u8]) -> Result<Vec<u8>, ShelterError> {
        let mut data = input.to_vec();
        for stage in &mut self.stages {
            data = stage.update(&data)?;
        }
        Ok(data)
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ShelterError> {
        let mut out = Vec::new();
        while !self.stages.is_empty() {
            let stage = self.stages.remove(0);
            let mut tail = stage.finish()?;
            for later in &mut self.stages {
                tail = later.update(&tail)?;
            }
            out.extend_from_slice(&tail);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_chain(mut chain: TransformChain, input: &[u8], step: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in input.chunks(step.max(1)) {
            out.extend(chain.update(chunk).expect("update failed"));
        }
        out.extend(chain.finish().expect("finish failed"));
        out
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = TransformChain::new(Vec::new());
        let data = b"pass through unchanged";
        assert_eq!(run_chain(chain, data, 7), data);
    }

    #[test]
    fn gzip_round_trip() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let compress = TransformChain::new(vec![Box::new(GzipCompress::new())]);
        let compressed = run_chain(compress, &data, CHUNK_SIZE);
        assert!(compressed.len() < data.len());

        let decompress = TransformChain::new(vec![Box::new(GzipDecompress::new())]);
        assert_eq!(run_chain(decompress, &compressed, 333), data);
    }

    #[test]
    fn gzip_round_trip_empty_input() {
        let compress = TransformChain::new(vec![Box::new(GzipCompress::new())]);
        let compressed = run_chain(compress, b"", 1);
        // An empty gzip member still carries header and trailer.
        assert!(!compressed.is_empty());

        let decompress = TransformChain::new(vec![Box::new(GzipDecompress::new())]);
        assert_eq!(run_chain(decompress, &compressed, 1), b"");
    }

    #[test]
    fn truncated_gzip_is_a_read_error() {
        let compress = TransformChain::new(vec![Box::new(GzipCompress::new())]);
        let compressed = run_chain(compress, b"some data worth compressing", 5);

        let mut chain = TransformChain::new(vec![Box::new(GzipDecompress::new())]);
        let _ = chain.update(&compressed[..compressed.len() / 2]);
        let err = chain.finish().expect_err("truncated stream must not finish");
        assert!(matches!(err, ShelterError::FileRead(_)));
    }
}
