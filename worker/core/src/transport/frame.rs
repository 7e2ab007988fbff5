//! Frame Protocol
//!
//! Wire format for worker-easel traffic over stream transports:
//! length-prefixed JSON with a CRC32 checksum.
//!
//! ```text
//! +----------------+----------------+----------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)          |
//! | big-endian u32 | CRC32          | WorkerMessage or EaselEvent      |
//! +----------------+----------------+----------------------------------+
//! ```
//!
//! The length covers the JSON payload only. The checksum is CRC32 over the
//! payload. A declared length above [`MAX_FRAME_SIZE`] is rejected before
//! any allocation happens.

use serde::{de::DeserializeOwned, Serialize};

use super::TransportError;

/// Largest accepted frame payload (10 MB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Initial decoder buffer capacity, also the compaction threshold.
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Length field plus checksum field.
const HEADER_SIZE: usize = 8;

#[inline]
fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encode one message as a complete frame.
///
/// # Errors
///
/// Returns [`TransportError::Serialization`] when JSON encoding fails or
/// the payload exceeds [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(TransportError::Serialization(format!(
            "frame too large: {} bytes (max {MAX_FRAME_SIZE})",
            json.len()
        )));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&checksum(&json).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Incremental frame parser.
///
/// Absorbs bytes in whatever chunks the stream delivers and yields complete
/// messages as they become available.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// An empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append raw bytes from the stream.
    pub fn push(&mut self, data: &[u8]) {
        // Reclaim consumed space once it dominates the buffer.
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed.
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame.
    ///
    /// Returns `Ok(Some(msg))` for a complete frame, `Ok(None)` when more
    /// bytes are needed, and an error for an oversized, corrupted, or
    /// unparseable frame.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        if self.available() < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::Serialization(format!(
                "declared frame size {len} exceeds maximum {MAX_FRAME_SIZE}"
            )));
        }
        let expected = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if self.available() < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload = &self.buffer[payload_start..payload_start + len];

        let actual = checksum(payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        let msg = serde_json::from_slice(payload)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.read_pos = payload_start + len;
        Ok(Some(msg))
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}
