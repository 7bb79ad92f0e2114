//! ZRLE encoding decoder - zlib-compressed run-length data.
//!
//! ZRLE (type 16) frames each rectangle as a u32 length followed by that
//! many bytes cut from **one zlib stream that spans the whole connection**
//! (RFC 6143 §7.7.6). The decoder inflates exactly the framed bytes and
//! retains the decompressed output as-is; expanding the 64x64 tiles and
//! their sub-encodings is the downstream interpreter's concern, which keeps
//! the reader loop free of per-tile branching.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | length           |  4 bytes (u32)
//! +------------------+
//! | zlib_data        |  'length' bytes continuing the connection's stream
//! +------------------+
//! ```
//!
//! The inflater state is a decoder member and survives across rectangles;
//! only dropping the decoder (i.e. the connection) discards it.

use crate::{zlib, DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_ZRLE};
use anyhow::{Context, Result};
use flate2::Decompress;
use std::sync::Mutex;
use tokio::io::AsyncRead;

/// ZRLE tile side length, fixed by the protocol.
pub const ZRLE_TILE_SIZE: u16 = 64;

/// Decoded ZRLE rectangle: the decompressed tile bytes, ready for a tile
/// interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZrleData {
    pub data: Vec<u8>,
}

impl ZrleData {
    /// Serialize back to wire bytes: a self-contained zlib stream with the
    /// u32 length prefix. A fresh-state inflater accepts it, and so does a
    /// persistent one that has not seen earlier chunks.
    pub fn marshal(&self) -> std::io::Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.data)?;
        let compressed = encoder.finish()?;

        let mut bytes = Vec::with_capacity(4 + compressed.len());
        bytes.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&compressed);
        Ok(bytes)
    }
}

/// Decoder for ZRLE.
///
/// Holds the connection's single persistent zlib inflater. A `Mutex`
/// provides the interior mutability `decode(&self)` needs; the reader task
/// is the only caller, so the lock is never contended.
pub struct ZrleDecoder {
    inflater: Mutex<Decompress>,
}

impl Default for ZrleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleDecoder {
    pub fn new() -> Self {
        Self {
            inflater: Mutex::new(Decompress::new(true)),
        }
    }
}

impl Decoder for ZrleDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZRLE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        _state: &mut DecodeState,
    ) -> Result<RectData> {
        let length = stream
            .read_u32()
            .await
            .context("failed to read ZRLE data length")? as usize;

        tracing::debug!(
            "ZRLE: rect [{},{} {}x{}] compressed_len={}",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            length
        );

        if length == 0 {
            return Ok(RectData::Zrle(ZrleData { data: Vec::new() }));
        }

        let compressed = stream
            .read_vec(length)
            .await
            .with_context(|| format!("failed to read {} bytes of ZRLE data", length))?;

        let mut inflater = self.inflater.lock().unwrap();
        let data = zlib::inflate_to_end(&mut inflater, &compressed)
            .context("ZRLE decompression failed")?;

        Ok(RectData::Zrle(ZrleData { data }))
    }
}
