//! Tight encoding decoder - filtered, zlib-compressed pixel data.
//!
//! Tight (type 7) is the stateful one. The connection owns **four zlib
//! decompression streams**; every compressed chunk continues one of them,
//! and the server decides when a stream starts over. Getting the state
//! handling wrong decodes garbage several rectangles after the actual
//! mistake, which is why the streams live inside this decoder and nowhere
//! else.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | compression_ctl  |  1 byte
//! +------------------+
//! | [filter data]    |  varies by filter
//! +------------------+
//! ```
//!
//! Compression control byte:
//!
//! - **Low 4 bits**: stream reset flags. Bit `i` set means "discard zlib
//!   stream `i` before decoding this rectangle".
//! - **High 4 bits**: filter. `0` = Copy, `1` = Palette, `2` = Gradient,
//!   `8` = JPEG (not supported by this client - clean error), anything
//!   else is a protocol error.
//!
//! Each filter's data is decompressed through the stream with the same id
//! as the filter. Payloads whose uncompressed size is smaller than 12
//! bytes are sent uncompressed with no length prefix (RFC 6143 §7.7.7);
//! larger ones are a compact length followed by that many compressed
//! bytes.
//!
//! ## Filters
//!
//! - **Copy**: the decompressed bytes are the raster,
//!   `width * height * bytes_per_pixel`, verified.
//! - **Palette**: a `u8` size-minus-one, that many native pixels, then an
//!   index stream. Two-color palettes pack one bit per pixel, MSB first,
//!   each row padded to a whole byte; larger palettes use one index byte
//!   per pixel. Expansion yields a native-format raster.
//! - **Gradient**: per-byte corrections against the predictor
//!   `clamp255(left + above - above_left)`, summed modulo 256 over
//!   `bytes_per_pixel`-wide pixels. Missing neighbors read as zero.

use crate::{zlib, DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_TIGHT};
use anyhow::{bail, Context, Result};
use flate2::Decompress;
use std::sync::Mutex;
use tokio::io::AsyncRead;

// Filter ids (high nibble of the compression control byte)
const TIGHT_FILTER_COPY: u8 = 0;
const TIGHT_FILTER_PALETTE: u8 = 1;
const TIGHT_FILTER_GRADIENT: u8 = 2;
const TIGHT_FILTER_JPEG: u8 = 8;

/// Payloads shorter than this are sent uncompressed (RFC 6143 §7.7.7).
const TIGHT_MIN_TO_COMPRESS: usize = 12;

/// Decoded Tight rectangle: a raster of `width * height` pixels in the
/// negotiated pixel format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TightPixels {
    pub data: Vec<u8>,
}

/// Decoder for Tight.
///
/// The four zlib streams persist across rectangles until the server sets
/// the matching reset bit; each is then wound back to a fresh stream that
/// expects a new zlib header. A `Mutex` provides the interior mutability
/// `decode(&self)` needs; only the reader task ever touches it.
pub struct TightDecoder {
    streams: Mutex<[Decompress; 4]>,
}

impl Default for TightDecoder {
    fn default() -> Self {
        Self {
            streams: Mutex::new([
                Decompress::new(true),
                Decompress::new(true),
                Decompress::new(true),
                Decompress::new(true),
            ]),
        }
    }
}

impl TightDecoder {
    /// Read one filter payload: raw bytes below the compression threshold,
    /// otherwise a compact length plus compressed bytes fed through stream
    /// `stream_id`.
    async fn read_filter_data<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        stream_id: usize,
        expected: usize,
    ) -> Result<Vec<u8>> {
        if expected < TIGHT_MIN_TO_COMPRESS {
            return stream
                .read_vec(expected)
                .await
                .with_context(|| format!("failed to read {} uncompressed Tight bytes", expected));
        }

        let compressed_len = stream
            .read_compact_length()
            .await
            .context("failed to read Tight compact length")? as usize;
        let compressed = stream.read_vec(compressed_len).await.with_context(|| {
            format!("failed to read {} compressed Tight bytes", compressed_len)
        })?;

        tracing::debug!(
            "Tight: stream {} inflating {} -> {} bytes",
            stream_id,
            compressed_len,
            expected
        );

        let mut streams = self.streams.lock().unwrap();
        zlib::inflate_exact(&mut streams[stream_id], &compressed, expected)
            .with_context(|| format!("Tight stream {} decompression failed", stream_id))
    }

    async fn read_palette<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &DecodeState,
    ) -> Result<TightPixels> {
        let palette_len = stream
            .read_u8()
            .await
            .context("failed to read Tight palette size")? as usize
            + 1;
        let bytes_per_pixel = state.bytes_per_pixel();

        let palette = stream
            .read_vec(palette_len * bytes_per_pixel)
            .await
            .context("failed to read Tight palette entries")?;

        let width = rect.width as usize;
        let height = rect.height as usize;

        // Two-color palettes are a packed bitmap with byte-aligned rows;
        // anything larger is one index byte per pixel.
        let index_len = if palette_len <= 2 {
            width.div_ceil(8) * height
        } else {
            width * height
        };
        let indices = self
            .read_filter_data(stream, TIGHT_FILTER_PALETTE as usize, index_len)
            .await?;

        let mut data = vec![0u8; width * height * bytes_per_pixel];
        if palette_len <= 2 {
            let row_bytes = width.div_ceil(8);
            for y in 0..height {
                for x in 0..width {
                    let byte = indices[y * row_bytes + x / 8];
                    let index = ((byte >> (7 - (x % 8))) & 1) as usize;
                    if index >= palette_len {
                        bail!("Tight palette index 1 out of range for single-entry palette");
                    }
                    let src = index * bytes_per_pixel;
                    let dst = (y * width + x) * bytes_per_pixel;
                    data[dst..dst + bytes_per_pixel]
                        .copy_from_slice(&palette[src..src + bytes_per_pixel]);
                }
            }
        } else {
            for (i, &index) in indices.iter().enumerate() {
                let index = index as usize;
                if index >= palette_len {
                    bail!(
                        "Tight palette index {} out of range for palette of {}",
                        index,
                        palette_len
                    );
                }
                let src = index * bytes_per_pixel;
                let dst = i * bytes_per_pixel;
                data[dst..dst + bytes_per_pixel]
                    .copy_from_slice(&palette[src..src + bytes_per_pixel]);
            }
        }

        Ok(TightPixels { data })
    }

    async fn read_gradient<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &DecodeState,
    ) -> Result<TightPixels> {
        let pf = state.pixel_format();
        let bytes_per_pixel = state.bytes_per_pixel();
        if pf.true_color == 0 || !(bytes_per_pixel == 3 || bytes_per_pixel == 4) {
            bail!(
                "Tight gradient filter requires 24/32bpp true color, got {}bpp",
                pf.bits_per_pixel
            );
        }

        let width = rect.width as usize;
        let height = rect.height as usize;
        let expected = width * height * bytes_per_pixel;
        let corrections = self
            .read_filter_data(stream, TIGHT_FILTER_GRADIENT as usize, expected)
            .await?;

        let mut data = vec![0u8; expected];
        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * bytes_per_pixel;
                for b in 0..bytes_per_pixel {
                    let left = if x > 0 {
                        data[offset - bytes_per_pixel + b] as i32
                    } else {
                        0
                    };
                    let above = if y > 0 {
                        data[offset - width * bytes_per_pixel + b] as i32
                    } else {
                        0
                    };
                    let above_left = if x > 0 && y > 0 {
                        data[offset - (width + 1) * bytes_per_pixel + b] as i32
                    } else {
                        0
                    };

                    let predicted = (left + above - above_left).clamp(0, 255) as u8;
                    data[offset + b] = predicted.wrapping_add(corrections[offset + b]);
                }
            }
        }

        Ok(TightPixels { data })
    }
}

impl Decoder for TightDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_TIGHT
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        let comp_ctl = stream
            .read_u8()
            .await
            .with_context(|| {
                format!(
                    "failed to read Tight compression control at ({}, {})",
                    rect.x, rect.y
                )
            })?;

        // Reset the requested streams before anything is decompressed.
        {
            let mut streams = self.streams.lock().unwrap();
            for (i, stream) in streams.iter_mut().enumerate() {
                if comp_ctl & (1 << i) != 0 {
                    tracing::debug!("Tight: resetting zlib stream {}", i);
                    stream.reset(true);
                }
            }
        }

        let filter = comp_ctl >> 4;
        tracing::debug!(
            "Tight: rect [{},{} {}x{}] comp_ctl={:#04x} filter={} resets={:#x}",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            comp_ctl,
            filter,
            comp_ctl & 0x0F
        );

        let pixels = match filter {
            TIGHT_FILTER_COPY => {
                let expected = rect.area() * state.bytes_per_pixel();
                let data = self
                    .read_filter_data(stream, TIGHT_FILTER_COPY as usize, expected)
                    .await?;
                TightPixels { data }
            }
            TIGHT_FILTER_PALETTE => self.read_palette(stream, rect, state).await?,
            TIGHT_FILTER_GRADIENT => self.read_gradient(stream, rect, state).await?,
            TIGHT_FILTER_JPEG => {
                bail!("Tight JPEG sub-encoding is not supported by this client")
            }
            other => bail!("invalid Tight filter {}", other),
        };

        Ok(RectData::Tight(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use rfb_wire::pixel::PixelFormat;
    use std::io::{Cursor, Write};

    fn state_rgb32() -> DecodeState {
        DecodeState::new(PixelFormat::rgb32(), 640, 480)
    }

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn compact_length(mut value: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        loop {
            let group = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                bytes.push(group);
                break;
            }
            bytes.push(group | 0x80);
        }
        bytes
    }

    async fn decode(
        decoder: &TightDecoder,
        wire: Vec<u8>,
        rect: Rectangle,
    ) -> Result<TightPixels> {
        let mut state = state_rgb32();
        let mut stream = RfbInStream::new(Cursor::new(wire));
        match decoder.decode(&mut stream, &rect, &mut state).await? {
            RectData::Tight(pixels) => Ok(pixels),
            other => panic!("expected Tight payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn decoder_type() {
        assert_eq!(TightDecoder::default().encoding_type(), ENCODING_TIGHT);
    }

    #[tokio::test]
    async fn copy_filter_small_payload_is_uncompressed() {
        // 2x1 at 32bpp = 8 bytes, below the compression threshold: the
        // raster follows the control byte directly, no length prefix.
        let raster = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut wire = vec![0x00];
        wire.extend_from_slice(&raster);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 2, 1))
            .await
            .unwrap();
        assert_eq!(pixels.data, raster);
    }

    #[tokio::test]
    async fn copy_filter_compressed() {
        let raster: Vec<u8> = (0u8..64).collect(); // 4x4 at 32bpp
        let compressed = zlib_compress(&raster);

        let mut wire = vec![0x00];
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 4, 4))
            .await
            .unwrap();
        assert_eq!(pixels.data, raster);
    }

    #[tokio::test]
    async fn copy_filter_size_mismatch_is_error() {
        // Compresses to fewer raster bytes than the rectangle needs.
        let compressed = zlib_compress(&[0u8; 8]);
        let mut wire = vec![0x00];
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        assert!(
            decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 4, 4))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn jpeg_is_rejected() {
        let result = decode(
            &TightDecoder::default(),
            vec![0x80],
            Rectangle::new(0, 0, 4, 4),
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JPEG"));
    }

    #[tokio::test]
    async fn unknown_filter_is_rejected() {
        let result = decode(
            &TightDecoder::default(),
            vec![0x50],
            Rectangle::new(0, 0, 4, 4),
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid Tight filter"));
    }

    #[tokio::test]
    async fn monochrome_palette_expansion() {
        // 16x1, palette [black, white], indices 0xAA,0xAA: alternating
        // pixels starting with white (bit 1 -> palette[1]).
        // Index data is 2 bytes (row-padded), below the compression
        // threshold, so it is sent uncompressed.
        let black = [0u8, 0, 0, 0];
        let white = [255u8, 255, 255, 0];
        let mut wire = vec![0x10]; // palette filter, no resets
        wire.push(1); // palette size - 1
        wire.extend_from_slice(&black);
        wire.extend_from_slice(&white);
        wire.extend_from_slice(&[0xAA, 0xAA]);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 16, 1))
            .await
            .unwrap();

        assert_eq!(pixels.data.len(), 16 * 4);
        for x in 0..16 {
            let expect: &[u8; 4] = if x % 2 == 0 { &white } else { &black };
            assert_eq!(&pixels.data[x * 4..x * 4 + 4], expect, "pixel {}", x);
        }
    }

    #[tokio::test]
    async fn monochrome_palette_pads_each_row() {
        // 3x2: each row of 3 pixels occupies a full byte, MSB first.
        let a = [1u8, 0, 0, 0];
        let b = [2u8, 0, 0, 0];
        let mut wire = vec![0x10];
        wire.push(1);
        wire.extend_from_slice(&a);
        wire.extend_from_slice(&b);
        // Row 0: 0b101..... -> b a b; row 1: 0b010..... -> a b a
        wire.extend_from_slice(&[0b1010_0000, 0b0100_0000]);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 3, 2))
            .await
            .unwrap();

        let pixel = |i: usize| &pixels.data[i * 4..i * 4 + 4];
        assert_eq!(pixel(0), &b);
        assert_eq!(pixel(1), &a);
        assert_eq!(pixel(2), &b);
        assert_eq!(pixel(3), &a);
        assert_eq!(pixel(4), &b);
        assert_eq!(pixel(5), &a);
    }

    #[tokio::test]
    async fn indexed_palette_expansion() {
        // 4x4 with a 3-color palette: 16 index bytes, compressed.
        let palette: Vec<u8> = vec![
            10, 0, 0, 0, //
            20, 0, 0, 0, //
            30, 0, 0, 0,
        ];
        let indices: Vec<u8> = vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
        let compressed = zlib_compress(&indices);

        let mut wire = vec![0x10];
        wire.push(2); // palette size - 1
        wire.extend_from_slice(&palette);
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 4, 4))
            .await
            .unwrap();
        for (i, &index) in indices.iter().enumerate() {
            assert_eq!(pixels.data[i * 4], (index + 1) * 10);
        }
    }

    #[tokio::test]
    async fn invalid_palette_index_is_error() {
        let palette: Vec<u8> = vec![10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0];
        let indices = vec![0u8, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]; // 3 is out of range
        let compressed = zlib_compress(&indices);

        let mut wire = vec![0x10];
        wire.push(2);
        wire.extend_from_slice(&palette);
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        let result = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 4, 4)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn stream_state_persists_across_rectangles() {
        // Two palette rectangles whose index data is cut from one
        // continuous zlib stream on stream 1. The first rectangle resets
        // every stream; the second carries no reset bits and must continue
        // stream 1's state.
        let indices_a = vec![0u8; 16]; // 4x4 of palette[0]
        let indices_b = vec![1u8; 16]; // 4x4 of palette[1]
        let chunks = crate::zlib::compress_chunked(&[&indices_a, &indices_b]);

        let palette: Vec<u8> = vec![10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0];
        let wire = |reset: u8, chunk: &[u8]| {
            let mut bytes = vec![0x10 | reset];
            bytes.push(2);
            bytes.extend_from_slice(&palette);
            bytes.extend_from_slice(&compact_length(chunk.len()));
            bytes.extend_from_slice(chunk);
            bytes
        };

        let decoder = TightDecoder::default();
        let rect = Rectangle::new(0, 0, 4, 4);

        let first = decode(&decoder, wire(0x0F, &chunks[0]), rect).await.unwrap();
        assert!(first.data.chunks_exact(4).all(|p| p[0] == 10));

        let second = decode(&decoder, wire(0x00, &chunks[1]), rect).await.unwrap();
        assert!(second.data.chunks_exact(4).all(|p| p[0] == 20));

        // A decoder that never saw the first chunk cannot make sense of
        // the continuation.
        let fresh = TightDecoder::default();
        match decode(&fresh, wire(0x00, &chunks[1]), rect).await {
            Err(_) => {}
            Ok(out) => assert!(out.data.chunks_exact(4).any(|p| p[0] != 20)),
        }
    }

    #[tokio::test]
    async fn reset_bits_discard_stream_state() {
        // After a reset, the stream expects a fresh zlib header again.
        let indices = vec![0u8; 16];
        let chunks = crate::zlib::compress_chunked(&[&indices, &indices]);
        let fresh_again = zlib_compress(&indices);

        let palette: Vec<u8> = vec![10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0];
        let wire = |reset: u8, chunk: &[u8]| {
            let mut bytes = vec![0x10 | reset];
            bytes.push(2);
            bytes.extend_from_slice(&palette);
            bytes.extend_from_slice(&compact_length(chunk.len()));
            bytes.extend_from_slice(chunk);
            bytes
        };

        let decoder = TightDecoder::default();
        let rect = Rectangle::new(0, 0, 4, 4);

        decode(&decoder, wire(0x00, &chunks[0]), rect).await.unwrap();
        // Reset stream 1 (bit 1), then feed it a self-contained stream.
        let result = decode(&decoder, wire(0x02, &fresh_again), rect).await.unwrap();
        assert!(result.data.chunks_exact(4).all(|p| p[0] == 10));
    }

    #[tokio::test]
    async fn gradient_zero_corrections_reproduce_predictor() {
        // With all-zero corrections every byte equals the clamped
        // predictor, which stays zero across the whole raster.
        let corrections = vec![0u8; 4 * 4 * 4];
        let compressed = zlib_compress(&corrections);

        let mut wire = vec![0x20];
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 4, 4))
            .await
            .unwrap();
        assert!(pixels.data.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn gradient_propagates_left_neighbor() {
        // 2x1: first pixel gets its correction verbatim (no neighbors),
        // second predicts from the first.
        let corrections = vec![
            100, 0, 0, 0, // pixel (0,0)
            5, 0, 0, 0, // pixel (1,0): predictor = left = 100
        ];
        let mut wire = vec![0x20];
        wire.extend_from_slice(&corrections); // 8 bytes, sent uncompressed

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 2, 1))
            .await
            .unwrap();
        assert_eq!(pixels.data[0], 100);
        assert_eq!(pixels.data[4], 105);
    }

    #[tokio::test]
    async fn gradient_uses_above_and_above_left() {
        // 2x2 with corrections chosen to exercise the full predictor:
        // (1,1) predicts left + above - above_left = 20 + 10 - 100, clamped
        // to 0.
        let corrections = vec![
            100, 0, 0, 0, // (0,0) = 100
            166, 0, 0, 0, // (1,0): pred=100 -> 100+166 = 266 mod 256 = 10
            176, 0, 0, 0, // (0,1): pred=above=100 -> 100+176 = 276 mod 256 = 20
            7, 0, 0, 0, // (1,1): pred=clamp(20+10-100)=0 -> 7
        ];
        let compressed = zlib_compress(&corrections);
        let mut wire = vec![0x20];
        wire.extend_from_slice(&compact_length(compressed.len()));
        wire.extend_from_slice(&compressed);

        let pixels = decode(&TightDecoder::default(), wire, Rectangle::new(0, 0, 2, 2))
            .await
            .unwrap();
        assert_eq!(pixels.data[0], 100);
        assert_eq!(pixels.data[4], 10);
        assert_eq!(pixels.data[8], 20);
        assert_eq!(pixels.data[12], 7);
    }

    #[tokio::test]
    async fn gradient_rejects_indexed_formats() {
        let indexed = PixelFormat {
            bits_per_pixel: 8,
            depth: 8,
            big_endian: 0,
            true_color: 0,
            red_max: 0,
            green_max: 0,
            blue_max: 0,
            red_shift: 0,
            green_shift: 0,
            blue_shift: 0,
        };
        let mut state = DecodeState::new(indexed, 640, 480);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x20]));
        let rect = Rectangle::new(0, 0, 4, 4);

        let result = TightDecoder::default()
            .decode(&mut stream, &rect, &mut state)
            .await;
        assert!(result.is_err());
    }
}
