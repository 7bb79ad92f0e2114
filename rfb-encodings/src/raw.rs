//! Raw encoding decoder - uncompressed pixel data.
//!
//! Raw (type 0) transmits pixels as-is in the negotiated pixel format,
//! `width * height * bytes_per_pixel` bytes in row-major order. It is the
//! least bandwidth-efficient encoding and the mandatory fallback every
//! client must support (RFC 6143 §7.7.1).

use crate::{DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_RAW};
use anyhow::{Context, Result};
use rfb_wire::pixel::{Color, PixelFormat};
use tokio::io::AsyncRead;

/// Decoded Raw rectangle: one [`Color`] per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    pub colors: Vec<Color>,
}

impl RawPixels {
    /// Serialize back to wire bytes under a true-color pixel format.
    pub fn marshal(&self, pixel_format: &PixelFormat) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.colors.len() * pixel_format.bytes_per_pixel() as usize);
        for color in &self.colors {
            bytes.extend_from_slice(&pixel_format.write_color(*color)?);
        }
        Ok(bytes)
    }
}

/// Decoder for raw (uncompressed) pixel data.
pub struct RawDecoder;

impl Decoder for RawDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RAW
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        if rect.width == 0 || rect.height == 0 {
            return Ok(RectData::Raw(RawPixels { colors: Vec::new() }));
        }

        let bytes_per_pixel = state.bytes_per_pixel();
        if !(1..=4).contains(&bytes_per_pixel) {
            anyhow::bail!("invalid bytes_per_pixel {} (must be 1-4)", bytes_per_pixel);
        }
        let total = rect.area() * bytes_per_pixel;
        let pixel_data = stream
            .read_vec(total)
            .await
            .with_context(|| format!("failed to read {} bytes of raw pixel data", total))?;

        let mut colors = Vec::with_capacity(rect.area());
        for pixel in pixel_data.chunks_exact(bytes_per_pixel) {
            colors.push(state.read_color(pixel)?);
        }

        Ok(RectData::Raw(RawPixels { colors }))
    }
}
