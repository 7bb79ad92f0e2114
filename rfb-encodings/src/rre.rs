//! RRE encoding decoder - rise-and-run-length encoding.
//!
//! RRE (type 2) describes a rectangle as a background color plus a list of
//! solid-color sub-rectangles painted over it (RFC 6143 §7.7.3).
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | num_subrects     |  4 bytes (u32)
//! +------------------+
//! | background       |  bytes_per_pixel
//! +------------------+
//! | per sub-rect:    |
//! |   color          |  bytes_per_pixel
//! |   x, y, w, h     |  2 bytes each
//! +------------------+
//! ```

use crate::{DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_RRE};
use anyhow::{Context, Result};
use rfb_wire::pixel::{Color, PixelFormat};
use tokio::io::AsyncRead;

/// One solid-color sub-rectangle, positioned relative to the enclosing
/// rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RreSubRect {
    pub color: Color,
    pub rect: Rectangle,
}

/// Decoded RRE rectangle: fill with `background`, then paint each
/// sub-rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RreRect {
    pub background: Color,
    pub sub_rects: Vec<RreSubRect>,
}

impl RreRect {
    /// Serialize back to wire bytes under a true-color pixel format.
    pub fn marshal(&self, pixel_format: &PixelFormat) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.sub_rects.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&pixel_format.write_color(self.background)?);
        for sub in &self.sub_rects {
            bytes.extend_from_slice(&pixel_format.write_color(sub.color)?);
            bytes.extend_from_slice(&sub.rect.x.to_be_bytes());
            bytes.extend_from_slice(&sub.rect.y.to_be_bytes());
            bytes.extend_from_slice(&sub.rect.width.to_be_bytes());
            bytes.extend_from_slice(&sub.rect.height.to_be_bytes());
        }
        Ok(bytes)
    }
}

/// Decoder for RRE.
pub struct RreDecoder;

impl Decoder for RreDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RRE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        _rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        let num_subrects = stream
            .read_u32()
            .await
            .context("failed to read RRE sub-rectangle count")?;

        let bytes_per_pixel = state.bytes_per_pixel();
        let mut pixel = vec![0u8; bytes_per_pixel];

        stream
            .read_bytes(&mut pixel)
            .await
            .context("failed to read RRE background color")?;
        let background = state.read_color(&pixel)?;

        let mut sub_rects = Vec::with_capacity(num_subrects.min(4096) as usize);
        for i in 0..num_subrects {
            stream
                .read_bytes(&mut pixel)
                .await
                .with_context(|| format!("failed to read RRE sub-rect {} color", i))?;
            let color = state.read_color(&pixel)?;

            let rect = Rectangle::read_from(stream)
                .await
                .with_context(|| format!("failed to read RRE sub-rect {} geometry", i))?;

            sub_rects.push(RreSubRect { color, rect });
        }

        Ok(RectData::Rre(RreRect {
            background,
            sub_rects,
        }))
    }
}
