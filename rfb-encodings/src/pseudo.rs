//! Pseudo-encoding handlers.
//!
//! Pseudo-encodings are reserved encoding types the server uses to carry
//! out-of-band state rather than framebuffer pixels (RFC 6143 §7.8). Two
//! are supported here:
//!
//! - **Cursor (-239)**: the rectangle describes the cursor's dimensions and
//!   hotspot; the body is `area * bytes_per_pixel` pixel bytes followed by
//!   a `ceil(width / 8) * height` transparency bitmask, MSB = leftmost.
//! - **DesktopSize (-223)**: no body at all; the rectangle's width and
//!   height become the new framebuffer dimensions.

use crate::{
    DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_PSEUDO_CURSOR,
    ENCODING_PSEUDO_DESKTOP_SIZE,
};
use anyhow::{Context, Result};
use tokio::io::AsyncRead;

/// Decoded cursor shape. The hotspot is the enclosing rectangle's
/// position; pixel bytes are in the negotiated pixel format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorShape {
    pub pixels: Vec<u8>,
    pub bitmask: Vec<u8>,
}

impl CursorShape {
    /// Serialize back to wire bytes.
    pub fn marshal(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() + self.bitmask.len());
        bytes.extend_from_slice(&self.pixels);
        bytes.extend_from_slice(&self.bitmask);
        bytes
    }
}

/// Decoder for the Cursor pseudo-encoding.
pub struct CursorDecoder;

impl Decoder for CursorDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_PSEUDO_CURSOR
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        let pixel_len = rect.area() * state.bytes_per_pixel();
        let mask_len = (rect.width as usize).div_ceil(8) * rect.height as usize;

        let pixels = stream
            .read_vec(pixel_len)
            .await
            .context("failed to read cursor pixel data")?;
        let bitmask = stream
            .read_vec(mask_len)
            .await
            .context("failed to read cursor bitmask")?;

        Ok(RectData::Cursor(CursorShape { pixels, bitmask }))
    }
}

/// Decoder for the DesktopSize pseudo-encoding. Consumes no bytes; its
/// whole effect is resizing the framebuffer in [`DecodeState`].
pub struct DesktopSizeDecoder;

impl Decoder for DesktopSizeDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_PSEUDO_DESKTOP_SIZE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        _stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        tracing::debug!(
            "desktop size changed: {}x{} -> {}x{}",
            state.framebuffer_size().0,
            state.framebuffer_size().1,
            rect.width,
            rect.height
        );
        state.set_framebuffer_size(rect.width, rect.height);
        Ok(RectData::DesktopSize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_wire::pixel::PixelFormat;
    use std::io::Cursor;

    #[tokio::test]
    async fn cursor_reads_pixels_then_bitmask() {
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        // 10x2 cursor: 80 pixel bytes + ceil(10/8)*2 = 4 mask bytes.
        let rect = Rectangle::new(3, 7, 10, 2);
        let pixels: Vec<u8> = (0..80).collect();
        let bitmask = vec![0b1000_0001, 0xFF, 0x00, 0x55];

        let mut wire = pixels.clone();
        wire.extend_from_slice(&bitmask);
        let mut stream = RfbInStream::new(Cursor::new(wire));

        let data = CursorDecoder
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(data, RectData::Cursor(CursorShape { pixels, bitmask }));
        assert_eq!(stream.available(), 0);
    }

    #[tokio::test]
    async fn cursor_marshal_read_round_trip() {
        let original = CursorShape {
            pixels: vec![9u8; 16], // 2x2 at 32bpp
            bitmask: vec![0b1100_0000, 0b0100_0000],
        };
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        let rect = Rectangle::new(0, 0, 2, 2);
        let mut stream = RfbInStream::new(Cursor::new(original.marshal()));

        let data = CursorDecoder
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(data, RectData::Cursor(original));
    }

    #[tokio::test]
    async fn desktop_size_resizes_framebuffer() {
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        let rect = Rectangle::new(0, 0, 800, 600);
        let mut stream = RfbInStream::new(Cursor::new(Vec::new()));

        let data = DesktopSizeDecoder
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(data, RectData::DesktopSize);
        assert_eq!(state.framebuffer_size(), (800, 600));
        // No body bytes are consumed.
        assert_eq!(stream.available(), 0);
    }
}
