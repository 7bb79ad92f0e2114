//! CopyRect encoding decoder - copy from another framebuffer region.
//!
//! CopyRect (type 1) carries no pixel data at all: just a source position.
//! The payload is the instruction "copy a `width x height` block from
//! `(src_x, src_y)` to the rectangle's position"; applying it against the
//! framebuffer is the renderer's job (RFC 6143 §7.7.2).

use crate::{DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_COPY_RECT};
use anyhow::{Context, Result};
use tokio::io::AsyncRead;

/// Decoded CopyRect rectangle: the source position to copy from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRect {
    pub src_x: u16,
    pub src_y: u16,
}

impl CopyRect {
    /// Serialize back to wire bytes.
    pub fn marshal(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        bytes.extend_from_slice(&self.src_x.to_be_bytes());
        bytes.extend_from_slice(&self.src_y.to_be_bytes());
        bytes
    }
}

/// Decoder for CopyRect.
pub struct CopyRectDecoder;

impl Decoder for CopyRectDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_COPY_RECT
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        _rect: &Rectangle,
        _state: &mut DecodeState,
    ) -> Result<RectData> {
        let src_x = stream
            .read_u16()
            .await
            .context("failed to read CopyRect source x")?;
        let src_y = stream
            .read_u16()
            .await
            .context("failed to read CopyRect source y")?;
        Ok(RectData::CopyRect(CopyRect { src_x, src_y }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_wire::pixel::PixelFormat;
    use std::io::Cursor;

    #[tokio::test]
    async fn decodes_source_position() {
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x01, 0x2C, 0x00, 0x64]));
        let rect = Rectangle::new(10, 20, 100, 50);

        let data = CopyRectDecoder
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(
            data,
            RectData::CopyRect(CopyRect {
                src_x: 300,
                src_y: 100
            })
        );
        // No pixel bytes are consumed beyond the source position.
        assert_eq!(stream.available(), 0);
    }

    #[tokio::test]
    async fn marshal_read_round_trip() {
        let original = CopyRect { src_x: 7, src_y: 9 };
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        let mut stream = RfbInStream::new(Cursor::new(original.marshal()));
        let rect = Rectangle::new(0, 0, 4, 4);

        let data = CopyRectDecoder
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(data, RectData::CopyRect(original));
    }
}
