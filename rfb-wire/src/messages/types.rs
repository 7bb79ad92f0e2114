//! Core protocol types and constants.

use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// A rectangular region of the framebuffer, in framebuffer coordinates.
///
/// # Wire Format
///
/// 8 bytes: x, y, width, height as u16 each. In a `FramebufferUpdate` the
/// geometry is immediately followed by a 4-byte signed encoding type, which
/// the update parser reads separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rectangle {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered by the rectangle.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Read a rectangle's geometry from an RFB input stream.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
        })
    }

    /// Write a rectangle's geometry to an RFB output stream.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
    }
}

//
// Encoding type constants (RFC 6143 §7.7, §7.8)
//

/// Raw encoding - uncompressed pixel data.
pub const ENCODING_RAW: i32 = 0;

/// CopyRect encoding - copy from another framebuffer region.
pub const ENCODING_COPY_RECT: i32 = 1;

/// RRE (Rise-and-Run-length Encoding).
pub const ENCODING_RRE: i32 = 2;

/// Hextile encoding - 16x16 tiles with per-tile sub-encodings.
pub const ENCODING_HEXTILE: i32 = 5;

/// Tight encoding - filtered, zlib-compressed pixel data.
pub const ENCODING_TIGHT: i32 = 7;

/// ZRLE (Zlib Run-Length Encoding) - zlib stream of 64x64 tiles.
pub const ENCODING_ZRLE: i32 = 16;

/// Pseudo-encoding: cursor shape update; the rectangle is the hotspot
/// and cursor dimensions.
pub const ENCODING_PSEUDO_CURSOR: i32 = -239;

/// Pseudo-encoding: framebuffer dimensions changed to the rectangle's
/// width and height.
pub const ENCODING_PSEUDO_DESKTOP_SIZE: i32 = -223;

//
// Security type constants (RFC 6143 §7.1.2)
//

/// No authentication.
pub const SECURITY_NONE: u8 = 1;

/// VNC authentication - DES challenge-response.
pub const SECURITY_VNC_AUTH: u8 = 2;

/// VeNCrypt - version/subtype negotiation wrapper.
pub const SECURITY_VENCRYPT: u8 = 19;

//
// Server-to-client message types (RFC 6143 §7.6)
//

pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const SERVER_MSG_SET_COLOR_MAP_ENTRIES: u8 = 1;
pub const SERVER_MSG_BELL: u8 = 2;
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn rectangle_round_trip() {
        let original = Rectangle::new(100, 200, 640, 480);

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();
        assert_eq!(buffer, vec![0, 100, 0, 200, 2, 128, 1, 224]);

        let mut input = RfbInStream::new(Cursor::new(buffer));
        let read_back = Rectangle::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[test]
    fn area() {
        assert_eq!(Rectangle::new(0, 0, 2, 1).area(), 2);
        // Full-screen rectangles must not overflow 16-bit math.
        assert_eq!(Rectangle::new(0, 0, 65535, 65535).area(), 65535 * 65535);
    }
}
