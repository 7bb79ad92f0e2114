//! Client-to-server RFB messages.
//!
//! Every message buffers its whole wire image before flushing, so a message
//! is always a single write as far as the transport is concerned. The
//! `read_from` counterparts exist for tests and server-side tooling.

use crate::io::{RfbInStream, RfbOutStream};
use crate::pixel::PixelFormat;
use tokio::io::{AsyncRead, AsyncWrite};

/// ClientInit - sent once after the security handshake.
///
/// # Wire Format
///
/// - 1 byte: shared flag (0 = exclusive, 1 = shared)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInit {
    pub shared: bool,
}

impl ClientInit {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let flag = stream.read_u8().await?;
        if flag > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("shared flag must be 0 or 1, got {}", flag),
            ));
        }
        Ok(Self { shared: flag == 1 })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(u8::from(self.shared));
    }
}

/// SetPixelFormat (type 0) - ask the server to use a different pixel format.
///
/// # Wire Format
///
/// - 1 byte: message type (0)
/// - 3 bytes: padding
/// - 16 bytes: PixelFormat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPixelFormat {
    pub pixel_format: PixelFormat,
}

impl SetPixelFormat {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        Ok(Self { pixel_format })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(
        &self,
        stream: &mut RfbOutStream<W>,
    ) -> std::io::Result<()> {
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u8(0);
        self.pixel_format.write_to(stream)
    }
}

/// SetEncodings (type 2) - declare supported encodings in preference order.
///
/// # Wire Format
///
/// - 1 byte: message type (2)
/// - 1 byte: padding
/// - 2 bytes: number of encodings
/// - N * 4 bytes: encoding types (signed i32 each)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?;
        let count = stream.read_u16().await? as usize;
        let mut encodings = Vec::with_capacity(count);
        for _ in 0..count {
            encodings.push(stream.read_i32().await?);
        }
        Ok(Self { encodings })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(2);
        stream.write_u8(0);
        stream.write_u16(self.encodings.len() as u16);
        for encoding in &self.encodings {
            stream.write_i32(*encoding);
        }
    }
}

/// FramebufferUpdateRequest (type 3) - ask for an update of a region.
///
/// # Wire Format
///
/// - 1 byte: message type (3)
/// - 1 byte: incremental (0 = full, 1 = incremental)
/// - 2 bytes each: x, y, width, height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let flag = stream.read_u8().await?;
        if flag > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("incremental flag must be 0 or 1, got {}", flag),
            ));
        }
        Ok(Self {
            incremental: flag == 1,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(3);
        stream.write_u8(u8::from(self.incremental));
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
    }
}

/// KeyEvent (type 4) - key press or release.
///
/// # Wire Format
///
/// - 1 byte: message type (4)
/// - 1 byte: down flag
/// - 2 bytes: padding
/// - 4 bytes: X11 keysym
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: bool,
    pub keysym: u32,
}

impl KeyEvent {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let flag = stream.read_u8().await?;
        if flag > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("down flag must be 0 or 1, got {}", flag),
            ));
        }
        stream.skip(2).await?;
        Ok(Self {
            down: flag == 1,
            keysym: stream.read_u32().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(4);
        stream.write_u8(u8::from(self.down));
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u32(self.keysym);
    }
}

/// PointerEvent (type 5) - pointer position and button state.
///
/// # Wire Format
///
/// - 1 byte: message type (5)
/// - 1 byte: button mask (bit 0 = left button, etc.)
/// - 2 bytes each: x, y
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            button_mask: stream.read_u8().await?,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(5);
        stream.write_u8(self.button_mask);
        stream.write_u16(self.x);
        stream.write_u16(self.y);
    }
}

/// ClientCutText (type 6) - clipboard text from the client.
///
/// # Wire Format
///
/// - 1 byte: message type (6)
/// - 3 bytes: padding
/// - 4 bytes: text length
/// - N bytes: text (Latin-1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCutText {
    pub text: String,
}

impl ClientCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        let length = stream.read_u32().await? as usize;
        let bytes = stream.read_vec(length).await?;
        Ok(Self {
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(6);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(self.text.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::types::ENCODING_RAW;
    use std::io::Cursor;

    async fn to_bytes(write: impl FnOnce(&mut RfbOutStream<&mut Vec<u8>>)) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        write(&mut out);
        out.flush().await.unwrap();
        buffer
    }

    #[tokio::test]
    async fn client_init_wire_bytes() {
        assert_eq!(
            to_bytes(|out| ClientInit { shared: true }.write_to(out)).await,
            vec![1]
        );
        assert_eq!(
            to_bytes(|out| ClientInit { shared: false }.write_to(out)).await,
            vec![0]
        );
    }

    #[tokio::test]
    async fn set_encodings_wire_bytes() {
        // One encoding (Raw): the framing from RFC 6143 §7.5.2.
        let bytes = to_bytes(|out| {
            SetEncodings {
                encodings: vec![ENCODING_RAW],
            }
            .write_to(out)
        })
        .await;
        assert_eq!(bytes, vec![2, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn set_pixel_format_wire_bytes() {
        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        SetPixelFormat {
            pixel_format: PixelFormat::rgb32(),
        }
        .write_to(&mut out)
        .unwrap();
        out.flush().await.unwrap();

        assert_eq!(buffer.len(), 20);
        assert_eq!(&buffer[..4], &[0, 0, 0, 0]);
        assert_eq!(buffer[4], 32); // bits per pixel
        assert_eq!(buffer[5], 24); // depth
    }

    #[tokio::test]
    async fn update_request_round_trip() {
        let original = FramebufferUpdateRequest {
            incremental: true,
            x: 10,
            y: 20,
            width: 640,
            height: 480,
        };
        let bytes = to_bytes(|out| original.write_to(out)).await;
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes.len(), 10);

        let mut input = RfbInStream::new(Cursor::new(&bytes[1..]));
        let read_back = FramebufferUpdateRequest::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn key_event_wire_bytes() {
        let bytes = to_bytes(|out| {
            KeyEvent {
                down: true,
                keysym: 0xFF0D, // Return
            }
            .write_to(out)
        })
        .await;
        assert_eq!(bytes, vec![4, 1, 0, 0, 0, 0, 0xFF, 0x0D]);
    }

    #[tokio::test]
    async fn pointer_event_wire_bytes() {
        let bytes = to_bytes(|out| {
            PointerEvent {
                button_mask: 0b101,
                x: 300,
                y: 200,
            }
            .write_to(out)
        })
        .await;
        assert_eq!(bytes, vec![5, 5, 1, 44, 0, 200]);
    }

    #[tokio::test]
    async fn cut_text_round_trip() {
        let original = ClientCutText {
            text: "clipboard".to_string(),
        };
        let bytes = to_bytes(|out| original.write_to(out)).await;
        assert_eq!(bytes[0], 6);

        let mut input = RfbInStream::new(Cursor::new(&bytes[1..]));
        let read_back = ClientCutText::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }
}
