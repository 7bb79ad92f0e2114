//! Server-to-client RFB messages that need no decoder support.
//!
//! `read_from` parses the message body; the one-byte type discriminant has
//! already been consumed by the dispatch loop. `write_to` emits the full
//! message including its type byte (used by tests and server tooling).

use crate::io::{RfbInStream, RfbOutStream};
use crate::pixel::{Color, PixelFormat};
use tokio::io::{AsyncRead, AsyncWrite};

/// ServerInit - framebuffer dimensions, pixel format and desktop name,
/// sent once in response to ClientInit.
///
/// # Wire Format
///
/// - 2 bytes: framebuffer width
/// - 2 bytes: framebuffer height
/// - 16 bytes: PixelFormat
/// - 4 bytes: name length
/// - N bytes: name (UTF-8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let framebuffer_width = stream.read_u16().await?;
        let framebuffer_height = stream.read_u16().await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        let name_length = stream.read_u32().await? as usize;
        let name_bytes = stream.read_vec(name_length).await?;
        let name = String::from_utf8(name_bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("desktop name is not valid UTF-8: {}", e),
            )
        })?;

        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(
        &self,
        stream: &mut RfbOutStream<W>,
    ) -> std::io::Result<()> {
        stream.write_u16(self.framebuffer_width);
        stream.write_u16(self.framebuffer_height);
        self.pixel_format.write_to(stream)?;
        stream.write_u32(self.name.len() as u32);
        stream.write_bytes(self.name.as_bytes());
        Ok(())
    }
}

/// SetColorMapEntries (type 1) - install color map entries for indexed
/// pixel formats.
///
/// # Wire Format
///
/// - 1 byte: message type (1)
/// - 1 byte: padding
/// - 2 bytes: first color index
/// - 2 bytes: number of colors
/// - 6 bytes per color: red, green, blue as u16 each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetColorMapEntries {
    pub first_color: u16,
    pub colors: Vec<Color>,
}

impl SetColorMapEntries {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?;
        let first_color = stream.read_u16().await?;
        let count = stream.read_u16().await? as usize;

        let mut colors = Vec::with_capacity(count);
        for _ in 0..count {
            colors.push(Color {
                r: stream.read_u16().await?,
                g: stream.read_u16().await?,
                b: stream.read_u16().await?,
            });
        }

        Ok(Self {
            first_color,
            colors,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(1);
        stream.write_u8(0);
        stream.write_u16(self.first_color);
        stream.write_u16(self.colors.len() as u16);
        for color in &self.colors {
            stream.write_u16(color.r);
            stream.write_u16(color.g);
            stream.write_u16(color.b);
        }
    }
}

/// Bell (type 2) - audible notification, no body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bell;

impl Bell {
    pub async fn read_from<R: AsyncRead + Unpin>(
        _stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self)
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(2);
    }
}

/// ServerCutText (type 3) - clipboard text from the server.
///
/// # Wire Format
///
/// - 1 byte: message type (3)
/// - 3 bytes: padding
/// - 4 bytes: text length
/// - N bytes: text (Latin-1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCutText {
    pub text: String,
}

impl ServerCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        let length = stream.read_u32().await? as usize;
        let bytes = stream.read_vec(length).await?;
        // The protocol says Latin-1; lossy conversion keeps us total.
        Ok(Self {
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(3);
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
    use std::io::Cursor;

    #[tokio::test]
    async fn server_init_round_trip() {
        let original = ServerInit {
            framebuffer_width: 1920,
            framebuffer_height: 1080,
            pixel_format: PixelFormat::rgb32(),
            name: "Test Desktop".to_string(),
        };

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out).unwrap();
        out.flush().await.unwrap();

        let mut input = RfbInStream::new(Cursor::new(buffer));
        let read_back = ServerInit::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn color_map_entries_round_trip() {
        let original = SetColorMapEntries {
            first_color: 10,
            colors: vec![Color::new(65535, 0, 0), Color::new(0, 65535, 0)],
        };

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();
        assert_eq!(buffer.len(), 1 + 1 + 2 + 2 + 2 * 6);

        // Skip the type byte the dispatch loop would have consumed.
        let mut input = RfbInStream::new(Cursor::new(&buffer[1..]));
        let read_back = SetColorMapEntries::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn bell_is_empty() {
        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        Bell.write_to(&mut out);
        out.flush().await.unwrap();
        assert_eq!(buffer, vec![2]);
    }

    #[tokio::test]
    async fn cut_text_round_trip() {
        let original = ServerCutText {
            text: "Hello, clipboard!".to_string(),
        };

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();

        let mut input = RfbInStream::new(Cursor::new(&buffer[1..]));
        let read_back = ServerCutText::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn cut_text_empty() {
        let original = ServerCutText {
            text: String::new(),
        };

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();

        let mut input = RfbInStream::new(Cursor::new(&buffer[1..]));
        assert_eq!(
            ServerCutText::read_from(&mut input).await.unwrap(),
            original
        );
    }
}
