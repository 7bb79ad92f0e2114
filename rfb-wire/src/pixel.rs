//! Pixel formats, colors and color maps.
//!
//! The RFB protocol describes every pixel with a 16-byte [`PixelFormat`]
//! negotiated at handshake time. Decoding a pixel is deterministic given
//! that format and, for non-true-color formats, the [`ColorMap`] installed
//! by `SetColorMapEntries`:
//!
//! - **True color**: each channel is extracted from the pixel value by
//!   shifting right by the channel's shift and masking with its max.
//! - **Color map**: the pixel value is an index into the map.
//!
//! [`Color`] carries the raw channel values as the format defines them
//! (`red_max` etc. bound the range); it does no scaling.

use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// RFB pixel format specification.
///
/// # Wire Format
///
/// PixelFormat is 16 bytes on the wire:
/// - 1 byte: bits_per_pixel
/// - 1 byte: depth
/// - 1 byte: big_endian (0 or 1)
/// - 1 byte: true_color (0 or 1)
/// - 2 bytes each: red_max, green_max, blue_max
/// - 1 byte each: red_shift, green_shift, blue_shift
/// - 3 bytes: padding (must be zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: u8, // Boolean: must be 0 or 1
    pub true_color: u8, // Boolean: must be 0 or 1
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Standard 32-bit true-color format: depth 24, little-endian,
    /// 8 bits per channel at shifts 0/8/16. This is what the client
    /// requests via SetPixelFormat after the handshake.
    pub const fn rgb32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: 0,
            true_color: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Bytes per pixel (1, 2, 3 or 4).
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// Read a PixelFormat from an RFB input stream.
    ///
    /// # Errors
    ///
    /// Fails on EOF, on boolean fields outside {0, 1}, and on non-zero
    /// padding.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let bits_per_pixel = stream.read_u8().await?;
        let depth = stream.read_u8().await?;
        let big_endian = stream.read_u8().await?;
        let true_color = stream.read_u8().await?;

        if big_endian > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("big_endian must be 0 or 1, got {}", big_endian),
            ));
        }
        if true_color > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("true_color must be 0 or 1, got {}", true_color),
            ));
        }

        let red_max = stream.read_u16().await?;
        let green_max = stream.read_u16().await?;
        let blue_max = stream.read_u16().await?;
        let red_shift = stream.read_u8().await?;
        let green_shift = stream.read_u8().await?;
        let blue_shift = stream.read_u8().await?;

        let mut padding = [0u8; 3];
        stream.read_bytes(&mut padding).await?;
        if padding != [0, 0, 0] {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("padding must be zero, got {:?}", padding),
            ));
        }

        Ok(Self {
            bits_per_pixel,
            depth,
            big_endian,
            true_color,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    /// Write this PixelFormat to an RFB output stream.
    pub fn write_to<W: AsyncWrite + Unpin>(
        &self,
        stream: &mut RfbOutStream<W>,
    ) -> std::io::Result<()> {
        if self.big_endian > 1 || self.true_color > 1 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "boolean pixel format fields must be 0 or 1",
            ));
        }

        stream.write_u8(self.bits_per_pixel);
        stream.write_u8(self.depth);
        stream.write_u8(self.big_endian);
        stream.write_u8(self.true_color);
        stream.write_u16(self.red_max);
        stream.write_u16(self.green_max);
        stream.write_u16(self.blue_max);
        stream.write_u8(self.red_shift);
        stream.write_u8(self.green_shift);
        stream.write_u8(self.blue_shift);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u8(0);

        Ok(())
    }

    /// Assemble a pixel value from `bytes_per_pixel` wire bytes, honoring
    /// the format's endianness.
    fn pixel_value(&self, bytes: &[u8]) -> std::io::Result<u32> {
        let bpp = self.bytes_per_pixel() as usize;
        if bytes.len() < bpp || bpp == 0 || bpp > 4 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "pixel needs {} bytes for {}bpp, got {}",
                    bpp,
                    self.bits_per_pixel,
                    bytes.len()
                ),
            ));
        }

        let mut value = 0u32;
        if self.big_endian != 0 {
            for &byte in &bytes[..bpp] {
                value = (value << 8) | byte as u32;
            }
        } else {
            for &byte in bytes[..bpp].iter().rev() {
                value = (value << 8) | byte as u32;
            }
        }
        Ok(value)
    }

    /// Decode one pixel's wire bytes into a [`Color`].
    ///
    /// True-color formats extract channels by mask and shift. Indexed
    /// formats look the pixel value up in `color_map`, which must be
    /// installed by then; a missing map or out-of-range index is a
    /// protocol error.
    pub fn read_color(
        &self,
        bytes: &[u8],
        color_map: Option<&ColorMap>,
    ) -> std::io::Result<Color> {
        let value = self.pixel_value(bytes)?;

        if self.true_color != 0 {
            // Shifts >= 32 would be undefined; treat the channel as absent.
            let channel =
                |shift: u8, max: u16| (value.checked_shr(shift as u32).unwrap_or(0) as u16) & max;
            return Ok(Color {
                r: channel(self.red_shift, self.red_max),
                g: channel(self.green_shift, self.green_max),
                b: channel(self.blue_shift, self.blue_max),
            });
        }

        let map = color_map.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "indexed pixel received but no color map is installed",
            )
        })?;
        let index = value as usize;
        if index >= map.entries.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("color map index {} out of range", index),
            ));
        }
        Ok(map.entries[index])
    }

    /// Encode a [`Color`] back into wire bytes.
    ///
    /// Only defined for true-color formats; a decoded map entry no longer
    /// remembers its index, so indexed formats cannot be re-marshalled.
    pub fn write_color(&self, color: Color) -> std::io::Result<Vec<u8>> {
        if self.true_color == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "cannot marshal colors for an indexed pixel format",
            ));
        }

        let channel = |raw: u16, max: u16, shift: u8| {
            ((raw & max) as u32).checked_shl(shift as u32).unwrap_or(0)
        };
        let value = channel(color.r, self.red_max, self.red_shift)
            | channel(color.g, self.green_max, self.green_shift)
            | channel(color.b, self.blue_max, self.blue_shift);

        let bpp = self.bytes_per_pixel() as usize;
        let le = value.to_le_bytes();
        let be = value.to_be_bytes();
        let bytes = if self.big_endian != 0 {
            be[4 - bpp..].to_vec()
        } else {
            le[..bpp].to_vec()
        };
        Ok(bytes)
    }
}

/// A logical color with raw channel values as bounded by the pixel
/// format's channel maxima (color map entries use the full u16 range).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Color {
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }
}

/// Indexed RGB lookup of up to 256 entries, installed by
/// `SetColorMapEntries` and consulted only while the active pixel format
/// is not true-color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    pub entries: [Color; 256],
}

impl Default for ColorMap {
    fn default() -> Self {
        Self {
            entries: [Color::default(); 256],
        }
    }
}

impl ColorMap {
    /// Overwrite `colors.len()` entries starting at `first_color`.
    /// Entries past the end of the map are ignored.
    pub fn install(&mut self, first_color: u16, colors: &[Color]) {
        for (offset, color) in colors.iter().enumerate() {
            let index = first_color as usize + offset;
            if index >= self.entries.len() {
                break;
            }
            self.entries[index] = *color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn bytes_per_pixel() {
        let mut pf = PixelFormat::rgb32();
        assert_eq!(pf.bytes_per_pixel(), 4);
        pf.bits_per_pixel = 16;
        assert_eq!(pf.bytes_per_pixel(), 2);
        pf.bits_per_pixel = 8;
        assert_eq!(pf.bytes_per_pixel(), 1);
    }

    #[tokio::test]
    async fn wire_round_trip() {
        let original = PixelFormat::rgb32();

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out).unwrap();
        out.flush().await.unwrap();
        assert_eq!(buffer.len(), 16);

        let mut input = RfbInStream::new(Cursor::new(buffer));
        let read_back = PixelFormat::read_from(&mut input).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn rejects_invalid_boolean() {
        let data = vec![
            32, 24, 2, 1, // big_endian = 2 is invalid
            0, 255, 0, 255, 0, 255, 16, 8, 0, 0, 0, 0,
        ];
        let mut input = RfbInStream::new(Cursor::new(data));
        assert!(PixelFormat::read_from(&mut input).await.is_err());
    }

    #[tokio::test]
    async fn rejects_nonzero_padding() {
        let data = vec![
            32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 16, 8, 0, // fields
            1, 0, 0, // padding must be zero
        ];
        let mut input = RfbInStream::new(Cursor::new(data));
        assert!(PixelFormat::read_from(&mut input).await.is_err());
    }

    #[test]
    fn true_color_extraction_little_endian() {
        let pf = PixelFormat::rgb32();
        // Red at shift 0: first wire byte in little-endian order.
        let red = pf.read_color(&[0xFF, 0, 0, 0], None).unwrap();
        assert_eq!(red, Color::new(255, 0, 0));
        let green = pf.read_color(&[0, 0xFF, 0, 0], None).unwrap();
        assert_eq!(green, Color::new(0, 255, 0));
        let blue = pf.read_color(&[0, 0, 0xFF, 0], None).unwrap();
        assert_eq!(blue, Color::new(0, 0, 255));
    }

    #[test]
    fn true_color_extraction_big_endian() {
        let pf = PixelFormat {
            big_endian: 1,
            ..PixelFormat::rgb32()
        };
        // 0x000000FF big-endian: red channel (shift 0) set.
        let color = pf.read_color(&[0, 0, 0, 0xFF], None).unwrap();
        assert_eq!(color, Color::new(255, 0, 0));
    }

    #[test]
    fn rgb565_extraction() {
        let pf = PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: 0,
            true_color: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        };
        // 0xF800 = all red bits
        let color = pf.read_color(&[0x00, 0xF8], None).unwrap();
        assert_eq!(color, Color::new(31, 0, 0));
    }

    #[test]
    fn color_write_round_trip() {
        let pf = PixelFormat::rgb32();
        let color = Color::new(200, 100, 50);
        let bytes = pf.write_color(color).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(pf.read_color(&bytes, None).unwrap(), color);
    }

    #[test]
    fn indexed_lookup() {
        let pf = PixelFormat {
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

        let mut map = ColorMap::default();
        map.install(5, &[Color::new(1000, 2000, 3000)]);

        let color = pf.read_color(&[5], Some(&map)).unwrap();
        assert_eq!(color, Color::new(1000, 2000, 3000));

        // No map installed is a protocol error.
        assert!(pf.read_color(&[5], None).is_err());
    }

    #[test]
    fn install_clamps_to_map_size() {
        let mut map = ColorMap::default();
        map.install(255, &[Color::new(1, 1, 1), Color::new(2, 2, 2)]);
        assert_eq!(map.entries[255], Color::new(1, 1, 1));
    }
}
