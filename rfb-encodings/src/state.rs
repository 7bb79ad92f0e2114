//! Shared decode context.

use rfb_wire::pixel::{Color, ColorMap, PixelFormat};

/// Connection-level state the decoders read and, for pseudo-encodings,
/// mutate.
///
/// The reader task owns the `DecodeState` exclusively; decoders receive it
/// by mutable reference for the duration of one rectangle. Pixel-format
/// changes go through [`set_pixel_format`](Self::set_pixel_format) so the
/// color map can never outlive the format it was installed for.
#[derive(Debug, Clone)]
pub struct DecodeState {
    pixel_format: PixelFormat,
    color_map: Option<ColorMap>,
    fb_width: u16,
    fb_height: u16,
}

impl DecodeState {
    pub fn new(pixel_format: PixelFormat, fb_width: u16, fb_height: u16) -> Self {
        Self {
            pixel_format,
            color_map: None,
            fb_width,
            fb_height,
        }
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    /// Install a new pixel format. Invalidates any installed color map:
    /// indices decoded under the old format are meaningless under the new
    /// one.
    pub fn set_pixel_format(&mut self, pixel_format: PixelFormat) {
        self.pixel_format = pixel_format;
        self.color_map = None;
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_format.bytes_per_pixel() as usize
    }

    /// Merge entries into the color map, creating it on first install.
    pub fn install_color_map(&mut self, first_color: u16, colors: &[Color]) {
        self.color_map
            .get_or_insert_with(ColorMap::default)
            .install(first_color, colors);
    }

    pub fn color_map(&self) -> Option<&ColorMap> {
        self.color_map.as_ref()
    }

    pub fn framebuffer_size(&self) -> (u16, u16) {
        (self.fb_width, self.fb_height)
    }

    /// Resize the framebuffer (DesktopSize pseudo-encoding).
    pub fn set_framebuffer_size(&mut self, width: u16, height: u16) {
        self.fb_width = width;
        self.fb_height = height;
    }

    /// Decode one pixel's wire bytes through the current format and map.
    pub fn read_color(&self, bytes: &[u8]) -> std::io::Result<Color> {
        self.pixel_format.read_color(bytes, self.color_map.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_change_invalidates_color_map() {
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
        state.install_color_map(0, &[Color::new(1, 2, 3)]);
        assert!(state.color_map().is_some());

        state.set_pixel_format(PixelFormat::rgb32());
        assert!(state.color_map().is_none());
    }

    #[test]
    fn framebuffer_resize() {
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        state.set_framebuffer_size(800, 600);
        assert_eq!(state.framebuffer_size(), (800, 600));
    }
}
