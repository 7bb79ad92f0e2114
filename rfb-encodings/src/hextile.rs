//! Hextile encoding decoder - 16x16 tiles with per-tile sub-encodings.
//!
//! Hextile (type 5) walks the rectangle in row-major 16x16 tiles (smaller
//! at the right/bottom edges). Each tile opens with a one-byte mask:
//!
//! - **bit 0 (Raw)**: the tile is raw pixels; every other bit is ignored
//! - **bit 1 (BackgroundSpecified)**: a new background pixel follows
//! - **bit 2 (ForegroundSpecified)**: a new foreground pixel follows
//! - **bit 3 (AnySubrects)**: a u8 count and that many sub-rectangles follow
//! - **bit 4 (SubrectsColoured)**: each sub-rectangle carries its own pixel
//!   (otherwise the current foreground is used)
//!
//! Background and foreground are *inherited*: once specified they persist
//! across subsequent tiles of the same rectangle until overridden, which is
//! how large uniform regions avoid repeating colors (RFC 6143 §7.7.4).
//!
//! Sub-rectangle coordinates are packed two to a byte: `xy` holds the x
//! offset in the high nibble and y in the low nibble; `wh` holds width-1
//! and height-1 the same way. Sub-rectangles reaching past the tile edge
//! are clipped rather than rejected.

use crate::{DecodeState, Decoder, RectData, Rectangle, RfbInStream, ENCODING_HEXTILE};
use anyhow::{anyhow, Context, Result};
use rfb_wire::pixel::Color;
use tokio::io::AsyncRead;

// Tile mask bits
const TILE_RAW: u8 = 1 << 0;
const TILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
const TILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
const TILE_ANY_SUBRECTS: u8 = 1 << 3;
const TILE_SUBRECTS_COLOURED: u8 = 1 << 4;

/// Tile side length; edge tiles use the remaining width/height.
const TILE_SIZE: u16 = 16;

/// Decoded Hextile rectangle: one [`Color`] per pixel, row-major over the
/// whole rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HextilePixels {
    pub colors: Vec<Color>,
}

/// Decoder for Hextile.
pub struct HextileDecoder;

impl Decoder for HextileDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_HEXTILE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        if rect.width == 0 || rect.height == 0 {
            return Ok(RectData::Hextile(HextilePixels { colors: Vec::new() }));
        }

        let bytes_per_pixel = state.bytes_per_pixel();
        if !(1..=4).contains(&bytes_per_pixel) {
            return Err(anyhow!(
                "invalid bytes_per_pixel {} (must be 1-4)",
                bytes_per_pixel
            ));
        }
        let width = rect.width as usize;
        let mut colors = vec![Color::default(); rect.area()];
        let mut pixel = vec![0u8; bytes_per_pixel];

        // Background and foreground persist across tiles within this
        // rectangle until a tile overrides them.
        let mut background: Option<Color> = None;
        let mut foreground: Option<Color> = None;

        let mut ty = 0u16;
        while ty < rect.height {
            let tile_h = TILE_SIZE.min(rect.height - ty);

            let mut tx = 0u16;
            while tx < rect.width {
                let tile_w = TILE_SIZE.min(rect.width - tx);

                let mask = stream.read_u8().await.with_context(|| {
                    format!("failed to read Hextile tile mask at tile ({}, {})", tx, ty)
                })?;

                if mask & TILE_RAW != 0 {
                    // Raw tile: pixel data for the whole tile, other bits
                    // ignored.
                    let total = tile_w as usize * tile_h as usize * bytes_per_pixel;
                    let raw = stream.read_vec(total).await.with_context(|| {
                        format!(
                            "failed to read {} raw bytes for Hextile tile ({}, {})",
                            total, tx, ty
                        )
                    })?;
                    for (i, chunk) in raw.chunks_exact(bytes_per_pixel).enumerate() {
                        let px = tx as usize + i % tile_w as usize;
                        let py = ty as usize + i / tile_w as usize;
                        colors[py * width + px] = state.read_color(chunk)?;
                    }
                    tx += TILE_SIZE;
                    continue;
                }

                if mask & TILE_BACKGROUND_SPECIFIED != 0 {
                    stream.read_bytes(&mut pixel).await.with_context(|| {
                        format!(
                            "failed to read Hextile background at tile ({}, {})",
                            tx, ty
                        )
                    })?;
                    background = Some(state.read_color(&pixel)?);
                }

                let bg = background.ok_or_else(|| {
                    anyhow!(
                        "Hextile tile ({}, {}) needs a background but none was ever specified",
                        tx,
                        ty
                    )
                })?;

                // Fill the tile with the (possibly inherited) background.
                for y in 0..tile_h as usize {
                    let row = (ty as usize + y) * width + tx as usize;
                    colors[row..row + tile_w as usize].fill(bg);
                }

                if mask & TILE_FOREGROUND_SPECIFIED != 0 {
                    stream.read_bytes(&mut pixel).await.with_context(|| {
                        format!(
                            "failed to read Hextile foreground at tile ({}, {})",
                            tx, ty
                        )
                    })?;
                    foreground = Some(state.read_color(&pixel)?);
                }

                if mask & TILE_ANY_SUBRECTS != 0 {
                    let count = stream.read_u8().await.with_context(|| {
                        format!(
                            "failed to read Hextile sub-rect count at tile ({}, {})",
                            tx, ty
                        )
                    })?;
                    let coloured = mask & TILE_SUBRECTS_COLOURED != 0;

                    if count > 0 && !coloured && foreground.is_none() {
                        return Err(anyhow!(
                            "Hextile tile ({}, {}) has monochrome sub-rects but no foreground",
                            tx,
                            ty
                        ));
                    }

                    for i in 0..count {
                        let color = if coloured {
                            stream.read_bytes(&mut pixel).await.with_context(|| {
                                format!(
                                    "failed to read color of Hextile sub-rect {} at tile ({}, {})",
                                    i, tx, ty
                                )
                            })?;
                            state.read_color(&pixel)?
                        } else {
                            foreground.unwrap()
                        };

                        let xy = stream.read_u8().await.with_context(|| {
                            format!(
                                "failed to read geometry of Hextile sub-rect {} at tile ({}, {})",
                                i, tx, ty
                            )
                        })?;
                        let wh = stream.read_u8().await.with_context(|| {
                            format!(
                                "failed to read size of Hextile sub-rect {} at tile ({}, {})",
                                i, tx, ty
                            )
                        })?;

                        let sub_x = (xy >> 4) as usize;
                        let sub_y = (xy & 0x0F) as usize;
                        let sub_w = ((wh >> 4) + 1) as usize;
                        let sub_h = ((wh & 0x0F) + 1) as usize;

                        // Paint, clipping anything past the tile edge.
                        for y in sub_y..(sub_y + sub_h).min(tile_h as usize) {
                            let row = (ty as usize + y) * width + tx as usize;
                            for x in sub_x..(sub_x + sub_w).min(tile_w as usize) {
                                colors[row + x] = color;
                            }
                        }
                    }
                }

                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }

        Ok(RectData::Hextile(HextilePixels { colors }))
    }
}
