//! Rectangle decoders for the RFB (VNC) encoding family.
//!
//! A [`Decoder`] reads one framebuffer-update rectangle from the network
//! stream - consuming exactly the bytes its encoding prescribes - and
//! produces a typed [`RectData`] payload for a downstream renderer. Decoders
//! never paint: payloads are plain data, and the single dynamic decision
//! (which decoder handles an encoding type) is made once per rectangle by
//! the [`DecoderRegistry`].
//!
//! # Key Concepts
//!
//! - **Async decoding**: decoders read from a tokio [`AsyncRead`]-backed
//!   [`RfbInStream`]
//! - **Typed payloads**: each encoding yields its own [`RectData`] variant
//! - **Shared state**: [`DecodeState`] carries the negotiated pixel format,
//!   color map and framebuffer dimensions; pseudo-encodings mutate it
//! - **Persistent compression**: Tight's four zlib streams and ZRLE's single
//!   stream live inside their decoders and keep their dictionaries across
//!   rectangles until the server resets them
//! - **Fail-fast**: malformed input is an error; partial rectangles are
//!   never surfaced
//!
//! # Encoding Types
//!
//! - [`ENCODING_RAW`] (0): uncompressed pixels
//! - [`ENCODING_COPY_RECT`] (1): copy from another framebuffer region
//! - [`ENCODING_RRE`] (2): background fill plus colored sub-rectangles
//! - [`ENCODING_HEXTILE`] (5): 16x16 tiles with per-tile sub-encodings
//! - [`ENCODING_TIGHT`] (7): filtered, zlib-compressed pixel data
//! - [`ENCODING_ZRLE`] (16): one persistent zlib stream of 64x64 tiles
//! - [`ENCODING_PSEUDO_CURSOR`] (-239): cursor shape update
//! - [`ENCODING_PSEUDO_DESKTOP_SIZE`] (-223): framebuffer resize

use anyhow::Result;
use tokio::io::AsyncRead;

// Re-export the wire types decoders are written against.
pub use rfb_wire::io::RfbInStream;
pub use rfb_wire::messages::types::{
    Rectangle, ENCODING_COPY_RECT, ENCODING_HEXTILE, ENCODING_PSEUDO_CURSOR,
    ENCODING_PSEUDO_DESKTOP_SIZE, ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZRLE,
};
pub use rfb_wire::pixel::{Color, ColorMap, PixelFormat};

pub mod state;
pub use state::DecodeState;

mod zlib;

pub mod raw;
pub use raw::{RawDecoder, RawPixels};

pub mod copyrect;
pub use copyrect::{CopyRect, CopyRectDecoder};

pub mod rre;
pub use rre::{RreDecoder, RreRect, RreSubRect};

pub mod hextile;
pub use hextile::{HextileDecoder, HextilePixels};

pub mod zrle;
pub use zrle::{ZrleData, ZrleDecoder};

pub mod tight;
pub use tight::{TightDecoder, TightPixels};

pub mod pseudo;
pub use pseudo::{CursorDecoder, CursorShape, DesktopSizeDecoder};

pub mod registry;
pub use registry::DecoderRegistry;

/// Decoded payload of a single framebuffer-update rectangle.
///
/// Payloads are data: the renderer applies them. `CopyRect` carries no
/// pixels at all, and the pseudo-encodings exist mainly for their side
/// effects on [`DecodeState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RectData {
    Raw(RawPixels),
    CopyRect(CopyRect),
    Rre(RreRect),
    Hextile(HextilePixels),
    Zrle(ZrleData),
    Tight(TightPixels),
    Cursor(CursorShape),
    DesktopSize,
}

/// Core trait for rectangle decoders.
///
/// # Contract
///
/// Implementors must:
/// - Read exactly the bytes for the rectangle as defined by their encoding
/// - Convert pixels through the state's pixel format (and color map when
///   the format is not true-color)
/// - Fail fast with clear error messages, leaving no partial payloads
#[allow(async_fn_in_trait)]
pub trait Decoder {
    /// The RFB encoding type this decoder handles (an `ENCODING_*` value).
    fn encoding_type(&self) -> i32;

    /// Decode a single rectangle from the input stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the input bytes are malformed or truncated, if
    /// pixel conversion fails, or if the encoding-specific data is invalid.
    async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData>;
}
