//! Wire-level building blocks for the RFB (Remote Framebuffer) protocol.
//!
//! This crate provides the transport-independent pieces every RFB client
//! needs:
//!
//! - [`io`] - Buffered streams reading/writing primitive types in network
//!   byte order, with byte-counter observers
//! - [`pixel`] - [`PixelFormat`], [`Color`] and [`ColorMap`] handling
//! - [`messages`] - Message framing for both directions of the protocol
//!
//! # Wire Format Rules
//!
//! All messages follow these invariants:
//!
//! 1. **Big-endian byte order** - All multi-byte integers use network byte order
//! 2. **Strict boolean validation** - Boolean fields must be exactly 0 or 1
//! 3. **Padding validation** - Padding bytes must be zero
//! 4. **Fail-fast errors** - Invalid data results in errors, no defensive fallbacks
//!
//! # References
//!
//! - [RFB Protocol (RFC 6143)](https://www.rfc-editor.org/rfc/rfc6143)

pub mod io;
pub mod messages;
pub mod pixel;

// Re-export commonly used types
pub use io::{RfbInStream, RfbOutStream};
pub use messages::types::Rectangle;
pub use pixel::{Color, ColorMap, PixelFormat};
