//! RFB protocol message framing.
//!
//! - [`types`] - `Rectangle` plus the protocol's encoding, security and
//!   message-type constants
//! - [`client`] - Client-to-server messages (each a single buffered write)
//! - [`server`] - Server-to-client messages that parse without decoder
//!   support (`ServerInit`, `SetColorMapEntries`, `Bell`, `ServerCutText`)
//!
//! `FramebufferUpdate` bodies are deliberately absent: their rectangles
//! carry encoding-specific payloads and persistent decompression state, so
//! they are parsed by the decoding layer, not here.

pub mod client;
pub mod server;
pub mod types;

pub use client::{
    ClientCutText, ClientInit, FramebufferUpdateRequest, KeyEvent, PointerEvent, SetEncodings,
    SetPixelFormat,
};
pub use server::{Bell, ServerCutText, ServerInit, SetColorMapEntries};
pub use types::Rectangle;
