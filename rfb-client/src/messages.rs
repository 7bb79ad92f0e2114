//! Events delivered to the consumer, and the extension seam for
//! non-standard server messages.

use crate::transport::TransportReader;
use rfb_encodings::RectData;
use rfb_wire::io::RfbInStream;
use rfb_wire::messages::server::{ServerCutText, SetColorMapEntries};
use rfb_wire::messages::types::Rectangle;
use std::future::Future;
use std::pin::Pin;

/// The input stream as seen by the reader loop and by custom message
/// decoders.
pub type SessionInput = RfbInStream<TransportReader>;

/// One decoded rectangle of a framebuffer update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRect {
    pub rect: Rectangle,
    pub encoding: i32,
    pub data: RectData,
}

/// A fully decoded FramebufferUpdate: rectangles in server order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferUpdate {
    pub rectangles: Vec<UpdateRect>,
}

/// Body of a server message parsed by a [`ServerMessageReader`]
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMessage {
    pub message_type: u8,
    pub payload: Vec<u8>,
}

/// A parsed server-to-client message, emitted on the consumer channel in
/// strict wire order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A framebuffer update with its decoded rectangles.
    FramebufferUpdate(FramebufferUpdate),
    /// New color map entries (indexed pixel formats).
    SetColorMapEntries(SetColorMapEntries),
    /// Ring the bell.
    Bell,
    /// Clipboard text from the server.
    ServerCutText(ServerCutText),
    /// A message parsed by a configured [`ServerMessageReader`].
    Custom(CustomMessage),
    /// The reader loop terminated. `reason` is `None` for a clean,
    /// client-initiated shutdown. Emitted exactly once, last.
    Disconnected { reason: Option<String> },
}

/// Decoder for a server message type beyond the four RFC 6143 ones.
///
/// The reader loop consumes the one-byte type discriminant, then hands the
/// stream to `read_body`, which must consume exactly the message's body
/// and return it. The bytes are delivered as a [`CustomMessage`] event;
/// interpreting them is the consumer's business.
///
/// The future is boxed because trait objects cannot carry `async fn`;
/// implementations just wrap an async block:
///
/// ```ignore
/// fn read_body<'a>(&'a self, stream: &'a mut SessionInput) -> BodyFuture<'a> {
///     Box::pin(async move {
///         let len = stream.read_u8().await? as usize;
///         stream.read_vec(len).await
///     })
/// }
/// ```
pub trait ServerMessageReader: Send + Sync {
    /// The message-type byte this decoder handles. Must not collide with
    /// the RFC types 0-3.
    fn message_type(&self) -> u8;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Parse the message body (the type byte is already consumed).
    fn read_body<'a>(&'a self, stream: &'a mut SessionInput) -> BodyFuture<'a>;
}

/// Boxed future returned by [`ServerMessageReader::read_body`].
pub type BodyFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<Vec<u8>>> + Send + 'a>>;
