//! Client-side engine for the RFB protocol (RFC 6143), the wire protocol
//! underlying VNC.
//!
//! The crate negotiates a session over a transport the caller provides,
//! then runs a reader task that turns the server's message stream into
//! typed [`ServerEvent`]s on a channel: framebuffer updates arrive with
//! their rectangles already decoded into [`rfb_encodings::RectData`]
//! payloads, ready for a renderer.
//!
//! # Example
//!
//! ```no_run
//! use rfb_client::{ClientConfig, ClientConn, ServerEvent};
//!
//! # async fn example() -> Result<(), rfb_client::ClientError> {
//! let socket = tokio::net::TcpStream::connect("localhost:5900")
//!     .await
//!     .map_err(rfb_client::ClientError::Io)?;
//!
//! let (events_tx, events_rx) = flume::bounded(32);
//! let config = ClientConfig {
//!     events: Some(events_tx),
//!     ..ClientConfig::with_password("secret")
//! };
//!
//! let conn = ClientConn::connect(socket, config).await?;
//! conn.request_update().await?;
//!
//! while let Ok(event) = events_rx.recv_async().await {
//!     match event {
//!         ServerEvent::FramebufferUpdate(update) => {
//!             println!("{} rectangles", update.rectangles.len());
//!             conn.request_update().await?;
//!         }
//!         ServerEvent::Disconnected { reason } => {
//!             println!("disconnected: {:?}", reason);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency model
//!
//! One reader task owns the inbound stream; any number of tasks may call
//! the send methods, which serialize on a write lock around whole
//! messages. The event channel applies backpressure - a slow consumer
//! slows the reader, frames are never dropped. [`ClientConn::close`] is
//! idempotent and unblocks the reader at its next suspension point.

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod handshake;
pub mod messages;
pub mod reader;
pub mod transport;

pub use auth::Authenticator;
pub use config::ClientConfig;
pub use connection::{ClientConn, SessionInfo};
pub use errors::ClientError;
pub use handshake::ProtocolVersion;
pub use messages::{
    BodyFuture, CustomMessage, FramebufferUpdate, ServerEvent, ServerMessageReader, SessionInput,
    UpdateRect,
};
pub use transport::{BoxedTransport, TransportStream};

// The decoded-payload types flow through the public API.
pub use rfb_encodings::{DecodeState, RectData};
pub use rfb_wire::pixel::{Color, ColorMap, PixelFormat};
pub use rfb_wire::Rectangle;
