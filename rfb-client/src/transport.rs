//! Transport seam.
//!
//! The client does not establish connections: the caller hands in any
//! already-connected bidirectional byte stream - a TCP socket, a Unix
//! socket, a TLS session, an in-memory duplex in tests. The stream is
//! boxed so the reader loop and custom message decoders work against one
//! concrete type.

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// Anything that can carry an RFB session.
pub trait TransportStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> TransportStream for T {}

/// The type-erased transport the connection is built on.
pub type BoxedTransport = Box<dyn TransportStream>;

/// The reader half owned exclusively by the reader task.
pub type TransportReader = ReadHalf<BoxedTransport>;

/// The writer half, serialized behind the connection's write lock.
pub type TransportWriter = WriteHalf<BoxedTransport>;
