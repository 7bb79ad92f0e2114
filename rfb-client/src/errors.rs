//! Error types for the RFB client.

use std::io;
use thiserror::Error;

/// Errors that can occur while connecting to or talking with a VNC server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level I/O error (short read/write, stream closed).
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The RFB handshake failed (bad version string, no acceptable
    /// security type, malformed init messages).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server rejected our credentials, or the security dialogue
    /// failed part-way.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Wire format violation outside the handshake: unknown message type,
    /// length mismatch, invalid field value.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A rectangle decoder rejected its input.
    #[error("decode error: {0}")]
    Decode(#[from] anyhow::Error),

    /// The server used an encoding no decoder is registered for.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(i32),

    /// Invalid configuration, detected before any bytes flow.
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ClientError::AuthFailed("bad password".to_string());
        assert_eq!(err.to_string(), "authentication failed: bad password");

        let err = ClientError::UnsupportedEncoding(999);
        assert_eq!(err.to_string(), "unsupported encoding: 999");
    }

    #[test]
    fn io_error_converts() {
        let err: ClientError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
