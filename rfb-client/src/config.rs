//! Client configuration.

use crate::auth::Authenticator;
use crate::errors::ClientError;
use crate::handshake::ProtocolVersion;
use crate::messages::{ServerEvent, ServerMessageReader};
use rfb_wire::messages::types::{
    ENCODING_COPY_RECT, ENCODING_HEXTILE, ENCODING_PSEUDO_CURSOR, ENCODING_PSEUDO_DESKTOP_SIZE,
    ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZRLE,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Configuration for a [`ClientConn`](crate::ClientConn).
///
/// Validated eagerly by [`validate`](Self::validate) before any bytes flow;
/// a bad configuration never opens a dialogue with the server.
#[derive(Clone)]
pub struct ClientConfig {
    /// Candidate security handlers, in preference order. The handshake
    /// picks the first offered type that has a handler here.
    pub authenticators: Vec<Authenticator>,

    /// Request exclusive access: send `shared = 0` in ClientInit, asking
    /// the server to disconnect other clients.
    pub exclusive: bool,

    /// Encoding preference list for SetEncodings, most preferred first.
    pub encodings: Vec<i32>,

    /// Channel the reader loop delivers [`ServerEvent`]s on. `None`
    /// discards all events; a bounded channel applies backpressure to the
    /// reader (frames are never dropped).
    pub events: Option<flume::Sender<ServerEvent>>,

    /// Decoders for server message types beyond the four RFC 6143 ones.
    pub extra_messages: Vec<Arc<dyn ServerMessageReader>>,

    /// Cap the negotiated protocol version. Only 3.3 and 3.8 are
    /// meaningful caps.
    pub max_proto_version: Option<ProtocolVersion>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authenticators: vec![Authenticator::None],
            exclusive: false,
            encodings: default_encodings(),
            events: None,
            extra_messages: Vec::new(),
            max_proto_version: None,
        }
    }
}

fn default_encodings() -> Vec<i32> {
    vec![
        ENCODING_TIGHT,
        ENCODING_ZRLE,
        ENCODING_HEXTILE,
        ENCODING_RRE,
        ENCODING_COPY_RECT,
        ENCODING_RAW,
        ENCODING_PSEUDO_CURSOR,
        ENCODING_PSEUDO_DESKTOP_SIZE,
    ]
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration prepared for password-protected servers: tries
    /// None, plain VNC authentication, and VNC authentication inside a
    /// VeNCrypt wrapper, in that order.
    pub fn with_password(password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            authenticators: vec![
                Authenticator::None,
                Authenticator::vnc_auth(password.clone()),
                Authenticator::vencrypt(Authenticator::vnc_auth(password)),
            ],
            ..Self::default()
        }
    }

    /// Check the configuration before any I/O happens.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.authenticators.is_empty() {
            return Err(ClientError::Config(
                "at least one authenticator is required".to_string(),
            ));
        }
        if self.encodings.is_empty() {
            return Err(ClientError::Config(
                "at least one encoding is required".to_string(),
            ));
        }
        if self.max_proto_version == Some(ProtocolVersion::V3_7) {
            return Err(ClientError::Config(
                "max_proto_version must be 3.3 or 3.8".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for reader in &self.extra_messages {
            let message_type = reader.message_type();
            if message_type <= 3 {
                return Err(ClientError::Config(format!(
                    "extra message decoder '{}' claims reserved type {}",
                    reader.name(),
                    message_type
                )));
            }
            if !seen.insert(message_type) {
                return Err(ClientError::Config(format!(
                    "duplicate extra message decoder for type {}",
                    message_type
                )));
            }
        }
        Ok(())
    }
}
