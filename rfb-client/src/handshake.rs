//! The RFB connection handshake.
//!
//! A linear state machine over the freshly connected transport
//! (RFC 6143 §7.1-§7.3). Any failure terminates the connection with a
//! descriptive error; there are no fallbacks.
//!
//! 1. **Protocol version** - read the server's 12-byte version string,
//!    pick the highest version this client supports that does not exceed
//!    it (optionally capped by configuration), and write the choice back.
//! 2. **Security** - version-dependent: 3.3 servers dictate a single
//!    type; 3.7/3.8 servers offer a list the client picks from.
//! 3. **Authentication** - run the selected [`Authenticator`]'s dialogue.
//! 4. **Security result** - read the u32 status (always on 3.8, and on
//!    older versions whenever the type was not None).
//! 5. **Init** - exchange ClientInit/ServerInit.
//! 6. **Initial settings** - send SetEncodings and SetPixelFormat so the
//!    server starts talking our preferred formats.

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use rfb_wire::io::{RfbInStream, RfbOutStream};
use rfb_wire::messages::client::{ClientInit, SetEncodings, SetPixelFormat};
use rfb_wire::messages::server::ServerInit;
use rfb_wire::messages::types::{SECURITY_NONE, SECURITY_VNC_AUTH};
use rfb_wire::pixel::PixelFormat;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Protocol versions this client speaks, oldest first so `Ord` gives
/// "newer version" a meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    /// The exact 12 bytes of this version's wire string.
    pub fn wire_bytes(&self) -> &'static [u8; 12] {
        match self {
            Self::V3_3 => b"RFB 003.003\n",
            Self::V3_7 => b"RFB 003.007\n",
            Self::V3_8 => b"RFB 003.008\n",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3_3 => write!(f, "3.3"),
            Self::V3_7 => write!(f, "3.7"),
            Self::V3_8 => write!(f, "3.8"),
        }
    }
}

/// What the handshake established.
pub(crate) struct Handshake {
    pub version: ProtocolVersion,
    pub security_type: u8,
    pub server_init: ServerInit,
}

/// Run the whole handshake on a fresh connection.
pub(crate) async fn perform<R, W>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    config: &ClientConfig,
) -> Result<Handshake, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let version = negotiate_version(input, output, config.max_proto_version).await?;
    tracing::debug!("negotiated RFB {}", version);

    let authenticator = negotiate_security(input, output, version, config).await?;
    let security_type = authenticator.security_type();
    tracing::debug!("selected security type {}", security_type);

    authenticator.authenticate(input, output).await?;
    read_security_result(input, version, security_type).await?;

    ClientInit {
        shared: !config.exclusive,
    }
    .write_to(output);
    output.flush().await?;

    let server_init = ServerInit::read_from(input).await?;
    tracing::info!(
        "connected to \"{}\" ({}x{})",
        server_init.name,
        server_init.framebuffer_width,
        server_init.framebuffer_height
    );

    // Initial client settings: encoding preferences, then our pixel
    // format. The server answers every later update in this format.
    SetEncodings {
        encodings: config.encodings.clone(),
    }
    .write_to(output);
    SetPixelFormat {
        pixel_format: PixelFormat::rgb32(),
    }
    .write_to(output)?;
    output.flush().await?;

    Ok(Handshake {
        version,
        security_type,
        server_init,
    })
}

/// Phase 1: version exchange.
async fn negotiate_version<R, W>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    cap: Option<ProtocolVersion>,
) -> Result<ProtocolVersion, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut version_buf = [0u8; 12];
    input.read_bytes(&mut version_buf).await?;

    let (major, minor) = parse_version(&version_buf)?;

    let mut version = match (major, minor) {
        (3, 3..=6) => ProtocolVersion::V3_3,
        (3, 7) => ProtocolVersion::V3_7,
        _ if major > 3 || (major == 3 && minor >= 8) => ProtocolVersion::V3_8,
        _ => {
            return Err(ClientError::Handshake(format!(
                "unsupported RFB version {}.{} (need at least 3.3)",
                major, minor
            )))
        }
    };
    if let Some(cap) = cap {
        version = version.min(cap);
    }

    output.write_bytes(version.wire_bytes());
    output.flush().await?;
    Ok(version)
}

/// Parse `"RFB xxx.yyy\n"` into major/minor numbers.
fn parse_version(buf: &[u8; 12]) -> Result<(u32, u32), ClientError> {
    if &buf[0..4] != b"RFB " || buf[7] != b'.' || buf[11] != b'\n' {
        return Err(ClientError::Handshake(format!(
            "malformed version string {:?}",
            String::from_utf8_lossy(buf)
        )));
    }

    let digits = |bytes: &[u8]| -> Result<u32, ClientError> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ClientError::Handshake(format!(
                    "non-numeric version field {:?}",
                    String::from_utf8_lossy(bytes)
                ))
            })
    };

    Ok((digits(&buf[4..7])?, digits(&buf[8..11])?))
}

/// Phase 2: pick a security type both sides can do.
async fn negotiate_security<'a, R, W>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    version: ProtocolVersion,
    config: &'a ClientConfig,
) -> Result<&'a Authenticator, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match version {
        ProtocolVersion::V3_3 => {
            // The server dictates; only None and VNC auth exist in 3.3.
            let security_type = input.read_u32().await?;
            if security_type == 0 {
                let reason = read_reason(input).await?;
                return Err(ClientError::Handshake(format!(
                    "server refused the connection: {}",
                    reason
                )));
            }
            let security_type = u8::try_from(security_type).map_err(|_| {
                ClientError::Handshake(format!("invalid RFB 3.3 security type {}", security_type))
            })?;
            if security_type != SECURITY_NONE && security_type != SECURITY_VNC_AUTH {
                return Err(ClientError::Handshake(format!(
                    "RFB 3.3 security type {} is not acceptable (only None and VNC auth)",
                    security_type
                )));
            }
            find_authenticator(config, security_type)
        }

        ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => {
            let count = input.read_u8().await? as usize;
            if count == 0 {
                let reason = read_reason(input).await?;
                return Err(ClientError::Handshake(format!(
                    "server offered no security types: {}",
                    reason
                )));
            }

            let offered = input.read_vec(count).await?;
            // First offered type we have a handler for wins.
            let authenticator = offered
                .iter()
                .find_map(|&t| find_authenticator(config, t).ok())
                .ok_or_else(|| {
                    ClientError::Handshake(format!(
                        "no configured authenticator matches the server's offer {:?}",
                        offered
                    ))
                })?;

            output.write_u8(authenticator.security_type());
            output.flush().await?;
            Ok(authenticator)
        }
    }
}

fn find_authenticator(
    config: &ClientConfig,
    security_type: u8,
) -> Result<&Authenticator, ClientError> {
    config
        .authenticators
        .iter()
        .find(|a| a.security_type() == security_type)
        .ok_or_else(|| {
            ClientError::Handshake(format!(
                "server requires security type {} but no authenticator is configured for it",
                security_type
            ))
        })
}

/// Phase 4: the u32 security result. 3.8 sends it always; 3.3 and 3.7
/// only after an actual authentication.
async fn read_security_result<R>(
    input: &mut RfbInStream<R>,
    version: ProtocolVersion,
    security_type: u8,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    if version != ProtocolVersion::V3_8 && security_type == SECURITY_NONE {
        return Ok(());
    }

    let status = input.read_u32().await?;
    if status == 0 {
        return Ok(());
    }

    // 3.8 attaches a reason string to failures; older versions just
    // close.
    let reason = if version == ProtocolVersion::V3_8 {
        read_reason(input).await?
    } else {
        "server rejected authentication".to_string()
    };
    Err(ClientError::AuthFailed(reason))
}

/// Read a length-prefixed UTF-8 failure reason.
async fn read_reason<R: AsyncRead + Unpin>(
    input: &mut RfbInStream<R>,
) -> Result<String, ClientError> {
    let length = input.read_u32().await? as usize;
    let bytes = input.read_vec(length).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
