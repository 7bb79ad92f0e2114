//! Authenticators for the RFB security handshake.
//!
//! Each authenticator performs the security dialogue for one security
//! type once the handshake has selected it:
//!
//! - **None** (type 1): no bytes exchanged.
//! - **VNC authentication** (type 2): DES challenge-response. The server
//!   sends 16 random bytes; the client encrypts both 8-byte halves in ECB
//!   mode with a key built from the password. The key is the password's
//!   ASCII bytes, NUL-padded or truncated to 8, **with the bits of every
//!   byte reversed** - the classical VNC quirk, kept by every server since
//!   the original implementation.
//! - **VeNCrypt** (type 19): a version/subtype negotiation wrapper that
//!   delegates to an inner authenticator once a subtype is agreed.

use crate::errors::ClientError;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rfb_wire::io::{RfbInStream, RfbOutStream};
use rfb_wire::messages::types::{SECURITY_NONE, SECURITY_VENCRYPT, SECURITY_VNC_AUTH};
use tokio::io::{AsyncRead, AsyncWrite};

/// A configured security-type handler.
#[derive(Clone)]
pub enum Authenticator {
    /// Security type 1: no authentication.
    None,
    /// Security type 2: DES challenge-response with a pre-shared password.
    VncAuth { password: String },
    /// Security type 19: VeNCrypt wrapper delegating to `inner`.
    VeNCrypt { inner: Box<Authenticator> },
}

impl Authenticator {
    /// VNC authentication with the given password.
    pub fn vnc_auth(password: impl Into<String>) -> Self {
        Self::VncAuth {
            password: password.into(),
        }
    }

    /// VeNCrypt wrapping the given inner authenticator.
    pub fn vencrypt(inner: Authenticator) -> Self {
        Self::VeNCrypt {
            inner: Box::new(inner),
        }
    }

    /// The security-type byte this authenticator handles.
    pub fn security_type(&self) -> u8 {
        match self {
            Self::None => SECURITY_NONE,
            Self::VncAuth { .. } => SECURITY_VNC_AUTH,
            Self::VeNCrypt { .. } => SECURITY_VENCRYPT,
        }
    }

    /// Run this authenticator's security dialogue.
    pub(crate) async fn authenticate<R, W>(
        &self,
        input: &mut RfbInStream<R>,
        output: &mut RfbOutStream<W>,
    ) -> Result<(), ClientError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self {
            Self::None => Ok(()),

            Self::VncAuth { password } => {
                let mut challenge = [0u8; 16];
                input.read_bytes(&mut challenge).await?;

                let response = vnc_challenge_response(password, &challenge);
                output.write_bytes(&response);
                output.flush().await?;
                Ok(())
            }

            Self::VeNCrypt { inner } => {
                let major = input.read_u8().await?;
                let minor = input.read_u8().await?;
                if (major, minor) < (0, 2) {
                    return Err(ClientError::Handshake(format!(
                        "server VeNCrypt version {}.{} is too old (need 0.2)",
                        major, minor
                    )));
                }

                output.write_u8(0);
                output.write_u8(2);
                output.flush().await?;

                let ack = input.read_u8().await?;
                if ack != 0 {
                    return Err(ClientError::AuthFailed(
                        "server rejected VeNCrypt version 0.2".to_string(),
                    ));
                }

                let count = input.read_u8().await? as usize;
                if count == 0 {
                    return Err(ClientError::Handshake(
                        "server offered no VeNCrypt subtypes".to_string(),
                    ));
                }
                let mut subtypes = Vec::with_capacity(count);
                for _ in 0..count {
                    subtypes.push(input.read_u32().await?);
                }

                let wanted = inner.security_type() as u32;
                if !subtypes.contains(&wanted) {
                    return Err(ClientError::Handshake(format!(
                        "server VeNCrypt subtypes {:?} do not include {}",
                        subtypes, wanted
                    )));
                }
                output.write_u32(wanted);
                output.flush().await?;

                // Boxed to keep the recursive future finite.
                Box::pin(inner.authenticate(input, output)).await
            }
        }
    }
}

/// Compute the VNC authentication response: both halves of the 16-byte
/// challenge DES-encrypted in ECB mode under the password-derived key.
fn vnc_challenge_response(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    // 8-byte key: ASCII password NUL-padded/truncated, bits of each byte
    // reversed.
    let mut key = [0u8; 8];
    for (slot, byte) in key.iter_mut().zip(password.bytes()) {
        *slot = byte.reverse_bits();
    }

    let cipher = Des::new_from_slice(&key).expect("8-byte key");

    let mut response = [0u8; 16];
    for (half, chunk) in response.chunks_exact_mut(8).zip(challenge.chunks_exact(8)) {
        let block: [u8; 8] = chunk.try_into().expect("8-byte block");
        let mut block = block.into();
        cipher.encrypt_block(&mut block);
        half.copy_from_slice(&block);
    }
    response
}
