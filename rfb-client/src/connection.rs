//! The client connection handle.
//!
//! [`ClientConn::connect`] runs the handshake on the calling task, then
//! spawns the reader task that owns the inbound half of the transport for
//! the rest of the session. The handle left behind is the send path:
//! every client-to-server message takes the write lock, buffers its whole
//! wire image and flushes it as one write, so concurrent senders can
//! never interleave partial messages.

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::handshake::{self, ProtocolVersion};
use crate::reader::{build_dispatch, ReaderTask};
use crate::transport::{BoxedTransport, TransportWriter};
use rfb_encodings::{DecodeState, DecoderRegistry};
use rfb_wire::io::{RfbInStream, RfbOutStream};
use rfb_wire::messages::client::{
    ClientCutText, FramebufferUpdateRequest, KeyEvent, PointerEvent, SetEncodings, SetPixelFormat,
};
use rfb_wire::pixel::PixelFormat;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Snapshot of the session parameters the reader keeps current.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub desktop_name: String,
    pub pixel_format: PixelFormat,
}

type SessionOutput = RfbOutStream<TransportWriter>;

/// A live connection to a VNC server.
///
/// Cheap accessors read a snapshot the reader task keeps current; send
/// methods serialize on an internal write lock. Wrap the connection in an
/// `Arc` to drive it from several tasks.
pub struct ClientConn {
    writer: AsyncMutex<SessionOutput>,
    info: Arc<StdMutex<SessionInfo>>,
    pending_format: Arc<StdMutex<Option<PixelFormat>>>,
    bytes_received: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    reader: StdMutex<Option<JoinHandle<()>>>,
    version: ProtocolVersion,
}

impl ClientConn {
    /// Negotiate a session over an already-connected transport.
    ///
    /// Runs the full handshake (version, security, authentication, init,
    /// initial settings) before returning; on any failure the transport
    /// is dropped and the error propagated - the process is never exited
    /// on the library's behalf. On success the reader task is running and
    /// events begin to flow on the configured channel.
    pub async fn connect<T>(transport: T, config: ClientConfig) -> Result<Self, ClientError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        config.validate()?;
        let dispatch = build_dispatch(&config);

        let transport: BoxedTransport = Box::new(transport);
        let (read_half, write_half) = tokio::io::split(transport);

        let bytes_received = Arc::new(AtomicU64::new(0));
        let bytes_sent = Arc::new(AtomicU64::new(0));
        let mut input = RfbInStream::with_counter(read_half, bytes_received.clone());
        let mut output = RfbOutStream::with_counter(write_half, bytes_sent.clone());

        let handshake = handshake::perform(&mut input, &mut output, &config).await?;
        let init = &handshake.server_init;

        // Decoders interpret pixels in the format we just requested via
        // SetPixelFormat; the server honors it from the first update.
        let state = DecodeState::new(
            PixelFormat::rgb32(),
            init.framebuffer_width,
            init.framebuffer_height,
        );
        let info = Arc::new(StdMutex::new(SessionInfo {
            framebuffer_width: init.framebuffer_width,
            framebuffer_height: init.framebuffer_height,
            desktop_name: init.name.clone(),
            pixel_format: PixelFormat::rgb32(),
        }));

        let pending_format = Arc::new(StdMutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let reader = ReaderTask {
            input,
            state,
            registry: DecoderRegistry::with_standard(),
            dispatch,
            events: config.events.clone(),
            info: info.clone(),
            pending_format: pending_format.clone(),
            cancel: cancel.clone(),
            closed: closed.clone(),
        };
        let handle = tokio::spawn(reader.run());

        Ok(Self {
            writer: AsyncMutex::new(output),
            info,
            pending_format,
            bytes_received,
            bytes_sent,
            closed,
            cancel,
            reader: StdMutex::new(Some(handle)),
            version: handshake.version,
        })
    }

    /// The protocol version negotiated at handshake time.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Current framebuffer dimensions (tracks DesktopSize changes).
    pub fn framebuffer_size(&self) -> (u16, u16) {
        let info = self.info.lock().unwrap();
        (info.framebuffer_width, info.framebuffer_height)
    }

    /// The desktop name from ServerInit.
    pub fn desktop_name(&self) -> String {
        self.info.lock().unwrap().desktop_name.clone()
    }

    /// The pixel format updates are decoded with.
    pub fn pixel_format(&self) -> PixelFormat {
        self.info.lock().unwrap().pixel_format
    }

    /// Total bytes read from the transport so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Total bytes written to the transport so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Whether the connection has terminated (close() called, or the
    /// reader hit EOF / an error).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        write: impl FnOnce(&mut SessionOutput) -> std::io::Result<()>,
    ) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let mut writer = self.writer.lock().await;
        write(&mut writer)?;
        writer.flush().await?;
        Ok(())
    }

    /// Send SetEncodings with a new preference list.
    pub async fn set_encodings(&self, encodings: Vec<i32>) -> Result<(), ClientError> {
        self.send(|out| {
            SetEncodings { encodings }.write_to(out);
            Ok(())
        })
        .await
    }

    /// Send SetPixelFormat. The reader switches its interpretation at the
    /// next message boundary, so no in-flight rectangle straddles the
    /// change; any installed color map is invalidated with it.
    pub async fn set_pixel_format(&self, pixel_format: PixelFormat) -> Result<(), ClientError> {
        self.send(|out| SetPixelFormat { pixel_format }.write_to(out))
            .await?;
        *self.pending_format.lock().unwrap() = Some(pixel_format);
        self.info.lock().unwrap().pixel_format = pixel_format;
        Ok(())
    }

    /// Request a framebuffer update for a region.
    pub async fn framebuffer_update_request(
        &self,
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), ClientError> {
        self.send(|out| {
            FramebufferUpdateRequest {
                incremental,
                x,
                y,
                width,
                height,
            }
            .write_to(out);
            Ok(())
        })
        .await
    }

    /// Request an incremental update of the whole framebuffer.
    pub async fn request_update(&self) -> Result<(), ClientError> {
        let (width, height) = self.framebuffer_size();
        self.framebuffer_update_request(true, 0, 0, width, height)
            .await
    }

    /// Send a key press or release.
    pub async fn key_event(&self, down: bool, keysym: u32) -> Result<(), ClientError> {
        self.send(|out| {
            KeyEvent { down, keysym }.write_to(out);
            Ok(())
        })
        .await
    }

    /// Send pointer position and button state.
    pub async fn pointer_event(
        &self,
        button_mask: u8,
        x: u16,
        y: u16,
    ) -> Result<(), ClientError> {
        self.send(|out| {
            PointerEvent { button_mask, x, y }.write_to(out);
            Ok(())
        })
        .await
    }

    /// Send clipboard text to the server.
    pub async fn cut_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let text = text.into();
        self.send(|out| {
            ClientCutText { text }.write_to(out);
            Ok(())
        })
        .await
    }

    /// Close the connection.
    ///
    /// Idempotent and race-safe: the first call wins, later calls are
    /// no-ops. Sets the terminated flag (failing all further sends),
    /// cancels the reader at its next suspension point, and lets the
    /// transport drop with the reader. A `Disconnected { reason: None }`
    /// event marks the clean shutdown.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("closing client connection");
            self.cancel.cancel();
        }
    }

    /// Wait for the reader task to finish. Returns immediately if it
    /// already has (or was already awaited).
    pub async fn join(&self) {
        let handle = self.reader.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for ClientConn {
    fn drop(&mut self) {
        self.close();
    }
}
