//! The message reader loop.
//!
//! One task owns the inbound byte stream after the handshake. It reads
//! the one-byte message type, dispatches to the matching parser, and
//! emits every parsed message on the event channel in strict wire order.
//! If the consumer stalls, the reader stalls with it - frames are never
//! dropped or reordered.
//!
//! Termination policy:
//! - cancellation (client called `close()`): clean shutdown
//! - EOF at a message boundary after `close()`: clean shutdown
//! - EOF anywhere else, unknown message type, decode failure, I/O error:
//!   error shutdown, reported through the final `Disconnected` event
//!
//! Either way the terminated flag is set so senders fail fast, and the
//! read half of the transport drops with this task.

use crate::config::ClientConfig;
use crate::connection::SessionInfo;
use crate::errors::ClientError;
use crate::messages::{
    CustomMessage, FramebufferUpdate, ServerEvent, ServerMessageReader, SessionInput, UpdateRect,
};
use rfb_encodings::{DecodeState, DecoderRegistry};
use rfb_wire::messages::server::{Bell, ServerCutText, SetColorMapEntries};
use rfb_wire::messages::types::{
    Rectangle, SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT,
    SERVER_MSG_SET_COLOR_MAP_ENTRIES,
};
use rfb_wire::pixel::PixelFormat;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio_util::sync::CancellationToken;

/// How to parse one server message type.
pub(crate) enum Dispatch {
    FramebufferUpdate,
    SetColorMapEntries,
    Bell,
    ServerCutText,
    Custom(Arc<dyn ServerMessageReader>),
}

/// Build the dispatch map: the four RFC 6143 messages plus any
/// configured extensions. Collisions were rejected by config validation.
pub(crate) fn build_dispatch(config: &ClientConfig) -> HashMap<u8, Dispatch> {
    let mut dispatch = HashMap::new();
    dispatch.insert(SERVER_MSG_FRAMEBUFFER_UPDATE, Dispatch::FramebufferUpdate);
    dispatch.insert(
        SERVER_MSG_SET_COLOR_MAP_ENTRIES,
        Dispatch::SetColorMapEntries,
    );
    dispatch.insert(SERVER_MSG_BELL, Dispatch::Bell);
    dispatch.insert(SERVER_MSG_SERVER_CUT_TEXT, Dispatch::ServerCutText);
    for reader in &config.extra_messages {
        dispatch.insert(reader.message_type(), Dispatch::Custom(reader.clone()));
    }
    dispatch
}

pub(crate) struct ReaderTask {
    pub input: SessionInput,
    pub state: DecodeState,
    pub registry: DecoderRegistry,
    pub dispatch: HashMap<u8, Dispatch>,
    pub events: Option<flume::Sender<ServerEvent>>,
    pub info: Arc<StdMutex<SessionInfo>>,
    pub pending_format: Arc<StdMutex<Option<PixelFormat>>>,
    pub cancel: CancellationToken,
    pub closed: Arc<AtomicBool>,
}

impl ReaderTask {
    pub async fn run(mut self) {
        let outcome = self.run_loop().await;
        self.closed.store(true, Ordering::SeqCst);

        let reason = match outcome {
            Ok(()) => {
                tracing::debug!("reader loop finished cleanly");
                None
            }
            Err(error) => {
                tracing::error!("reader loop terminated: {}", error);
                Some(error.to_string())
            }
        };
        self.emit(ServerEvent::Disconnected { reason }).await;
    }

    async fn run_loop(&mut self) -> Result<(), ClientError> {
        loop {
            // A pixel-format change from the send path takes effect here,
            // between messages, never inside one.
            if let Some(pixel_format) = self.pending_format.lock().unwrap().take() {
                tracing::debug!("switching decode pixel format");
                self.state.set_pixel_format(pixel_format);
            }

            let message_type = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = self.input.read_u8() => match result {
                    Ok(message_type) => message_type,
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        if self.closed.load(Ordering::SeqCst) {
                            // Clean shutdown already under way.
                            return Ok(());
                        }
                        return Err(ClientError::Protocol(
                            "server closed the connection".to_string(),
                        ));
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            let dispatch = self.dispatch.get(&message_type).ok_or_else(|| {
                ClientError::Protocol(format!("unknown server message type {}", message_type))
            })?;

            let event = match dispatch {
                Dispatch::FramebufferUpdate => {
                    let update = read_framebuffer_update(
                        &mut self.input,
                        &mut self.state,
                        &self.registry,
                    )
                    .await?;
                    // Publish any DesktopSize resize to the handle.
                    let (width, height) = self.state.framebuffer_size();
                    {
                        let mut info = self.info.lock().unwrap();
                        info.framebuffer_width = width;
                        info.framebuffer_height = height;
                    }
                    ServerEvent::FramebufferUpdate(update)
                }
                Dispatch::SetColorMapEntries => {
                    let entries = SetColorMapEntries::read_from(&mut self.input).await?;
                    self.state
                        .install_color_map(entries.first_color, &entries.colors);
                    ServerEvent::SetColorMapEntries(entries)
                }
                Dispatch::Bell => {
                    Bell::read_from(&mut self.input).await?;
                    ServerEvent::Bell
                }
                Dispatch::ServerCutText => {
                    let cut_text = ServerCutText::read_from(&mut self.input).await?;
                    ServerEvent::ServerCutText(cut_text)
                }
                Dispatch::Custom(reader) => {
                    tracing::debug!("dispatching custom message '{}'", reader.name());
                    let payload = reader.read_body(&mut self.input).await?;
                    ServerEvent::Custom(CustomMessage {
                        message_type,
                        payload,
                    })
                }
            };

            self.emit(event).await;
        }
    }

    /// Deliver an event, blocking while the consumer is behind. A dropped
    /// receiver means "discard", same as no channel at all.
    async fn emit(&self, event: ServerEvent) {
        if let Some(events) = &self.events {
            if events.send_async(event).await.is_err() {
                tracing::debug!("event channel receiver dropped; discarding");
            }
        }
    }
}

/// Parse a FramebufferUpdate body: padding, rectangle count, then each
/// rectangle's geometry, encoding type and encoding-specific payload.
async fn read_framebuffer_update(
    input: &mut SessionInput,
    state: &mut DecodeState,
    registry: &DecoderRegistry,
) -> Result<FramebufferUpdate, ClientError> {
    input.skip(1).await?; // padding
    let count = input.read_u16().await?;

    let mut rectangles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let rect = Rectangle::read_from(input).await?;
        let encoding = input.read_i32().await?;

        let decoder = registry
            .get(encoding)
            .ok_or(ClientError::UnsupportedEncoding(encoding))?;
        let data = decoder.decode(input, &rect, state).await?;

        rectangles.push(UpdateRect {
            rect,
            encoding,
            data,
        });
    }

    Ok(FramebufferUpdate { rectangles })
}
