//! Buffered I/O streams for RFB protocol communication.
//!
//! [`RfbInStream`] and [`RfbOutStream`] wrap an async reader/writer with an
//! internal buffer and type-safe accessors for the primitive types the RFB
//! protocol uses (all big-endian). Both can carry a shared byte counter that
//! advances by the number of bytes actually moved on the transport, so a
//! connection can expose `bytes-received` / `bytes-sent` gauges without the
//! streams knowing who is watching.
//!
//! The input stream also understands Tight's *compact length*: a 1-3 byte
//! variable-length unsigned integer carrying 7 data bits per byte
//! (least-significant group first, high bit = continuation, 21 bits max).
//!
//! # Examples
//!
//! ```no_run
//! use rfb_wire::io::{RfbInStream, RfbOutStream};
//!
//! # async fn example<R, W>(reader: R, writer: W) -> std::io::Result<()>
//! # where R: tokio::io::AsyncRead + Unpin, W: tokio::io::AsyncWrite + Unpin {
//! let mut input = RfbInStream::new(reader);
//! let message_type = input.read_u8().await?;
//! let width = input.read_u16().await?;
//!
//! let mut output = RfbOutStream::new(writer);
//! output.write_u8(3); // FramebufferUpdateRequest
//! output.write_u16(width);
//! output.flush().await?;
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest value representable by a Tight compact length (3 bytes x 7 bits).
pub const COMPACT_LENGTH_MAX: u32 = (1 << 21) - 1;

/// Buffered input stream for reading RFB protocol data.
///
/// Data is buffered internally (default 8KB) to minimize system calls;
/// accessors like [`read_u16`](Self::read_u16) only touch the transport when
/// the buffer runs dry. An optional [`Arc<AtomicU64>`] counter tracks bytes
/// pulled off the transport, not bytes handed to callers, so it reflects
/// true wire consumption.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
    received: Option<Arc<AtomicU64>>,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    /// Create a new input stream with the default buffer size (8KB).
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, 8192)
    }

    /// Create a new input stream with the given buffer capacity.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
            received: None,
        }
    }

    /// Attach a shared counter that advances by every byte read from the
    /// underlying transport.
    pub fn with_counter(reader: R, counter: Arc<AtomicU64>) -> Self {
        let mut stream = Self::new(reader);
        stream.received = Some(counter);
        stream
    }

    /// Ensure at least `n` bytes are buffered, reading from the transport as
    /// needed. Fails with `UnexpectedEof` if the peer closes first.
    async fn ensure_bytes(&mut self, n: usize) -> std::io::Result<()> {
        while self.buffer.len() < n {
            let bytes_read = self.reader.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", n, self.buffer.len()),
                ));
            }
            if let Some(counter) = &self.received {
                counter.fetch_add(bytes_read as u64, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Read a single byte.
    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        self.ensure_bytes(1).await?;
        Ok(self.buffer.get_u8())
    }

    /// Read a 16-bit unsigned integer in network byte order.
    pub async fn read_u16(&mut self) -> std::io::Result<u16> {
        self.ensure_bytes(2).await?;
        Ok(self.buffer.get_u16())
    }

    /// Read a 32-bit unsigned integer in network byte order.
    pub async fn read_u32(&mut self) -> std::io::Result<u32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_u32())
    }

    /// Read a 32-bit signed integer in network byte order.
    pub async fn read_i32(&mut self) -> std::io::Result<i32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_i32())
    }

    /// Read exactly `buf.len()` bytes into the provided buffer.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.ensure_bytes(buf.len()).await?;
        self.buffer.copy_to_slice(buf);
        Ok(())
    }

    /// Read exactly `len` bytes into a fresh `Vec`.
    pub async fn read_vec(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf).await?;
        Ok(buf)
    }

    /// Skip `n` bytes (typically padding).
    pub async fn skip(&mut self, n: usize) -> std::io::Result<()> {
        self.ensure_bytes(n).await?;
        self.buffer.advance(n);
        Ok(())
    }

    /// Read a Tight compact length (1-3 bytes, 7 data bits per byte,
    /// least-significant group first, high bit = continuation).
    pub async fn read_compact_length(&mut self) -> std::io::Result<u32> {
        let mut length = 0u32;
        for group in 0..3 {
            let byte = self.read_u8().await?;
            length |= ((byte & 0x7F) as u32) << (group * 7);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(length)
    }

    /// Number of bytes available in the buffer without performing I/O.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume the stream and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Buffered output stream for writing RFB protocol data.
///
/// Writes accumulate in an internal buffer; nothing touches the transport
/// until [`flush`](Self::flush) is called. This gives every client message
/// a single write on the wire, which matters because concurrent senders are
/// serialized around whole messages, never partial ones. The optional byte
/// counter advances at flush time by the number of bytes actually written.
pub struct RfbOutStream<W> {
    writer: W,
    buffer: BytesMut,
    sent: Option<Arc<AtomicU64>>,
}

impl<W: AsyncWrite + Unpin> RfbOutStream<W> {
    /// Create a new output stream with the default buffer size (8KB).
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 8192)
    }

    /// Create a new output stream with the given buffer capacity.
    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(capacity),
            sent: None,
        }
    }

    /// Attach a shared counter that advances by every byte flushed to the
    /// underlying transport.
    pub fn with_counter(writer: W, counter: Arc<AtomicU64>) -> Self {
        let mut stream = Self::new(writer);
        stream.sent = Some(counter);
        stream
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Write a 16-bit unsigned integer in network byte order.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    /// Write a 32-bit unsigned integer in network byte order.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    /// Write a 32-bit signed integer in network byte order.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    /// Write a byte slice.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write a Tight compact length. `value` must not exceed
    /// [`COMPACT_LENGTH_MAX`].
    pub fn write_compact_length(&mut self, value: u32) {
        debug_assert!(value <= COMPACT_LENGTH_MAX);
        let mut remaining = value;
        loop {
            let group = (remaining & 0x7F) as u8;
            remaining >>= 7;
            if remaining == 0 {
                self.write_u8(group);
                break;
            }
            self.write_u8(group | 0x80);
        }
    }

    /// Flush all buffered data to the underlying writer.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            if let Some(counter) = &self.sent {
                counter.fetch_add(self.buffer.len() as u64, Ordering::Relaxed);
            }
            self.buffer.clear();
        }
        self.writer.flush().await
    }

    /// Number of bytes currently buffered and awaiting flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the stream and return the underlying writer. Buffered data
    /// not yet flushed is lost.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn read_primitives() {
        let data = vec![42, 0x12, 0x34, 0x00, 0xAB, 0xCD, 0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFE];
        let mut stream = RfbInStream::new(Cursor::new(data));

        assert_eq!(stream.read_u8().await.unwrap(), 42);
        assert_eq!(stream.read_u16().await.unwrap(), 0x1234);
        assert_eq!(stream.read_u32().await.unwrap(), 0x00ABCDEF);
        assert_eq!(stream.read_u8().await.unwrap(), 0x01);
        assert_eq!(stream.read_i32().await.unwrap(), -2);
    }

    #[tokio::test]
    async fn read_bytes_and_skip() {
        let data = vec![1, 2, 3, 4, 5, 6];
        let mut stream = RfbInStream::new(Cursor::new(data));

        let mut buf = [0u8; 2];
        stream.read_bytes(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2]);

        stream.skip(3).await.unwrap();
        assert_eq!(stream.read_u8().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn read_eof() {
        let mut stream = RfbInStream::new(Cursor::new(vec![1u8]));
        stream.read_u8().await.unwrap();

        let err = stream.read_u8().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn write_primitives() {
        let mut buffer = Vec::new();
        let mut stream = RfbOutStream::new(&mut buffer);

        stream.write_u8(7);
        stream.write_u16(0x1234);
        stream.write_u32(0xDEADBEEF);
        stream.write_i32(-2);
        stream.write_bytes(b"ok");
        stream.flush().await.unwrap();

        assert_eq!(
            buffer,
            vec![7, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0xFF, 0xFF, 0xFF, 0xFE, b'o', b'k']
        );
    }

    #[tokio::test]
    async fn buffered_until_flush() {
        let mut buffer = Vec::new();
        let mut stream = RfbOutStream::new(&mut buffer);

        stream.write_u16(1);
        assert_eq!(stream.buffered(), 2);
        stream.flush().await.unwrap();
        assert_eq!(stream.buffered(), 0);
    }

    #[tokio::test]
    async fn compact_length_known_encodings() {
        // 1-byte, 2-byte and 3-byte forms
        for (bytes, expected) in [
            (vec![0x00], 0u32),
            (vec![0x7F], 127),
            (vec![0x80, 0x01], 128),
            (vec![0xFF, 0x7F], 16383),
            (vec![0xFF, 0xFF, 0x7F], COMPACT_LENGTH_MAX),
        ] {
            let mut stream = RfbInStream::new(Cursor::new(bytes));
            assert_eq!(stream.read_compact_length().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn compact_length_round_trip() {
        // Sample the full 21-bit range, including both edges of each width.
        let samples = [
            0u32, 1, 63, 127, 128, 129, 5000, 16383, 16384, 100_000, 1_048_575, 2_000_000,
            COMPACT_LENGTH_MAX,
        ];
        let mut buffer = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut buffer);
            for value in samples {
                out.write_compact_length(value);
            }
            out.flush().await.unwrap();
        }

        let mut input = RfbInStream::new(Cursor::new(buffer));
        for value in samples {
            assert_eq!(input.read_compact_length().await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn receive_counter_tracks_wire_bytes() {
        let counter = Arc::new(AtomicU64::new(0));
        let data = vec![0u8; 10];
        let mut stream = RfbInStream::with_counter(Cursor::new(data), counter.clone());

        stream.read_u8().await.unwrap();
        // The stream buffers greedily, so the counter reflects what was
        // pulled off the transport rather than what the caller consumed.
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn send_counter_advances_on_flush() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut buffer = Vec::new();
        let mut stream = RfbOutStream::with_counter(&mut buffer, counter.clone());

        stream.write_u32(1);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        stream.flush().await.unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn round_trip() {
        let mut buffer = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut buffer);
            out.write_u8(42);
            out.write_u16(0x1234);
            out.write_compact_length(300);
            out.write_bytes(b"test");
            out.flush().await.unwrap();
        }

        let mut input = RfbInStream::new(Cursor::new(&buffer));
        assert_eq!(input.read_u8().await.unwrap(), 42);
        assert_eq!(input.read_u16().await.unwrap(), 0x1234);
        assert_eq!(input.read_compact_length().await.unwrap(), 300);
        let mut buf = [0u8; 4];
        input.read_bytes(&mut buf).await.unwrap();
        assert_eq!(&buf, b"test");
    }
}
