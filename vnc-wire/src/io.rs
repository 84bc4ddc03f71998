//! Framed big-endian stream adapters for the RFB wire format.
//!
//! All multi-byte integers on the RFB wire are network byte order
//! regardless of host endianness. [`RfbInStream`] and [`RfbOutStream`]
//! wrap an async reader/writer with typed accessors for the shapes the
//! protocol uses: unsigned 8/16/32-bit integers, signed 32-bit encoding
//! ids, exact-length byte blocks, padding, and length-prefixed text.
//!
//! Reads block until the full request is satisfied; a short read never
//! surfaces to callers. The input side counts every byte it hands out,
//! so a truncated conversation fails with the stream offset where the
//! server stopped making sense - that offset is usually enough to tell a
//! dead socket from a desynchronized decoder.
//!
//! Writes accumulate in an internal buffer and reach the socket only on
//! [`RfbOutStream::flush`], so each protocol message goes out in one
//! piece.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8192;

/// Buffered input stream reading RFB protocol data in network byte order.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
    /// Total bytes handed to callers since the stream was created.
    position: u64,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            position: 0,
        }
    }

    /// Bytes consumed from the stream so far.
    ///
    /// Useful in error reports: the offset pins down exactly where a
    /// malformed conversation went off the rails.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Pull from the underlying reader until `wanted` bytes are buffered.
    async fn fill(&mut self, wanted: usize) -> std::io::Result<()> {
        while self.buffer.len() < wanted {
            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream ended at byte {}: a {}-byte read got only {}",
                        self.position,
                        wanted,
                        self.buffer.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Take a fixed-size chunk off the front of the stream.
    async fn take<const N: usize>(&mut self) -> std::io::Result<[u8; N]> {
        self.fill(N).await?;
        let mut bytes = [0u8; N];
        self.buffer.copy_to_slice(&mut bytes);
        self.position += N as u64;
        Ok(bytes)
    }

    /// Read a single byte.
    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        Ok(self.take::<1>().await?[0])
    }

    /// Read a 16-bit unsigned integer in network byte order.
    pub async fn read_u16(&mut self) -> std::io::Result<u16> {
        Ok(u16::from_be_bytes(self.take().await?))
    }

    /// Read a 32-bit unsigned integer in network byte order.
    pub async fn read_u32(&mut self) -> std::io::Result<u32> {
        Ok(u32::from_be_bytes(self.take().await?))
    }

    /// Read a 32-bit signed integer in network byte order.
    pub async fn read_i32(&mut self) -> std::io::Result<i32> {
        Ok(i32::from_be_bytes(self.take().await?))
    }

    /// Read exactly `buf.len()` bytes into the provided buffer.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.fill(buf.len()).await?;
        self.buffer.copy_to_slice(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read `n` bytes into a freshly allocated vector.
    pub async fn read_bytes_vec(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_bytes(&mut buf).await?;
        Ok(buf)
    }

    /// Read and discard `n` padding bytes.
    pub async fn read_padding(&mut self, n: usize) -> std::io::Result<()> {
        self.fill(n).await?;
        self.buffer.advance(n);
        self.position += n as u64;
        Ok(())
    }

    /// Read `n` bytes and decode them as UTF-8 text.
    pub async fn read_string(&mut self, n: usize) -> std::io::Result<String> {
        let bytes = self.read_bytes_vec(n).await?;
        String::from_utf8(bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid UTF-8 text: {}", e),
            )
        })
    }

    /// Number of bytes currently buffered (readable without I/O).
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

/// Buffered output stream writing RFB protocol data in network byte order.
///
/// Nothing reaches the underlying writer until [`flush`](Self::flush) is
/// called.
pub struct RfbOutStream<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> RfbOutStream<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a 16-bit unsigned integer in network byte order.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a 32-bit unsigned integer in network byte order.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a 32-bit signed integer in network byte order.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a byte slice.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write `n` zero bytes of padding.
    pub fn write_padding(&mut self, n: usize) {
        self.buffer.resize(self.buffer.len() + n, 0);
    }

    /// Flush all buffered data to the underlying writer.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.flush().await
    }

    /// Number of bytes staged but not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the stream and return the underlying writer.
    ///
    /// Any unflushed data is lost.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
