//! The ZRLE compressed substream.
//!
//! ZRLE rectangles are framed on the outer connection as a big-endian u32
//! compressed length followed by that many bytes of zlib data. The zlib
//! stream itself is continuous for the whole session: only the first
//! rectangle carries a zlib header, and later rectangles are deflate
//! continuation data. The inflater here is therefore created once and
//! never reset - resetting it between rectangles is the classic ZRLE
//! decode bug.
//!
//! [`ZrleInflator::begin_rect`] consumes one framed block from the outer
//! stream and inflates it; the tile decoder then reads the inflated bytes
//! through [`read_u8`](ZrleInflator::read_u8) /
//! [`read_bytes`](ZrleInflator::read_bytes). Reading past the inflated
//! payload of the current rectangle is a protocol error.

use crate::io::RfbInStream;
use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::AsyncRead;

/// Upper bound on a single rectangle's compressed payload.
pub const MAX_COMPRESSED_LEN: u32 = 64 * 1024 * 1024;

const INFLATE_CHUNK: usize = 64 * 1024;

/// Persistent zlib inflate session for ZRLE rectangles.
pub struct ZrleInflator {
    inflater: Decompress,
    buf: Vec<u8>,
    pos: usize,
}

impl Default for ZrleInflator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleInflator {
    /// Create a fresh inflate session (zlib wrapper expected on the first
    /// rectangle).
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Consume one rectangle's framed compressed block from the outer
    /// stream and inflate it.
    ///
    /// The read cursor over the inflated bytes is rewound to the start;
    /// the zlib state is carried over from previous rectangles.
    pub async fn begin_rect<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<()> {
        let compressed_len = stream.read_u32().await?;
        if compressed_len > MAX_COMPRESSED_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "ZRLE compressed length {} exceeds the {} byte cap",
                    compressed_len, MAX_COMPRESSED_LEN
                ),
            ));
        }

        let compressed = stream.read_bytes_vec(compressed_len as usize).await?;
        self.buf.clear();
        self.pos = 0;
        self.inflate_all(&compressed)?;

        tracing::trace!(
            compressed = compressed.len(),
            inflated = self.buf.len(),
            "ZRLE rectangle block inflated"
        );
        Ok(())
    }

    fn inflate_all(&mut self, compressed: &[u8]) -> std::io::Result<()> {
        let mut in_pos = 0;
        let mut chunk = [0u8; INFLATE_CHUNK];

        while in_pos < compressed.len() {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();

            let status = self
                .inflater
                .decompress(&compressed[in_pos..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("ZRLE zlib inflate failed: {}", e),
                    )
                })?;

            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            in_pos += consumed;
            self.buf.extend_from_slice(&chunk[..produced]);

            match status {
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "ZRLE zlib inflate made no progress",
                        ));
                    }
                }
                Status::StreamEnd => break,
            }
        }
        Ok(())
    }

    /// Bytes left unread in the current rectangle's inflated payload.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read one byte of inflated data.
    pub fn read_u8(&mut self) -> std::io::Result<u8> {
        if self.pos >= self.buf.len() {
            return Err(underrun(1, 0));
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read exactly `buf.len()` bytes of inflated data.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        if self.remaining() < buf.len() {
            return Err(underrun(buf.len(), self.remaining()));
        }
        buf.copy_from_slice(&self.buf[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
}

fn underrun(wanted: usize, available: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!(
            "ZRLE substream underrun: wanted {} bytes, rectangle has {}",
            wanted, available
        ),
    )
}
