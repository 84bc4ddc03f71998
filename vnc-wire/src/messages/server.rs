//! Server-to-client RFB messages.
//!
//! The server message stream dispatches on a leading type byte:
//! FramebufferUpdate=0, SetColourMapEntries=1, Bell=2, ServerCutText=3.

use super::types::PixelFormat;
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// ServerInit - initial server parameters after ClientInit.
///
/// Wire format: u16 width, u16 height, 16-byte PixelFormat, u32 name
/// length, name bytes (UTF-8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let framebuffer_width = stream.read_u16().await?;
        let framebuffer_height = stream.read_u16().await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        let name_length = stream.read_u32().await? as usize;
        let name = stream.read_string(name_length).await?;

        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.framebuffer_width);
        stream.write_u16(self.framebuffer_height);
        self.pixel_format.write_to(stream);
        stream.write_u32(self.name.len() as u32);
        stream.write_bytes(self.name.as_bytes());
    }
}

/// FramebufferUpdate header - padding byte plus the rectangle count.
///
/// Rectangle headers and payloads are read one at a time by the session so
/// decoding can be interleaved with cancellation checks; this type parses
/// only the fixed prefix after the message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateHeader {
    pub rectangle_count: u16,
}

impl FramebufferUpdateHeader {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(1).await?;
        let rectangle_count = stream.read_u16().await?;
        Ok(Self { rectangle_count })
    }
}

/// SetColourMapEntries - palette update for indexed pixel formats.
///
/// Wire format after the type byte: 1 byte padding, u16 first color index,
/// u16 count, then count x (u16 r, u16 g, u16 b). Channels arrive as
/// 16-bit values and are scaled to 8 bits here (`v * 255 / 65535`), since
/// the client stores an 8-bit color map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetColourMapEntries {
    pub first_color: u16,
    /// 8-bit (r, g, b) entries, already scaled down from the wire's u16.
    pub colors: Vec<(u8, u8, u8)>,
}

impl SetColourMapEntries {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(1).await?;
        let first_color = stream.read_u16().await?;
        let count = stream.read_u16().await? as usize;

        let mut colors = Vec::with_capacity(count);
        for _ in 0..count {
            let r = stream.read_u16().await?;
            let g = stream.read_u16().await?;
            let b = stream.read_u16().await?;
            colors.push((scale_channel(r), scale_channel(g), scale_channel(b)));
        }

        Ok(Self {
            first_color,
            colors,
        })
    }
}

fn scale_channel(v: u16) -> u8 {
    (v as u32 * 255 / 65535) as u8
}

/// ServerCutText - clipboard text from the server.
///
/// Wire format after the type byte: 3 bytes padding, u32 length, length
/// bytes of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCutText {
    pub text: String,
}

impl ServerCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(3).await?;
        let length = stream.read_u32().await? as usize;
        let text = stream.read_string(length).await?;
        Ok(Self { text })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(3);
        stream.write_padding(3);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(self.text.as_bytes());
    }
}

//
// Server message type bytes
//

pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
pub const SERVER_MSG_BELL: u8 = 2;
pub const SERVER_MSG_CUT_TEXT: u8 = 3;
