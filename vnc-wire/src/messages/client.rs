//! Client-to-server RFB messages.
//!
//! Each type maps 1:1 to a wire construct. Message type bytes:
//! SetPixelFormat=0, SetEncodings=2, FramebufferUpdateRequest=3,
//! KeyEvent=4, PointerEvent=5, ClientCutText=6.

use super::types::PixelFormat;
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// ClientInit - sent after the security handshake.
///
/// Wire format: 1 byte shared flag (0 = exclusive, 1 = shared).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInit {
    pub shared: bool,
}

impl ClientInit {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(self.shared as u8);
    }
}

/// SetPixelFormat - ask the server to deliver pixels in a different layout.
///
/// Wire format: type byte 0, 3 bytes padding, 16-byte PixelFormat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPixelFormat {
    pub pixel_format: PixelFormat,
}

impl SetPixelFormat {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(0);
        stream.write_padding(3);
        self.pixel_format.write_to(stream);
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(3).await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        Ok(Self { pixel_format })
    }
}

/// SetEncodings - declare supported encodings in preference order.
///
/// Wire format: type byte 2, 1 byte padding, u16 count, count x i32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(2);
        stream.write_padding(1);
        stream.write_u16(self.encodings.len() as u16);
        for encoding in &self.encodings {
            stream.write_i32(*encoding);
        }
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(1).await?;
        let count = stream.read_u16().await? as usize;
        let mut encodings = Vec::with_capacity(count);
        for _ in 0..count {
            encodings.push(stream.read_i32().await?);
        }
        Ok(Self { encodings })
    }
}

/// FramebufferUpdateRequest - ask for a (possibly incremental) screen update.
///
/// Wire format: type byte 3, 1 byte incremental flag, u16 x, y, w, h.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(3);
        stream.write_u8(self.incremental as u8);
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let incremental = stream.read_u8().await? != 0;
        Ok(Self {
            incremental,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
        })
    }
}

/// KeyEvent - a key press or release.
///
/// Wire format: type byte 4, 1 byte down flag, 2 bytes padding, u32 keysym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: bool,
    /// X11 keysym value.
    pub key: u32,
}

impl KeyEvent {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(4);
        stream.write_u8(self.down as u8);
        stream.write_padding(2);
        stream.write_u32(self.key);
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let down = stream.read_u8().await? != 0;
        stream.read_padding(2).await?;
        Ok(Self {
            down,
            key: stream.read_u32().await?,
        })
    }
}

/// PointerEvent - mouse position and button state.
///
/// Wire format: type byte 5, 1 byte button mask, u16 x, u16 y.
/// Button bits: 1=left, 2=middle, 4=right, 8=wheel-up, 16=wheel-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(5);
        stream.write_u8(self.button_mask);
        stream.write_u16(self.x);
        stream.write_u16(self.y);
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            button_mask: stream.read_u8().await?,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
        })
    }
}

/// ClientCutText - clipboard text sent to the server.
///
/// Wire format: type byte 6, 3 bytes padding, u32 length, length bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCutText {
    pub text: String,
}

impl ClientCutText {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(6);
        stream.write_padding(3);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(self.text.as_bytes());
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.read_padding(3).await?;
        let length = stream.read_u32().await? as usize;
        let text = stream.read_string(length).await?;
        Ok(Self { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::types::ADVERTISED_ENCODINGS;
    use std::io::Cursor;

    async fn written(f: impl FnOnce(&mut RfbOutStream<&mut Vec<u8>>)) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        f(&mut out);
        out.flush().await.unwrap();
        buffer
    }

    #[tokio::test]
    async fn client_init_shared_byte() {
        assert_eq!(written(|o| ClientInit { shared: true }.write_to(o)).await, vec![1]);
        assert_eq!(written(|o| ClientInit { shared: false }.write_to(o)).await, vec![0]);
    }

    #[tokio::test]
    async fn set_encodings_preference_order() {
        let msg = SetEncodings {
            encodings: ADVERTISED_ENCODINGS.to_vec(),
        };
        let bytes = written(|o| msg.write_to(o)).await;

        assert_eq!(&bytes[..4], &[2, 0, 0, 5]);
        // Exactly [16, 5, 2, 1, 0] as big-endian i32s.
        assert_eq!(
            &bytes[4..],
            &[
                0, 0, 0, 16, //
                0, 0, 0, 5, //
                0, 0, 0, 2, //
                0, 0, 0, 1, //
                0, 0, 0, 0,
            ]
        );
    }

    #[tokio::test]
    async fn update_request_layout() {
        let msg = FramebufferUpdateRequest {
            incremental: true,
            x: 0,
            y: 0,
            width: 1024,
            height: 768,
        };
        let bytes = written(|o| msg.write_to(o)).await;
        assert_eq!(bytes, vec![3, 1, 0, 0, 0, 0, 4, 0, 3, 0]);
    }

    #[tokio::test]
    async fn key_event_round_trip() {
        let original = KeyEvent {
            down: true,
            key: 0xFF0D,
        };
        let bytes = written(|o| original.write_to(o)).await;
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[0], 4);

        let mut inp = RfbInStream::new(Cursor::new(&bytes[1..]));
        assert_eq!(KeyEvent::read_from(&mut inp).await.unwrap(), original);
    }

    #[tokio::test]
    async fn pointer_event_round_trip() {
        let original = PointerEvent {
            button_mask: 0b0000_0101,
            x: 500,
            y: 300,
        };
        let bytes = written(|o| original.write_to(o)).await;
        assert_eq!(bytes[0], 5);

        let mut inp = RfbInStream::new(Cursor::new(&bytes[1..]));
        assert_eq!(PointerEvent::read_from(&mut inp).await.unwrap(), original);
    }

    #[tokio::test]
    async fn cut_text_round_trip() {
        let original = ClientCutText {
            text: "copy this".to_string(),
        };
        let bytes = written(|o| original.write_to(o)).await;
        assert_eq!(bytes[0], 6);
        assert_eq!(bytes.len(), 1 + 3 + 4 + 9);

        let mut inp = RfbInStream::new(Cursor::new(&bytes[1..]));
        assert_eq!(ClientCutText::read_from(&mut inp).await.unwrap(), original);
    }

    #[tokio::test]
    async fn set_pixel_format_round_trip() {
        let original = SetPixelFormat {
            pixel_format: PixelFormat::preset(8, 8).unwrap(),
        };
        let bytes = written(|o| original.write_to(o)).await;
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytes[0], 0);

        let mut inp = RfbInStream::new(Cursor::new(&bytes[1..]));
        assert_eq!(SetPixelFormat::read_from(&mut inp).await.unwrap(), original);
    }
}
