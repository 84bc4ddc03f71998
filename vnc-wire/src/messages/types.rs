//! Core RFB wire types shared by client and server messages.
//!
//! - [`PixelFormat`] - the 16-byte pixel layout descriptor
//! - [`Rectangle`] - the per-update rectangle header with its encoding id
//! - Encoding and security type constants

use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// RFB pixel format descriptor.
///
/// Describes how the server encodes pixels on the wire: bits per pixel,
/// color depth, byte order, and either true-color channel layout
/// (max/shift triples) or indexed mode consulting the color map.
///
/// # Wire Format (16 bytes)
///
/// - 1 byte: bits_per_pixel
/// - 1 byte: depth
/// - 1 byte: big_endian (0 or 1)
/// - 1 byte: true_color (0 or 1)
/// - 2 bytes each: red_max, green_max, blue_max
/// - 1 byte each: red_shift, green_shift, blue_shift
/// - 3 bytes: padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_color: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel on the wire (1, 2, or 4).
    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel.div_ceil(8) as usize
    }

    /// The client-side pixel format presets selectable by `(bpp, depth)`.
    ///
    /// Any pair not in the table returns `None`, which leaves the
    /// server-advertised format in effect.
    pub fn preset(bits_per_pixel: u8, depth: u8) -> Option<Self> {
        let (red_max, green_max, blue_max, red_shift, green_shift, blue_shift) =
            match (bits_per_pixel, depth) {
                (16, 16) | (16, 8) => (31, 63, 31, 11, 5, 0),
                (8, 8) => (7, 7, 3, 0, 3, 6),
                (8, 6) => (3, 3, 3, 4, 2, 0),
                (8, 3) => (1, 1, 1, 2, 1, 0),
                _ => return None,
            };
        Some(Self {
            bits_per_pixel,
            depth,
            big_endian: false,
            true_color: false,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    /// Read a PixelFormat from an RFB input stream.
    ///
    /// The two boolean bytes must be 0 or 1; anything else is malformed.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let bits_per_pixel = stream.read_u8().await?;
        let depth = stream.read_u8().await?;
        let big_endian = read_bool(stream, "big_endian").await?;
        let true_color = read_bool(stream, "true_color").await?;
        let red_max = stream.read_u16().await?;
        let green_max = stream.read_u16().await?;
        let blue_max = stream.read_u16().await?;
        let red_shift = stream.read_u8().await?;
        let green_shift = stream.read_u8().await?;
        let blue_shift = stream.read_u8().await?;
        stream.read_padding(3).await?;

        Ok(Self {
            bits_per_pixel,
            depth,
            big_endian,
            true_color,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    /// Write this PixelFormat to an RFB output stream.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(self.bits_per_pixel);
        stream.write_u8(self.depth);
        stream.write_u8(self.big_endian as u8);
        stream.write_u8(self.true_color as u8);
        stream.write_u16(self.red_max);
        stream.write_u16(self.green_max);
        stream.write_u16(self.blue_max);
        stream.write_u8(self.red_shift);
        stream.write_u8(self.green_shift);
        stream.write_u8(self.blue_shift);
        stream.write_padding(3);
    }
}

async fn read_bool<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    field: &str,
) -> std::io::Result<bool> {
    match stream.read_u8().await? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} must be 0 or 1, got {}", field, other),
        )),
    }
}

/// Rectangle header inside a FramebufferUpdate.
///
/// Only the 12-byte header; the encoding-specific payload that follows is
/// consumed by the matching decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    /// Read a rectangle header from an RFB input stream.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
            encoding: stream.read_i32().await?,
        })
    }

    /// Write a rectangle header to an RFB output stream.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
        stream.write_i32(self.encoding);
    }
}

//
// Encoding type constants
//

/// Raw encoding - uncompressed pixel data.
pub const ENCODING_RAW: i32 = 0;

/// CopyRect encoding - copy from another framebuffer region.
pub const ENCODING_COPY_RECT: i32 = 1;

/// RRE (Rise-and-Run-length Encoding).
pub const ENCODING_RRE: i32 = 2;

/// CoRRE - compact RRE with u8 subrect coordinates.
pub const ENCODING_CORRE: i32 = 4;

/// Hextile encoding - 16x16 tile-based compression.
pub const ENCODING_HEXTILE: i32 = 5;

/// ZRLE (Zlib Run-Length Encoding) - 64x64 tiles over a zlib substream.
pub const ENCODING_ZRLE: i32 = 16;

/// The encodings advertised to the server via SetEncodings, in preference
/// order. CoRRE is decodable but intentionally left off the list; several
/// servers ship broken CoRRE encoders.
pub const ADVERTISED_ENCODINGS: [i32; 5] = [
    ENCODING_ZRLE,
    ENCODING_HEXTILE,
    ENCODING_RRE,
    ENCODING_COPY_RECT,
    ENCODING_RAW,
];

//
// Security type constants
//

/// No security - no authentication required.
pub const SECURITY_TYPE_NONE: u8 = 1;

/// VNC authentication - DES challenge-response with password.
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rgb888() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(rgb888().bytes_per_pixel(), 4);
        let mut pf = rgb888();
        pf.bits_per_pixel = 16;
        assert_eq!(pf.bytes_per_pixel(), 2);
        pf.bits_per_pixel = 8;
        assert_eq!(pf.bytes_per_pixel(), 1);
    }

    #[test]
    fn preset_table() {
        let pf = PixelFormat::preset(16, 16).unwrap();
        assert_eq!(
            (pf.red_max, pf.green_max, pf.blue_max),
            (31, 63, 31)
        );
        assert_eq!((pf.red_shift, pf.green_shift, pf.blue_shift), (11, 5, 0));
        assert!(!pf.true_color);

        let pf = PixelFormat::preset(8, 8).unwrap();
        assert_eq!((pf.red_max, pf.green_max, pf.blue_max), (7, 7, 3));
        assert_eq!((pf.red_shift, pf.green_shift, pf.blue_shift), (0, 3, 6));

        let pf = PixelFormat::preset(8, 3).unwrap();
        assert_eq!((pf.red_max, pf.green_max, pf.blue_max), (1, 1, 1));
        assert_eq!((pf.red_shift, pf.green_shift, pf.blue_shift), (2, 1, 0));

        // Pairs outside the table keep the server format.
        assert!(PixelFormat::preset(32, 24).is_none());
        assert!(PixelFormat::preset(16, 15).is_none());
    }

    #[tokio::test]
    async fn pixel_format_round_trip() {
        let original = rgb888();

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();
        assert_eq!(buffer.len(), 16);

        let mut inp = RfbInStream::new(Cursor::new(buffer));
        let read_back = PixelFormat::read_from(&mut inp).await.unwrap();
        assert_eq!(original, read_back);
    }

    #[tokio::test]
    async fn pixel_format_invalid_boolean() {
        let data = vec![
            32, 24, 2, 1, // big_endian byte out of range
            0, 255, 0, 255, 0, 255, 16, 8, 0, 0, 0, 0,
        ];
        let mut stream = RfbInStream::new(Cursor::new(data));
        assert!(PixelFormat::read_from(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn rectangle_round_trip() {
        let original = Rectangle {
            x: 100,
            y: 200,
            width: 640,
            height: 480,
            encoding: ENCODING_HEXTILE,
        };

        let mut buffer = Vec::new();
        let mut out = RfbOutStream::new(&mut buffer);
        original.write_to(&mut out);
        out.flush().await.unwrap();

        let mut inp = RfbInStream::new(Cursor::new(buffer));
        assert_eq!(Rectangle::read_from(&mut inp).await.unwrap(), original);
    }

    #[test]
    fn advertised_encoding_order() {
        assert_eq!(ADVERTISED_ENCODINGS, [16, 5, 2, 1, 0]);
    }
}
