//! Wire pixel to ARGB conversion.
//!
//! Every decoder funnels pixel bytes through [`PixelDecoder`], which turns
//! them into the 32-bit ARGB words the framebuffer stores. The decoder
//! snapshots the framebuffer's pixel format and color map at rectangle
//! start, so a SetColourMapEntries arriving between rectangles takes
//! effect on the next rectangle.
//!
//! Channel extraction follows the format's shift/max triples, with each
//! channel expanded to 8 bits as `value * 255 / max`. 8 bpp indexed
//! formats consult the color map instead. Alpha is always opaque.
//!
//! # ZRLE compressed pixels
//!
//! Inside the ZRLE substream a pixel may be shortened to 3 bytes
//! ("CPIXEL") when the format is 32 bpp true-color with depth <= 24 and
//! all color bits packed into three consecutive bytes; the unused byte
//! sits at one end depending on endianness. [`PixelDecoder::cpixel_len`]
//! and [`PixelDecoder::read_cpixel`] implement that form.

use anyhow::{bail, Result};
use vnc_framebuffer::{ColorMap, Framebuffer};
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::PixelFormat;
use vnc_wire::ZrleInflator;
use tokio::io::AsyncRead;

/// Where the three CPIXEL bytes sit within the 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CpixelForm {
    /// Full-width pixel; no shortening.
    Full,
    /// Color bits in the least significant three bytes.
    Low,
    /// Color bits in the most significant three bytes.
    High,
}

/// Converts wire-format pixels into ARGB words.
#[derive(Debug, Clone)]
pub struct PixelDecoder {
    format: PixelFormat,
    palette: ColorMap,
    cpixel: CpixelForm,
}

impl PixelDecoder {
    /// Snapshot the framebuffer's format and color map.
    pub fn new(fb: &Framebuffer) -> Result<Self> {
        let format = *fb.format();
        match format.bits_per_pixel {
            8 | 16 | 32 => {}
            other => bail!("unsupported bits_per_pixel {}", other),
        }
        if channel_extraction_applies(&format) {
            if format.red_max == 0 || format.green_max == 0 || format.blue_max == 0 {
                bail!("true-color pixel format with a zero channel max");
            }
            if format.red_shift >= 32 || format.green_shift >= 32 || format.blue_shift >= 32 {
                bail!("true-color pixel format with a channel shift past bit 31");
            }
        }

        Ok(Self {
            cpixel: cpixel_form(&format),
            palette: fb.color_map().clone(),
            format,
        })
    }

    /// Bytes one ordinary pixel occupies on the wire.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Decode one pixel from an exact-length byte slice.
    pub fn decode(&self, bytes: &[u8]) -> u32 {
        debug_assert_eq!(bytes.len(), self.bytes_per_pixel());
        let raw = match (self.format.bits_per_pixel, self.format.big_endian) {
            (8, _) => bytes[0] as u32,
            (16, true) => u16::from_be_bytes([bytes[0], bytes[1]]) as u32,
            (16, false) => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            (32, true) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (32, false) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            _ => unreachable!("validated in PixelDecoder::new"),
        };
        self.expand(raw)
    }

    /// Read and decode one pixel from the outer stream.
    pub async fn read_pixel<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<u32> {
        let mut bytes = [0u8; 4];
        let n = self.bytes_per_pixel();
        stream.read_bytes(&mut bytes[..n]).await?;
        Ok(self.decode(&bytes[..n]))
    }

    /// Bytes one pixel occupies in the ZRLE substream.
    pub fn cpixel_len(&self) -> usize {
        match self.cpixel {
            CpixelForm::Full => self.bytes_per_pixel(),
            CpixelForm::Low | CpixelForm::High => 3,
        }
    }

    /// Read and decode one (possibly shortened) pixel from the ZRLE
    /// substream.
    pub fn read_cpixel(&self, substream: &mut ZrleInflator) -> std::io::Result<u32> {
        let mut bytes = [0u8; 4];
        let n = self.cpixel_len();
        substream.read_bytes(&mut bytes[..n])?;
        Ok(self.decode_cpixel(&bytes[..n]))
    }

    /// Decode one compressed pixel from an exact-length byte slice.
    pub fn decode_cpixel(&self, bytes: &[u8]) -> u32 {
        let raw = match (self.cpixel, self.format.big_endian) {
            (CpixelForm::Full, _) => return self.decode(bytes),
            (CpixelForm::Low, true) => {
                (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
            }
            (CpixelForm::Low, false) => {
                bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
            }
            (CpixelForm::High, true) => {
                (bytes[0] as u32) << 24 | (bytes[1] as u32) << 16 | (bytes[2] as u32) << 8
            }
            (CpixelForm::High, false) => {
                (bytes[0] as u32) << 8 | (bytes[1] as u32) << 16 | (bytes[2] as u32) << 24
            }
        };
        self.expand(raw)
    }

    fn expand(&self, raw: u32) -> u32 {
        if self.format.bits_per_pixel == 8 && !self.format.true_color {
            let (r, g, b) = self.palette.lookup(raw as u8);
            return argb(r, g, b);
        }

        let f = &self.format;
        let r = expand_channel(raw >> f.red_shift, f.red_max);
        let g = expand_channel(raw >> f.green_shift, f.green_max);
        let b = expand_channel(raw >> f.blue_shift, f.blue_max);
        argb(r, g, b)
    }
}

/// Channel extraction applies to every format except 8 bpp indexed.
fn channel_extraction_applies(format: &PixelFormat) -> bool {
    format.bits_per_pixel != 8 || format.true_color
}

fn cpixel_form(format: &PixelFormat) -> CpixelForm {
    if format.bits_per_pixel != 32 || !format.true_color || format.depth > 24 {
        return CpixelForm::Full;
    }
    let used = (format.red_max as u32) << format.red_shift
        | (format.green_max as u32) << format.green_shift
        | (format.blue_max as u32) << format.blue_shift;
    if used < (1 << 24) {
        CpixelForm::Low
    } else if format.red_shift >= 8 && format.green_shift >= 8 && format.blue_shift >= 8 {
        CpixelForm::High
    } else {
        CpixelForm::Full
    }
}

fn expand_channel(shifted: u32, max: u16) -> u8 {
    ((shifted & max as u32) * 255 / max as u32) as u8
}

fn argb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}
