//! ZRLE encoding (type 16) - zlib-compressed RLE over 64x64 tiles.
//!
//! Every ZRLE rectangle is one framed block of the session's continuous
//! zlib stream (see [`vnc_wire::zlib`]). After inflation the payload is a
//! sequence of 64x64 tiles (clipped at the edges), row-major, each opened
//! by a subencoding byte `s`:
//!
//! | `s`        | tile contents                                        |
//! |------------|------------------------------------------------------|
//! | 0          | raw: `tw * th` pixels                                |
//! | 1          | solid: one pixel replicated over the tile            |
//! | 2..=16     | packed palette: `s` pixels, then bit-packed indices  |
//! | 17..=127   | invalid                                              |
//! | 128        | plain RLE: (pixel, length) runs                      |
//! | 129        | invalid                                              |
//! | 130..=255  | palette RLE with `s - 128` entries                   |
//!
//! Run lengths chain in 255-increments: `length = 1 + sum` of bytes read
//! while each byte equals 255. Packed palette rows pad to a whole byte;
//! indices are MSB-first at 1, 2, or 4 bits depending on palette size.
//!
//! Pixels inside the substream use the compressed CPIXEL form when the
//! format allows it (see [`PixelDecoder::cpixel_len`]).

use crate::pixel::PixelDecoder;
use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncRead;
use vnc_core::Rect;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::Rectangle;
use vnc_wire::ZrleInflator;

const TILE_SIZE: u16 = 64;

pub(crate) async fn decode<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    substream: &mut ZrleInflator,
) -> Result<()> {
    substream
        .begin_rect(stream)
        .await
        .context("reading ZRLE compressed block")?;

    let mut ty = 0u16;
    while ty < rect.height {
        let tile_h = TILE_SIZE.min(rect.height - ty);
        let mut tx = 0u16;
        while tx < rect.width {
            let tile_w = TILE_SIZE.min(rect.width - tx);
            decode_tile(
                substream,
                px,
                fb,
                (rect.x + tx, rect.y + ty),
                (tile_w, tile_h),
            )
            .with_context(|| {
                format!(
                    "ZRLE tile ({}, {}) of rect at ({}, {})",
                    tx, ty, rect.x, rect.y
                )
            })?;
            tx += TILE_SIZE;
        }
        ty += TILE_SIZE;
    }

    Ok(())
}

fn decode_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
) -> Result<()> {
    let subencoding = substream.read_u8().context("reading subencoding byte")?;

    match subencoding {
        0 => decode_raw_tile(substream, px, fb, pos, size),
        1 => decode_solid_tile(substream, px, fb, pos, size),
        2..=16 => decode_packed_palette_tile(substream, px, fb, pos, size, subencoding as usize),
        128 => decode_plain_rle_tile(substream, px, fb, pos, size),
        130..=255 => {
            decode_palette_rle_tile(substream, px, fb, pos, size, (subencoding - 128) as usize)
        }
        invalid => bail!("invalid ZRLE subencoding {}", invalid),
    }
}

/// Sequential pixel sink for one tile; guarantees exactly `w * h` writes.
struct TileWriter {
    x: u16,
    y: u16,
    w: u16,
    h: u16,
    next: usize,
}

impl TileWriter {
    fn new(pos: (u16, u16), size: (u16, u16)) -> Self {
        Self {
            x: pos.0,
            y: pos.1,
            w: size.0,
            h: size.1,
            next: 0,
        }
    }

    fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    fn push(&mut self, fb: &mut Framebuffer, argb: u32) -> Result<()> {
        if self.next >= self.area() {
            bail!("tile overrun: more than {} pixels emitted", self.area());
        }
        let dx = (self.next % self.w as usize) as u16;
        let dy = (self.next / self.w as usize) as u16;
        fb.set_pixel(self.x + dx, self.y + dy, argb)?;
        self.next += 1;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if self.next != self.area() {
            bail!(
                "tile underrun: {} of {} pixels emitted",
                self.next,
                self.area()
            );
        }
        Ok(())
    }
}

fn decode_raw_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
) -> Result<()> {
    let mut tile = TileWriter::new(pos, size);
    for _ in 0..tile.area() {
        let argb = px.read_cpixel(substream)?;
        tile.push(fb, argb)?;
    }
    tile.finish()
}

fn decode_solid_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
) -> Result<()> {
    let argb = px.read_cpixel(substream)?;
    fb.fill_rect(Rect::from_u16(pos.0, pos.1, size.0, size.1), argb)
}

fn read_palette(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    len: usize,
) -> Result<Vec<u32>> {
    let mut palette = Vec::with_capacity(len);
    for i in 0..len {
        palette.push(
            px.read_cpixel(substream)
                .with_context(|| format!("reading palette entry {}", i))?,
        );
    }
    Ok(palette)
}

fn decode_packed_palette_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
    palette_len: usize,
) -> Result<()> {
    let palette = read_palette(substream, px, palette_len)?;
    let bits = match palette_len {
        2 => 1,
        3..=4 => 2,
        _ => 4,
    };

    let (tw, th) = size;
    let mut tile = TileWriter::new(pos, size);
    let row_bytes = (tw as usize * bits).div_ceil(8);
    let mut row = vec![0u8; row_bytes];

    for _ in 0..th {
        // Indices are packed MSB-first and each row pads to a byte.
        substream.read_bytes(&mut row).context("reading packed palette row")?;
        let mut bit = 0usize;
        for _ in 0..tw {
            let byte = row[bit / 8];
            let shift = 8 - bits - (bit % 8);
            let index = ((byte >> shift) & ((1 << bits) - 1)) as usize;
            let argb = *palette
                .get(index)
                .ok_or_else(|| anyhow!("packed index {} outside palette of {}", index, palette_len))?;
            tile.push(fb, argb)?;
            bit += bits;
        }
    }
    tile.finish()
}

/// Run length chained in 255-increments: 1 + sum of bytes while each
/// byte read equals 255.
fn read_run_length(substream: &mut ZrleInflator) -> Result<usize> {
    let mut len = 1usize;
    loop {
        let byte = substream.read_u8().context("reading run length")?;
        len += byte as usize;
        if byte != 255 {
            return Ok(len);
        }
    }
}

fn decode_plain_rle_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
) -> Result<()> {
    let mut tile = TileWriter::new(pos, size);
    let area = tile.area();
    let mut written = 0usize;

    while written < area {
        let argb = px.read_cpixel(substream)?;
        let run = read_run_length(substream)?;
        if written + run > area {
            bail!("RLE run of {} overruns tile ({} of {} written)", run, written, area);
        }
        for _ in 0..run {
            tile.push(fb, argb)?;
        }
        written += run;
    }
    tile.finish()
}

fn decode_palette_rle_tile(
    substream: &mut ZrleInflator,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
    pos: (u16, u16),
    size: (u16, u16),
    palette_len: usize,
) -> Result<()> {
    let palette = read_palette(substream, px, palette_len)?;
    let mut tile = TileWriter::new(pos, size);
    let area = tile.area();
    let mut written = 0usize;

    while written < area {
        let index_byte = substream.read_u8().context("reading palette RLE index")?;
        let index = (index_byte & 0x7F) as usize;
        let argb = *palette
            .get(index)
            .ok_or_else(|| anyhow!("RLE index {} outside palette of {}", index, palette_len))?;

        // Bit 7 marks a run; otherwise the index stands for one pixel.
        let run = if index_byte & 0x80 != 0 {
            read_run_length(substream)?
        } else {
            1
        };
        if written + run > area {
            bail!("palette RLE run of {} overruns tile ({} of {} written)", run, written, area);
        }
        for _ in 0..run {
            tile.push(fb, argb)?;
        }
        written += run;
    }
    tile.finish()
}
