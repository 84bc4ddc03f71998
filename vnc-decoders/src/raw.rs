//! Raw encoding (type 0) - uncompressed pixel data.
//!
//! The simplest encoding: `width * height` pixels in the server's pixel
//! format, row-major. No compression, maximum bandwidth, trivial decode.

use crate::pixel::PixelDecoder;
use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::Rectangle;

pub(crate) async fn decode<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }

    let bpp = px.bytes_per_pixel();
    let row_bytes = rect.width as usize * bpp;
    let mut row = vec![0u8; row_bytes];

    for y in 0..rect.height {
        stream
            .read_bytes(&mut row)
            .await
            .with_context(|| format!("reading raw pixel row {} of rect at ({}, {})", y, rect.x, rect.y))?;
        for x in 0..rect.width {
            let offset = x as usize * bpp;
            let argb = px.decode(&row[offset..offset + bpp]);
            fb.set_pixel(rect.x + x, rect.y + y, argb)?;
        }
    }

    Ok(())
}
