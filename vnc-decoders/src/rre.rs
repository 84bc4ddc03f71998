//! RRE encoding (type 2) - background plus solid sub-rectangles.
//!
//! Wire layout: u32 subrect count, one background pixel, then per subrect
//! a pixel followed by u16 x, y, w, h relative to the rectangle. The
//! decoder fills the whole rectangle with the background and paints each
//! subrect over it.

use crate::pixel::PixelDecoder;
use anyhow::{bail, Context, Result};
use tokio::io::AsyncRead;
use vnc_core::Rect;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::Rectangle;

pub(crate) async fn decode<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
) -> Result<()> {
    let num_subrects = stream
        .read_u32()
        .await
        .context("reading RRE subrect count")?;
    let background = px
        .read_pixel(stream)
        .await
        .context("reading RRE background pixel")?;

    fb.fill_rect(
        Rect::from_u16(rect.x, rect.y, rect.width, rect.height),
        background,
    )?;

    for i in 0..num_subrects {
        let color = px
            .read_pixel(stream)
            .await
            .with_context(|| format!("reading pixel of RRE subrect {}", i))?;
        let sx = stream.read_u16().await?;
        let sy = stream.read_u16().await?;
        let sw = stream.read_u16().await?;
        let sh = stream.read_u16().await?;

        if sx as u32 + sw as u32 > rect.width as u32 || sy as u32 + sh as u32 > rect.height as u32 {
            bail!(
                "RRE subrect {} ({},{} {}x{}) escapes its {}x{} rectangle",
                i,
                sx,
                sy,
                sw,
                sh,
                rect.width,
                rect.height
            );
        }

        fb.fill_rect(
            Rect::new(
                rect.x as i32 + sx as i32,
                rect.y as i32 + sy as i32,
                sw as u32,
                sh as u32,
            ),
            color,
        )?;
    }

    Ok(())
}
