//! CopyRect encoding (type 1) - copy a region already on screen.
//!
//! Only 4 bytes travel on the wire: the source coordinates. The rectangle
//! header names the destination. Used for window drags and scrolls;
//! source and destination frequently overlap, which
//! [`Framebuffer::copy_rect`] handles with move semantics.

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use vnc_core::Rect;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::Rectangle;

pub(crate) async fn decode<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    fb: &mut Framebuffer,
) -> Result<()> {
    let src_x = stream
        .read_u16()
        .await
        .context("reading CopyRect source x")?;
    let src_y = stream
        .read_u16()
        .await
        .context("reading CopyRect source y")?;

    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }

    let dst = Rect::from_u16(rect.x, rect.y, rect.width, rect.height);
    fb.copy_rect(dst, src_x, src_y)
        .with_context(|| format!("CopyRect from ({}, {})", src_x, src_y))
}
