//! CoRRE encoding (type 4) - RRE with byte-sized subrect coordinates.
//!
//! Identical to RRE except subrect position and size are single bytes,
//! which bounds the rectangle itself to 255x255. The client decodes it
//! but never advertises it; enough servers ship broken CoRRE encoders
//! that requesting it is not worth the four saved bytes per subrect.

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
    if rect.width > 255 || rect.height > 255 {
        bail!(
            "CoRRE rectangle {}x{} exceeds the 255x255 encoding limit",
            rect.width,
            rect.height
        );
    }

    let num_subrects = stream
        .read_u32()
        .await
        .context("reading CoRRE subrect count")?;
    let background = px
        .read_pixel(stream)
        .await
        .context("reading CoRRE background pixel")?;

    fb.fill_rect(
        Rect::from_u16(rect.x, rect.y, rect.width, rect.height),
        background,
    )?;

    for i in 0..num_subrects {
        let color = px
            .read_pixel(stream)
            .await
            .with_context(|| format!("reading pixel of CoRRE subrect {}", i))?;
        let sx = stream.read_u8().await? as u16;
        let sy = stream.read_u8().await? as u16;
        let sw = stream.read_u8().await? as u16;
        let sh = stream.read_u8().await? as u16;

        if sx + sw > rect.width || sy + sh > rect.height {
            bail!(
                "CoRRE subrect {} ({},{} {}x{}) escapes its {}x{} rectangle",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rgb888_be_framebuffer, stream_of};

    #[tokio::test]
    async fn byte_coordinates() {
        let mut fb = rgb888_be_framebuffer(8, 8);
        let px = PixelDecoder::new(&fb).unwrap();
        let rect = Rectangle {
            x: 2,
            y: 2,
            width: 4,
            height: 4,
            encoding: 4,
        };

        let mut wire = Vec::new();
        wire.extend_from_slice(&1u32.to_be_bytes());
        wire.extend_from_slice(&[0x00, 0xFF, 0xFF, 0xFF]); // bg = white
        wire.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]); // subrect = green
        wire.extend_from_slice(&[1, 2, 2, 1]); // x, y, w, h as bytes

        let mut stream = stream_of(&wire);
        decode(&mut stream, &rect, &px, &mut fb).await.unwrap();

        assert_eq!(fb.pixel(2, 2).unwrap(), 0xFFFFFFFF);
        assert_eq!(fb.pixel(3, 4).unwrap(), 0xFF00FF00);
        assert_eq!(fb.pixel(4, 4).unwrap(), 0xFF00FF00);
        assert_eq!(fb.pixel(5, 4).unwrap(), 0xFFFFFFFF);
    }

    #[tokio::test]
    async fn oversize_rectangle_rejected() {
        let mut fb = rgb888_be_framebuffer(300, 300);
        let px = PixelDecoder::new(&fb).unwrap();
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 256,
            height: 10,
            encoding: 4,
        };
        let mut stream = stream_of(&[]);
        assert!(decode(&mut stream, &rect, &px, &mut fb).await.is_err());
    }
}
