//! Hextile encoding (type 5) - 16x16 tiles with per-tile subencodings.
//!
//! The rectangle is walked as 16x16 tiles, row-major, with edge tiles
//! clipped. Each tile opens with a mask byte:
//!
//! - bit 0 `RAW`: the tile is raw pixels; every other bit is ignored
//! - bit 1 `BACKGROUND_SPECIFIED`: a new background pixel follows
//! - bit 2 `FOREGROUND_SPECIFIED`: a new foreground pixel follows
//! - bit 3 `ANY_SUBRECTS`: a u8 subrect count follows
//! - bit 4 `SUBRECTS_COLOURED`: each subrect carries its own pixel
//!
//! Background and foreground persist from tile to tile within one
//! rectangle. Each subrect is two packed bytes: position nibbles
//! `(xy >> 4, xy & 0xF)` and size nibbles `((wh >> 4) + 1, (wh & 0xF) + 1)`.

use crate::pixel::PixelDecoder;
use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncRead;
use vnc_core::Rect;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::Rectangle;

const RAW: u8 = 1 << 0;
const BACKGROUND_SPECIFIED: u8 = 1 << 1;
const FOREGROUND_SPECIFIED: u8 = 1 << 2;
const ANY_SUBRECTS: u8 = 1 << 3;
const SUBRECTS_COLOURED: u8 = 1 << 4;

const TILE_SIZE: u16 = 16;

pub(crate) async fn decode<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    px: &PixelDecoder,
    fb: &mut Framebuffer,
) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }

    // Background and foreground survive across tiles within this rectangle.
    let mut background: Option<u32> = None;
    let mut foreground: Option<u32> = None;

    let mut ty = 0u16;
    while ty < rect.height {
        let tile_h = TILE_SIZE.min(rect.height - ty);
        let mut tx = 0u16;
        while tx < rect.width {
            let tile_w = TILE_SIZE.min(rect.width - tx);
            let tile_x = rect.x + tx;
            let tile_y = rect.y + ty;

            let mask = stream.read_u8().await.with_context(|| {
                format!("reading hextile mask for tile ({}, {}) of rect at ({}, {})", tx, ty, rect.x, rect.y)
            })?;

            if mask & RAW != 0 {
                for y in 0..tile_h {
                    for x in 0..tile_w {
                        let argb = px.read_pixel(stream).await.with_context(|| {
                            format!("reading raw hextile pixel in tile ({}, {})", tx, ty)
                        })?;
                        fb.set_pixel(tile_x + x, tile_y + y, argb)?;
                    }
                }
                tx += TILE_SIZE;
                continue;
            }

            if mask & FOREGROUND_SPECIFIED != 0 && mask & SUBRECTS_COLOURED != 0 {
                bail!(
                    "hextile tile ({}, {}) sets ForegroundSpecified together with SubrectsColoured",
                    tx,
                    ty
                );
            }

            if mask & BACKGROUND_SPECIFIED != 0 {
                background = Some(px.read_pixel(stream).await.with_context(|| {
                    format!("reading hextile background in tile ({}, {})", tx, ty)
                })?);
            }
            let bg = background.ok_or_else(|| {
                anyhow!(
                    "hextile tile ({}, {}) needs a background but none was ever specified",
                    tx,
                    ty
                )
            })?;
            fb.fill_rect(Rect::from_u16(tile_x, tile_y, tile_w, tile_h), bg)?;

            if mask & FOREGROUND_SPECIFIED != 0 {
                foreground = Some(px.read_pixel(stream).await.with_context(|| {
                    format!("reading hextile foreground in tile ({}, {})", tx, ty)
                })?);
            }

            if mask & ANY_SUBRECTS != 0 {
                let count = stream.read_u8().await.with_context(|| {
                    format!("reading hextile subrect count in tile ({}, {})", tx, ty)
                })?;
                let coloured = mask & SUBRECTS_COLOURED != 0;

                for i in 0..count {
                    let color = if coloured {
                        px.read_pixel(stream).await.with_context(|| {
                            format!("reading pixel of hextile subrect {} in tile ({}, {})", i, tx, ty)
                        })?
                    } else {
                        foreground.ok_or_else(|| {
                            anyhow!(
                                "hextile tile ({}, {}) has plain subrects but no foreground",
                                tx,
                                ty
                            )
                        })?
                    };

                    let xy = stream.read_u8().await?;
                    let wh = stream.read_u8().await?;
                    let sx = (xy >> 4) as u16;
                    let sy = (xy & 0xF) as u16;
                    let sw = ((wh >> 4) + 1) as u16;
                    let sh = ((wh & 0xF) + 1) as u16;

                    if sx + sw > tile_w || sy + sh > tile_h {
                        bail!(
                            "hextile subrect {} ({},{} {}x{}) escapes its {}x{} tile",
                            i,
                            sx,
                            sy,
                            sw,
                            sh,
                            tile_w,
                            tile_h
                        );
                    }

                    fb.fill_rect(
                        Rect::from_u16(tile_x + sx, tile_y + sy, sw, sh),
                        color,
                    )?;
                }
            }

            tx += TILE_SIZE;
        }
        ty += TILE_SIZE;
    }

    Ok(())
}
