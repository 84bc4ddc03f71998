//! Rectangle decoders for the RFB encodings the client negotiates.
//!
//! Each server-to-client update rectangle names an encoding; [`Encoding`]
//! is the closed set this client understands, and [`Encoding::decode`]
//! consumes exactly that rectangle's payload from the stream, writing
//! ARGB pixels into the [`Framebuffer`].
//!
//! Decoders are infallible about bounds: a rectangle outside the
//! framebuffer, a subrect escaping its rectangle, or a tile run past its
//! area all fail without touching out-of-range pixels. A decoder never
//! reads beyond its declared on-wire size, so one malformed rectangle
//! cannot desynchronize the message stream silently - it fails instead.
//!
//! ZRLE holds the session's single persistent zlib inflate state; the
//! caller owns the [`ZrleInflator`] and passes it in per rectangle.

use anyhow::{bail, Result};
use tokio::io::AsyncRead;
use vnc_framebuffer::Framebuffer;
use vnc_wire::io::RfbInStream;
use vnc_wire::messages::types::{
    ENCODING_COPY_RECT, ENCODING_CORRE, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_RRE,
    ENCODING_ZRLE,
};
use vnc_wire::messages::Rectangle;
use vnc_wire::ZrleInflator;

mod copyrect;
mod corre;
mod hextile;
mod pixel;
mod raw;
mod rre;
mod zrle;

pub use pixel::PixelDecoder;

/// The rectangle encodings this client can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    CopyRect,
    Rre,
    CoRre,
    Hextile,
    Zrle,
}

impl Encoding {
    /// Map a wire encoding id to a decoder, or `None` for ids this client
    /// does not understand.
    pub fn from_wire(id: i32) -> Option<Self> {
        match id {
            ENCODING_RAW => Some(Self::Raw),
            ENCODING_COPY_RECT => Some(Self::CopyRect),
            ENCODING_RRE => Some(Self::Rre),
            ENCODING_CORRE => Some(Self::CoRre),
            ENCODING_HEXTILE => Some(Self::Hextile),
            ENCODING_ZRLE => Some(Self::Zrle),
            _ => None,
        }
    }

    /// The wire id for this encoding.
    pub fn wire_id(self) -> i32 {
        match self {
            Self::Raw => ENCODING_RAW,
            Self::CopyRect => ENCODING_COPY_RECT,
            Self::Rre => ENCODING_RRE,
            Self::CoRre => ENCODING_CORRE,
            Self::Hextile => ENCODING_HEXTILE,
            Self::Zrle => ENCODING_ZRLE,
        }
    }

    /// Decode one rectangle's payload into the framebuffer.
    pub async fn decode<R: AsyncRead + Unpin>(
        self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        fb: &mut Framebuffer,
        substream: &mut ZrleInflator,
    ) -> Result<()> {
        check_bounds(rect, fb)?;
        let px = PixelDecoder::new(fb)?;

        tracing::trace!(
            target: "vnc_decoders::framing",
            encoding = ?self,
            x = rect.x,
            y = rect.y,
            w = rect.width,
            h = rect.height,
            "decoding rectangle"
        );

        match self {
            Self::Raw => raw::decode(stream, rect, &px, fb).await,
            Self::CopyRect => copyrect::decode(stream, rect, fb).await,
            Self::Rre => rre::decode(stream, rect, &px, fb).await,
            Self::CoRre => corre::decode(stream, rect, &px, fb).await,
            Self::Hextile => hextile::decode(stream, rect, &px, fb).await,
            Self::Zrle => zrle::decode(stream, rect, &px, fb, substream).await,
        }
    }
}

fn check_bounds(rect: &Rectangle, fb: &Framebuffer) -> Result<()> {
    if rect.x as u32 + rect.width as u32 > fb.width() as u32
        || rect.y as u32 + rect.height as u32 > fb.height() as u32
    {
        bail!(
            "rectangle ({}, {}) {}x{} overflows the {}x{} framebuffer",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            fb.width(),
            fb.height()
        );
    }
    Ok(())
}
