//! Typed RFB message codecs.
//!
//! Split by direction: [`client`] holds client-to-server messages,
//! [`server`] holds server-to-client messages, and [`types`] holds the
//! shared wire types (pixel format, rectangle header, constants).

pub mod client;
pub mod server;
pub mod types;

pub use client::{
    ClientCutText, ClientInit, FramebufferUpdateRequest, KeyEvent, PointerEvent, SetEncodings,
    SetPixelFormat,
};
pub use server::{
    FramebufferUpdateHeader, ServerCutText, ServerInit, SetColourMapEntries,
};
pub use types::{PixelFormat, Rectangle};
