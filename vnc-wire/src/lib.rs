//! Wire-level RFB protocol: framed big-endian streams, message codecs,
//! handshake, VNC authentication, and the ZRLE compressed substream.
//!
//! This crate speaks the protocol; it holds no session state beyond the
//! zlib inflate context in [`zlib::ZrleInflator`]. The session engine in
//! `vnc-session` drives these pieces.

pub mod auth;
pub mod handshake;
pub mod io;
pub mod messages;
pub mod zlib;

pub use handshake::{ProtocolVersion, SecurityType, VersionQuirks};
pub use io::{RfbInStream, RfbOutStream};
pub use zlib::ZrleInflator;
