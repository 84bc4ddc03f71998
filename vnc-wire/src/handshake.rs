//! RFB protocol handshake.
//!
//! Implements the client side of the three-phase RFB handshake:
//!
//! 1. **Protocol version negotiation** - parse the server's 12-byte banner,
//!    pick a minor version from {3, 7, 8}, reply in kind
//! 2. **Security negotiation** - select a security type (None or VNC
//!    authentication) from the server's offer
//! 3. **Initialization** - ClientInit / ServerInit (see [`crate::messages`])
//!
//! # Version mapping
//!
//! The server banner `RFB 003.00N\n` maps to minors {3, 3, 7, 8, 8} for
//! N in {3, 6, 7, 8, 9}; `RFB 004.001\n` is treated as 3.8. Nonstandard
//! banners go through a quirk table first - by default Apple's
//! `RFB 003.889\n` maps to 3.8, and hosts can remap it.
//!
//! A banner of `RFB 000.000\n` indicates a VNC repeater in front of the
//! real server: the client writes a 250-byte proxy-address frame and reads
//! the banner again.
//!
//! # Security rules
//!
//! On 3.3 the server dictates the type with a single u32. On 3.7+ the
//! server offers a list and the client picks the FIRST type it supports in
//! server order, then writes its choice back. A SecurityResult follows
//! every authentication exchange; after type None it follows only on 3.8.

use crate::io::{RfbInStream, RfbOutStream};
use crate::messages::types::{SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};

/// Length of the repeater proxy-address frame.
const REPEATER_FRAME_LEN: usize = 250;

/// Negotiated RFB protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// RFB 3.3 - the server dictates the security type.
    V3_3,
    /// RFB 3.7 - security list, but no SecurityResult after type None.
    V3_7,
    /// RFB 3.8 - security list and a SecurityResult in every path.
    V3_8,
}

impl ProtocolVersion {
    /// The minor version number sent back to the server.
    pub fn minor(self) -> u8 {
        match self {
            Self::V3_3 => 3,
            Self::V3_7 => 7,
            Self::V3_8 => 8,
        }
    }

    fn from_minor(minor: u8) -> Option<Self> {
        match minor {
            3 => Some(Self::V3_3),
            7 => Some(Self::V3_7),
            8 => Some(Self::V3_8),
            _ => None,
        }
    }
}

/// Security type negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    /// No authentication.
    None,
    /// DES challenge-response against the session password.
    VncAuth,
}

impl SecurityType {
    /// The wire byte for this type.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::None => SECURITY_TYPE_NONE,
            Self::VncAuth => SECURITY_TYPE_VNC_AUTH,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SECURITY_TYPE_NONE => Some(Self::None),
            SECURITY_TYPE_VNC_AUTH => Some(Self::VncAuth),
            _ => None,
        }
    }
}

/// Overrides for nonstandard version banners.
///
/// Maps the 7-character `xxx.yyy` portion of a banner to the minor version
/// the client should negotiate. The default carries the Apple quirk
/// (`003.889` negotiates as 3.8).
#[derive(Debug, Clone)]
pub struct VersionQuirks {
    map: HashMap<String, u8>,
}

impl Default for VersionQuirks {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("003.889".to_string(), 8);
        Self { map }
    }
}

impl VersionQuirks {
    /// Build a quirk table from explicit banner-to-minor entries.
    pub fn from_entries(entries: &HashMap<String, u8>) -> Self {
        Self {
            map: entries.clone(),
        }
    }

    fn lookup(&self, version_part: &str) -> Option<u8> {
        self.map.get(version_part).copied()
    }
}

/// Negotiate the protocol version with the server.
///
/// Handles the repeater indirection transparently: when the server
/// announces `RFB 000.000\n`, `repeater_proxy_id` is written as a
/// 250-byte frame and the banner is read again. A repeater indication
/// without a configured proxy id fails.
pub async fn negotiate_version<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    quirks: &VersionQuirks,
    repeater_proxy_id: Option<&str>,
) -> std::io::Result<ProtocolVersion> {
    let mut banner = [0u8; 12];
    instream.read_bytes(&mut banner).await?;

    if &banner == b"RFB 000.000\n" {
        let proxy = repeater_proxy_id.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "server is a VNC repeater but no proxy id is configured",
            )
        })?;
        write_repeater_frame(outstream, proxy)?;
        outstream.flush().await?;
        instream.read_bytes(&mut banner).await?;
    }

    let version = parse_banner(&banner, quirks)?;

    outstream.write_bytes(format!("RFB 003.00{}\n", version.minor()).as_bytes());
    outstream.flush().await?;

    tracing::debug!(minor = version.minor(), "negotiated RFB version");
    Ok(version)
}

fn write_repeater_frame<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    proxy_id: &str,
) -> std::io::Result<()> {
    let header = format!("ID:{}\n", proxy_id);
    if header.len() > REPEATER_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("repeater proxy id too long ({} bytes)", proxy_id.len()),
        ));
    }
    outstream.write_bytes(header.as_bytes());
    outstream.write_padding(REPEATER_FRAME_LEN - header.len());
    Ok(())
}

fn parse_banner(banner: &[u8; 12], quirks: &VersionQuirks) -> std::io::Result<ProtocolVersion> {
    let invalid = |detail: String| std::io::Error::new(std::io::ErrorKind::InvalidData, detail);

    if &banner[0..4] != b"RFB " || banner[7] != b'.' || banner[11] != b'\n' {
        return Err(invalid(format!(
            "malformed RFB version banner: {:?}",
            String::from_utf8_lossy(banner)
        )));
    }

    let version_part = std::str::from_utf8(&banner[4..11])
        .map_err(|_| invalid(format!("non-ASCII version banner: {:?}", banner)))?;

    if let Some(minor) = quirks.lookup(version_part) {
        return ProtocolVersion::from_minor(minor).ok_or_else(|| {
            invalid(format!(
                "version quirk for {:?} names unsupported minor {}",
                version_part, minor
            ))
        });
    }

    let major: u32 = version_part[..3]
        .parse()
        .map_err(|_| invalid(format!("bad major version in banner {:?}", version_part)))?;
    let minor: u32 = version_part[4..]
        .parse()
        .map_err(|_| invalid(format!("bad minor version in banner {:?}", version_part)))?;

    let negotiated = match (major, minor) {
        (3, 3..=6) => ProtocolVersion::V3_3,
        (3, 7) => ProtocolVersion::V3_7,
        (3, m) if m >= 8 => ProtocolVersion::V3_8,
        (4, 1) => ProtocolVersion::V3_8,
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!(
                    "unsupported RFB protocol version {}.{} (banner {:?})",
                    major,
                    minor,
                    String::from_utf8_lossy(banner)
                ),
            ))
        }
    };
    Ok(negotiated)
}

/// Negotiate the security type.
///
/// Returns the chosen type; for [`SecurityType::VncAuth`] the caller must
/// follow up with the challenge-response exchange and a SecurityResult
/// read. For [`SecurityType::None`] a SecurityResult follows only on 3.8
/// ([`read_security_result`]).
pub async fn negotiate_security<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    version: ProtocolVersion,
) -> std::io::Result<SecurityType> {
    match version {
        ProtocolVersion::V3_3 => {
            // The server dictates a single u32 type.
            let raw = instream.read_u32().await?;
            if raw == 0 {
                return Err(rejection(instream, "server rejected the connection").await);
            }
            let byte = u8::try_from(raw).ok().and_then(SecurityType::from_byte);
            byte.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("server dictated unsupported security type {}", raw),
                )
            })
        }
        ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => {
            let count = instream.read_u8().await?;
            if count == 0 {
                return Err(rejection(instream, "server offered no security types").await);
            }

            let offered = instream.read_bytes_vec(count as usize).await?;
            // First supported type in server order wins.
            let chosen = offered
                .iter()
                .find_map(|&b| SecurityType::from_byte(b))
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        format!("no supported security type offered (server sent {:?})", offered),
                    )
                })?;

            outstream.write_u8(chosen.to_byte());
            outstream.flush().await?;
            tracing::debug!(?chosen, "selected security type");
            Ok(chosen)
        }
    }
}

/// Read a SecurityResult word (0 = ok).
///
/// On 3.8 a failure carries a reason string, which is folded into the
/// returned error; earlier versions fail without one.
pub async fn read_security_result<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    version: ProtocolVersion,
) -> std::io::Result<()> {
    let result = instream.read_u32().await?;
    if result == 0 {
        return Ok(());
    }

    if version == ProtocolVersion::V3_8 {
        Err(rejection(instream, "security handshake failed").await)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("security handshake failed (result {})", result),
        ))
    }
}

/// Consume a u32-length-prefixed reason string and build the error.
async fn rejection<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    context: &str,
) -> std::io::Error {
    let reason = match read_reason(instream).await {
        Ok(r) => r,
        Err(e) => return e,
    };
    std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        format!("{}: {}", context, reason),
    )
}

async fn read_reason<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
) -> std::io::Result<String> {
    let len = instream.read_u32().await? as usize;
    let bytes = instream.read_bytes_vec(len).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    type DuplexIn = RfbInStream<tokio::io::DuplexStream>;
    type DuplexOut = RfbOutStream<tokio::io::DuplexStream>;

    fn duplex_pair() -> ((DuplexIn, DuplexOut), (DuplexIn, DuplexOut)) {
        let (client_read, server_write) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::duplex(4096);
        (
            (RfbInStream::new(client_read), RfbOutStream::new(client_write)),
            (RfbInStream::new(server_read), RfbOutStream::new(server_write)),
        )
    }

    async fn client_version(
        client: &mut (DuplexIn, DuplexOut),
    ) -> std::io::Result<ProtocolVersion> {
        negotiate_version(&mut client.0, &mut client.1, &VersionQuirks::default(), None).await
    }

    #[tokio::test]
    async fn version_3_8() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 003.008\n");
        server.1.flush().await.unwrap();

        assert_eq!(client_version(&mut client).await.unwrap(), ProtocolVersion::V3_8);

        let mut reply = [0u8; 12];
        server.0.read_bytes(&mut reply).await.unwrap();
        assert_eq!(&reply, b"RFB 003.008\n");
    }

    #[tokio::test]
    async fn version_3_3_and_3_6_negotiate_down() {
        for banner in [b"RFB 003.003\n", b"RFB 003.006\n"] {
            let (mut client, mut server) = duplex_pair();
            server.1.write_bytes(banner);
            server.1.flush().await.unwrap();

            assert_eq!(client_version(&mut client).await.unwrap(), ProtocolVersion::V3_3);

            let mut reply = [0u8; 12];
            server.0.read_bytes(&mut reply).await.unwrap();
            assert_eq!(&reply, b"RFB 003.003\n");
        }
    }

    #[tokio::test]
    async fn version_3_7() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 003.007\n");
        server.1.flush().await.unwrap();
        assert_eq!(client_version(&mut client).await.unwrap(), ProtocolVersion::V3_7);
    }

    #[tokio::test]
    async fn version_4_1_treated_as_3_8() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 004.001\n");
        server.1.flush().await.unwrap();
        assert_eq!(client_version(&mut client).await.unwrap(), ProtocolVersion::V3_8);
    }

    #[tokio::test]
    async fn apple_banner_quirk() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 003.889\n");
        server.1.flush().await.unwrap();
        assert_eq!(client_version(&mut client).await.unwrap(), ProtocolVersion::V3_8);
    }

    #[tokio::test]
    async fn unsupported_version_rejected() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 002.002\n");
        server.1.flush().await.unwrap();

        let err = client_version(&mut client).await.unwrap_err();
        assert!(err.to_string().contains("2.2"));
    }

    #[tokio::test]
    async fn repeater_writes_proxy_frame() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 000.000\n");
        server.1.write_bytes(b"RFB 003.008\n");
        server.1.flush().await.unwrap();

        let version = negotiate_version(
            &mut client.0,
            &mut client.1,
            &VersionQuirks::default(),
            Some("1234"),
        )
        .await
        .unwrap();
        assert_eq!(version, ProtocolVersion::V3_8);

        let mut frame = [0u8; 250];
        server.0.read_bytes(&mut frame).await.unwrap();
        assert_eq!(&frame[..8], b"ID:1234\n");
        assert!(frame[8..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn repeater_without_proxy_id_fails() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_bytes(b"RFB 000.000\n");
        server.1.flush().await.unwrap();

        assert!(client_version(&mut client).await.is_err());
    }

    #[tokio::test]
    async fn security_3_3_server_dictates() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u32(1);
        server.1.flush().await.unwrap();

        let chosen = negotiate_security(&mut client.0, &mut client.1, ProtocolVersion::V3_3)
            .await
            .unwrap();
        assert_eq!(chosen, SecurityType::None);
    }

    #[tokio::test]
    async fn security_3_3_rejection_reads_reason() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u32(0);
        server.1.write_u32(7);
        server.1.write_bytes(b"go away");
        server.1.flush().await.unwrap();

        let err = negotiate_security(&mut client.0, &mut client.1, ProtocolVersion::V3_3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("go away"));
    }

    #[tokio::test]
    async fn security_3_8_first_match_in_server_order() {
        // Server lists None before VncAuth: first match wins, so the
        // client negotiates None even though a password would be stronger.
        let (mut client, mut server) = duplex_pair();
        server.1.write_u8(2);
        server.1.write_bytes(&[1, 2]);
        server.1.flush().await.unwrap();

        let chosen = negotiate_security(&mut client.0, &mut client.1, ProtocolVersion::V3_8)
            .await
            .unwrap();
        assert_eq!(chosen, SecurityType::None);
        assert_eq!(server.0.read_u8().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn security_3_8_skips_unknown_types() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u8(3);
        server.1.write_bytes(&[19, 2, 1]); // unknown, VncAuth, None
        server.1.flush().await.unwrap();

        let chosen = negotiate_security(&mut client.0, &mut client.1, ProtocolVersion::V3_8)
            .await
            .unwrap();
        assert_eq!(chosen, SecurityType::VncAuth);
        assert_eq!(server.0.read_u8().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn security_empty_list_is_rejection() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u8(0);
        server.1.write_u32(4);
        server.1.write_bytes(b"full");
        server.1.flush().await.unwrap();

        let err = negotiate_security(&mut client.0, &mut client.1, ProtocolVersion::V3_8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn security_result_ok() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u32(0);
        server.1.flush().await.unwrap();
        read_security_result(&mut client.0, ProtocolVersion::V3_8)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn security_result_failure_3_8_carries_reason() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u32(1);
        server.1.write_u32(12);
        server.1.write_bytes(b"bad password");
        server.1.flush().await.unwrap();

        let err = read_security_result(&mut client.0, ProtocolVersion::V3_8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad password"));
    }

    #[tokio::test]
    async fn security_result_failure_3_7_no_reason() {
        let (mut client, mut server) = duplex_pair();
        server.1.write_u32(1);
        server.1.flush().await.unwrap();

        let err = read_security_result(&mut client.0, ProtocolVersion::V3_7)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
