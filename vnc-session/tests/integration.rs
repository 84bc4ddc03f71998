//! End-to-end session tests against a scripted in-process server.
//!
//! Each test binds a loopback listener, scripts the server side of the
//! conversation byte-for-byte with plain reads/writes, and drives the
//! session API from the client side.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vnc_core::Rect;
use vnc_session::{InputPolicy, SessionConfig, SessionEvent, SessionState, VncSession};

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// 16-byte big-endian RGB888 pixel format block.
const RGB888_BE: [u8; 16] = [
    32, 24, 1, 1, // bpp, depth, big_endian, true_color
    0, 255, 0, 255, 0, 255, // maxes
    16, 8, 0, // shifts
    0, 0, 0, // padding
];

async fn expect_update_request(server: &mut TcpStream, incremental: u8, w: u16, h: u16) {
    let mut req = [0u8; 10];
    server.read_exact(&mut req).await.unwrap();
    assert_eq!(req[0], 3, "expected FramebufferUpdateRequest");
    assert_eq!(req[1], incremental);
    assert_eq!(u16::from_be_bytes([req[6], req[7]]), w);
    assert_eq!(u16::from_be_bytes([req[8], req[9]]), h);
}

#[tokio::test]
async fn rfb33_handshake_without_auth() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.003\n").await.unwrap();

        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"RFB 003.003\n");

        // 3.3: the server dictates type None with a single u32.
        server.write_all(&1u32.to_be_bytes()).await.unwrap();

        // ClientInit arrives next.
        let mut shared = [0u8; 1];
        server.read_exact(&mut shared).await.unwrap();
        assert_eq!(shared[0], 1);
    });

    let mut session = VncSession::default();
    let needs_auth = session.connect("127.0.0.1", port).await.unwrap();
    assert!(!needs_auth);
    assert_eq!(session.state(), SessionState::Initializing);

    // Kick off initialize far enough for the server to see ClientInit.
    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        session.initialize(32, 24),
    )
    .await;
    server.await.unwrap();
}

#[tokio::test]
async fn rfb38_vnc_auth_succeeds() {
    let (listener, port) = listener().await;
    let challenge = [0u8; 16];
    let expected = vnc_wire::auth::encrypt_challenge("password", &challenge);

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.008\n").await.unwrap();

        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"RFB 003.008\n");

        // Offer None and VncAuth; VncAuth first so first-match picks it.
        server.write_all(&[2, 2, 1]).await.unwrap();

        let mut choice = [0u8; 1];
        server.read_exact(&mut choice).await.unwrap();
        assert_eq!(choice[0], 2);

        server.write_all(&challenge).await.unwrap();

        let mut response = [0u8; 16];
        server.read_exact(&mut response).await.unwrap();
        assert_eq!(response, expected, "DES response mismatch");

        server.write_all(&0u32.to_be_bytes()).await.unwrap();
    });

    let mut session = VncSession::default();
    let needs_auth = session.connect("127.0.0.1", port).await.unwrap();
    assert!(needs_auth);
    assert_eq!(session.state(), SessionState::AwaitingPassword);

    assert!(session.authenticate("password").await.unwrap());
    assert_eq!(session.state(), SessionState::Initializing);
    server.await.unwrap();
}

#[tokio::test]
async fn rfb38_vnc_auth_failure_reports_false() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.008\n").await.unwrap();
        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();

        server.write_all(&[1, 2]).await.unwrap();
        let mut choice = [0u8; 1];
        server.read_exact(&mut choice).await.unwrap();

        server.write_all(&[0xAB; 16]).await.unwrap();
        let mut response = [0u8; 16];
        server.read_exact(&mut response).await.unwrap();

        // Refuse, with a 3.8 reason string.
        server.write_all(&1u32.to_be_bytes()).await.unwrap();
        server.write_all(&12u32.to_be_bytes()).await.unwrap();
        server.write_all(b"bad password").await.unwrap();
    });

    let mut session = VncSession::default();
    assert!(session.connect("127.0.0.1", port).await.unwrap());
    assert!(!session.authenticate("wrong").await.unwrap());
    // Refusal closes the socket and spends the session.
    assert_eq!(session.state(), SessionState::Disconnected);
    server.await.unwrap();
}

/// Full happy path: init, raw update decode, refresh protocol, bell, cut
/// text, disconnect.
#[tokio::test]
async fn update_loop_mirrors_the_screen() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.008\n").await.unwrap();
        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();

        server.write_all(&[1, 1]).await.unwrap();
        let mut choice = [0u8; 1];
        server.read_exact(&mut choice).await.unwrap();
        assert_eq!(choice[0], 1);
        server.write_all(&0u32.to_be_bytes()).await.unwrap();

        // ClientInit.
        let mut shared = [0u8; 1];
        server.read_exact(&mut shared).await.unwrap();

        // ServerInit: 4x4 desktop named "itest".
        server.write_all(&4u16.to_be_bytes()).await.unwrap();
        server.write_all(&4u16.to_be_bytes()).await.unwrap();
        server.write_all(&RGB888_BE).await.unwrap();
        server.write_all(&5u32.to_be_bytes()).await.unwrap();
        server.write_all(b"itest").await.unwrap();

        // SetEncodings: type, pad, count 5, then [16, 5, 2, 1, 0].
        let mut set_encodings = [0u8; 24];
        server.read_exact(&mut set_encodings).await.unwrap();
        assert_eq!(set_encodings[0], 2);
        assert_eq!(u16::from_be_bytes([set_encodings[2], set_encodings[3]]), 5);
        let ids: Vec<i32> = set_encodings[4..]
            .chunks(4)
            .map(|c| i32::from_be_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(ids, vec![16, 5, 2, 1, 0]);

        // Reader starts with a full-screen request.
        expect_update_request(&mut server, 0, 4, 4).await;

        // One raw 2x2 rectangle at (1, 1).
        server.write_all(&[0, 0, 0, 1]).await.unwrap(); // update, pad, 1 rect
        server.write_all(&1u16.to_be_bytes()).await.unwrap();
        server.write_all(&1u16.to_be_bytes()).await.unwrap();
        server.write_all(&2u16.to_be_bytes()).await.unwrap();
        server.write_all(&2u16.to_be_bytes()).await.unwrap();
        server.write_all(&0i32.to_be_bytes()).await.unwrap();
        server
            .write_all(&[
                0x00, 0x00, 0x00, 0xFF, //
                0x00, 0x00, 0xFF, 0x00, //
                0x00, 0xFF, 0x00, 0x00, //
                0xFF, 0x00, 0x00, 0x00,
            ])
            .await
            .unwrap();

        // The follow-up request is incremental.
        expect_update_request(&mut server, 1, 4, 4).await;

        // Bell, then clipboard text.
        server.write_all(&[2]).await.unwrap();
        server.write_all(&[3, 0, 0, 0]).await.unwrap();
        server.write_all(&2u32.to_be_bytes()).await.unwrap();
        server.write_all(b"hi").await.unwrap();

        // Disconnect wakes the reader with a 1x1 incremental request.
        expect_update_request(&mut server, 1, 1, 1).await;
        // Any byte unblocks the reader so it can observe the done flag.
        server.write_all(&[2]).await.unwrap();
    });

    let mut session = VncSession::default();
    assert!(!session.connect("127.0.0.1", port).await.unwrap());
    session.initialize(32, 24).await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);

    let events = session.events();
    session.start_updates().unwrap();

    assert_eq!(
        events.recv_async().await.unwrap(),
        SessionEvent::Update(Rect::new(1, 1, 2, 2))
    );

    // The decoded pixels are in the mirror by the time the event lands.
    {
        let fb = session.framebuffer().unwrap();
        let fb = fb.lock().await;
        assert_eq!(fb.name(), "itest");
        assert_eq!(fb.pixel(1, 1).unwrap(), 0xFF0000FF);
        assert_eq!(fb.pixel(2, 1).unwrap(), 0xFF00FF00);
        assert_eq!(fb.pixel(1, 2).unwrap(), 0xFFFF0000);
        assert_eq!(fb.pixel(2, 2).unwrap(), 0xFF000000);
        assert_eq!(fb.pixel(0, 0).unwrap(), 0, "bell must not touch pixels");
    }

    assert_eq!(events.recv_async().await.unwrap(), SessionEvent::Bell);
    assert_eq!(
        events.recv_async().await.unwrap(),
        SessionEvent::ServerCutText("hi".to_string())
    );

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    server.await.unwrap();
}

/// Input events reach the wire, and view-only drops them.
#[tokio::test]
async fn input_events_respect_the_policy() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.008\n").await.unwrap();
        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();
        server.write_all(&[1, 1]).await.unwrap();
        let mut choice = [0u8; 1];
        server.read_exact(&mut choice).await.unwrap();
        server.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut shared = [0u8; 1];
        server.read_exact(&mut shared).await.unwrap();
        server.write_all(&8u16.to_be_bytes()).await.unwrap();
        server.write_all(&8u16.to_be_bytes()).await.unwrap();
        server.write_all(&RGB888_BE).await.unwrap();
        server.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut set_encodings = [0u8; 24];
        server.read_exact(&mut set_encodings).await.unwrap();

        // KeyEvent: 'a' down.
        let mut key = [0u8; 8];
        server.read_exact(&mut key).await.unwrap();
        assert_eq!(key[0], 4);
        assert_eq!(key[1], 1);
        assert_eq!(u32::from_be_bytes(key[4..].try_into().unwrap()), 0x61);

        // PointerEvent: left button at (10, 20).
        let mut pointer = [0u8; 6];
        server.read_exact(&mut pointer).await.unwrap();
        assert_eq!(pointer[0], 5);
        assert_eq!(pointer[1], 1);
        assert_eq!(u16::from_be_bytes([pointer[2], pointer[3]]), 10);
        assert_eq!(u16::from_be_bytes([pointer[4], pointer[5]]), 20);

        // View-only drops key and pointer, so the next message is the
        // cut text.
        let mut cut = [0u8; 10];
        server.read_exact(&mut cut).await.unwrap();
        assert_eq!(cut[0], 6);
        assert_eq!(u32::from_be_bytes(cut[4..8].try_into().unwrap()), 2);
        assert_eq!(&cut[8..], b"ok");
    });

    let mut session = VncSession::default();
    assert!(!session.connect("127.0.0.1", port).await.unwrap());
    session.initialize(32, 24).await.unwrap();

    session.write_key_event(0x61, true).await.unwrap();
    session.write_pointer_event(1, 10, 20).await.unwrap();

    session.set_input_policy(InputPolicy::ViewOnly);
    session.write_key_event(0x62, true).await.unwrap();
    session.write_pointer_event(2, 30, 40).await.unwrap();
    // Cut text passes through view-only.
    session.write_client_cut_text("ok").await.unwrap();

    server.await.unwrap();
}

/// An unknown server message type is fatal and surfaces as
/// ConnectionLost, exactly once.
#[tokio::test]
async fn unknown_message_type_loses_the_connection() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(b"RFB 003.008\n").await.unwrap();
        let mut reply = [0u8; 12];
        server.read_exact(&mut reply).await.unwrap();
        server.write_all(&[1, 1]).await.unwrap();
        let mut choice = [0u8; 1];
        server.read_exact(&mut choice).await.unwrap();
        server.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut shared = [0u8; 1];
        server.read_exact(&mut shared).await.unwrap();
        server.write_all(&4u16.to_be_bytes()).await.unwrap();
        server.write_all(&4u16.to_be_bytes()).await.unwrap();
        server.write_all(&RGB888_BE).await.unwrap();
        server.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut set_encodings = [0u8; 24];
        server.read_exact(&mut set_encodings).await.unwrap();

        let mut req = [0u8; 10];
        server.read_exact(&mut req).await.unwrap();

        // 99 is not a server message type.
        server.write_all(&[99]).await.unwrap();
    });

    let mut session = VncSession::default();
    assert!(!session.connect("127.0.0.1", port).await.unwrap());
    session.initialize(32, 24).await.unwrap();

    let events = session.events();
    session.start_updates().unwrap();

    assert_eq!(
        events.recv_async().await.unwrap(),
        SessionEvent::ConnectionLost
    );
    server.await.unwrap();
}
