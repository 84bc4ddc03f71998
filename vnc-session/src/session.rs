//! The session engine: connection lifecycle, handshake driving, the
//! background reader task, and outbound input events.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()-->        Connecting
//! Connecting   --ok, no auth-->      Initializing
//! Connecting   --ok, auth needed-->  AwaitingPassword
//! AwaitingPassword --authenticate--> Initializing
//! Initializing --initialize()-->     Connected
//! Connected    --disconnect()/err--> Disconnecting
//! Disconnecting --reader joined-->   Disconnected
//! ```
//!
//! Sessions are single-shot: once torn down, a session cannot reconnect;
//! build a new one.
//!
//! # Concurrency
//!
//! Two contexts touch the connection. The caller's context runs the
//! handshake operations and the `write_*` input methods; the reader task
//! spawned by [`VncSession::start_updates`] exclusively owns the read
//! half, the ZRLE inflate state, and the framebuffer during decodes. The
//! write half sits behind a mutex, so the reader's update requests and
//! the caller's input events serialize cleanly. The only other shared
//! state is a pair of atomic flags: `done` (cooperative cancellation,
//! checked between messages and between rectangles) and
//! `full_screen_refresh` (set by the host, consumed by the reader when it
//! builds the next update request).

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::events::SessionEvent;
use crate::input::InputPolicy;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use vnc_core::Rect;
use vnc_decoders::Encoding;
use vnc_framebuffer::Framebuffer;
use vnc_wire::handshake::{
    self, ProtocolVersion, SecurityType, VersionQuirks,
};
use vnc_wire::io::{RfbInStream, RfbOutStream};
use vnc_wire::messages::server::{
    SERVER_MSG_BELL, SERVER_MSG_CUT_TEXT, SERVER_MSG_FRAMEBUFFER_UPDATE,
    SERVER_MSG_SET_COLOUR_MAP_ENTRIES,
};
use vnc_wire::messages::types::ADVERTISED_ENCODINGS;
use vnc_wire::messages::{
    ClientCutText, ClientInit, FramebufferUpdateHeader, FramebufferUpdateRequest, KeyEvent,
    PixelFormat, PointerEvent, Rectangle, ServerCutText, ServerInit, SetColourMapEntries,
    SetEncodings, SetPixelFormat,
};
use vnc_wire::{auth, ZrleInflator};

/// Shared handle to the session framebuffer.
///
/// The reader task locks it per rectangle; the host locks it to read
/// pixels after an [`SessionEvent::Update`].
pub type FramebufferHandle = Arc<tokio::sync::Mutex<Framebuffer>>;

type Reader = RfbInStream<OwnedReadHalf>;
type Writer = Arc<tokio::sync::Mutex<RfbOutStream<OwnedWriteHalf>>>;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingPassword,
    Initializing,
    Connected,
    Disconnecting,
}

/// An RFB client session over one TCP connection.
pub struct VncSession {
    config: SessionConfig,
    state: SessionState,
    spent: bool,
    input_policy: InputPolicy,
    events_tx: flume::Sender<SessionEvent>,
    events_rx: flume::Receiver<SessionEvent>,
    version: Option<ProtocolVersion>,
    input: Option<Reader>,
    writer: Option<Writer>,
    framebuffer: Option<FramebufferHandle>,
    done: Arc<AtomicBool>,
    full_screen_refresh: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl Default for VncSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl VncSession {
    pub fn new(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        let input_policy = if config.view_only {
            InputPolicy::ViewOnly
        } else {
            InputPolicy::Full
        };
        Self {
            config,
            state: SessionState::Disconnected,
            spent: false,
            input_policy,
            events_tx,
            events_rx,
            version: None,
            input: None,
            writer: None,
            framebuffer: None,
            done: Arc::new(AtomicBool::new(false)),
            full_screen_refresh: Arc::new(AtomicBool::new(false)),
            lost: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The event stream fed by the reader task. Clone freely; flume
    /// receivers share the queue.
    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Handle to the framebuffer, available once `initialize` succeeds.
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer.clone()
    }

    /// Swap the input policy (view-only toggle) at runtime.
    pub fn set_input_policy(&mut self, policy: InputPolicy) {
        self.input_policy = policy;
    }

    pub fn input_policy(&self) -> InputPolicy {
        self.input_policy
    }

    /// Make the reader's next update request non-incremental, forcing the
    /// server to resend the whole screen.
    pub fn request_full_refresh(&self) {
        self.full_screen_refresh.store(true, Ordering::Release);
    }

    /// Open the TCP connection and run version and security negotiation.
    ///
    /// Returns whether the server requires a password; if it does, the
    /// next call must be [`authenticate`](Self::authenticate), otherwise
    /// [`initialize`](Self::initialize).
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<bool, SessionError> {
        if self.spent {
            return Err(SessionError::InvalidState(
                "sessions are single-shot; build a new one".to_string(),
            ));
        }
        self.expect_state(SessionState::Disconnected, "connect")?;
        if host.is_empty() {
            return Err(SessionError::InvalidArgument("empty host".to_string()));
        }

        self.state = SessionState::Connecting;
        match self.connect_inner(host, port).await {
            Ok(needs_auth) => {
                self.state = if needs_auth {
                    SessionState::AwaitingPassword
                } else {
                    SessionState::Initializing
                };
                Ok(needs_auth)
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    async fn connect_inner(&mut self, host: &str, port: u16) -> Result<bool, SessionError> {
        let io_timeout = self.config.io_timeout();

        let stream = timed(io_timeout, TcpStream::connect((host, port)))
            .await?
            .map_err(|e| SessionError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;
        // Input events are tiny packets; never let Nagle hold them back.
        stream
            .set_nodelay(true)
            .map_err(|e| SessionError::ConnectionFailed(format!("set_nodelay: {}", e)))?;

        let (read_half, write_half) = stream.into_split();
        let mut input = RfbInStream::new(read_half);
        let mut output = RfbOutStream::new(write_half);

        let quirks = VersionQuirks::from_entries(&self.config.version_quirks);
        let version = timed(
            io_timeout,
            handshake::negotiate_version(
                &mut input,
                &mut output,
                &quirks,
                self.config.repeater_proxy_id.as_deref(),
            ),
        )
        .await?
        .map_err(|e| SessionError::Handshake(e.to_string()))?;
        tracing::info!(minor = version.minor(), host, port, "RFB version negotiated");

        let security = timed(
            io_timeout,
            handshake::negotiate_security(&mut input, &mut output, version),
        )
        .await?
        .map_err(|e| SessionError::Security(e.to_string()))?;

        // Type None is confirmed by a SecurityResult on 3.8 only; the
        // VncAuth result is read in authenticate().
        if security == SecurityType::None && version == ProtocolVersion::V3_8 {
            timed(io_timeout, handshake::read_security_result(&mut input, version))
                .await?
                .map_err(|e| SessionError::Security(e.to_string()))?;
        }

        self.version = Some(version);
        self.input = Some(input);
        self.writer = Some(Arc::new(tokio::sync::Mutex::new(output)));
        Ok(security == SecurityType::VncAuth)
    }

    /// Run the VNC DES challenge-response.
    ///
    /// Returns `false` when the server refuses the password; the socket
    /// is closed in that case and the host must build a new session to
    /// retry.
    pub async fn authenticate(&mut self, password: &str) -> Result<bool, SessionError> {
        self.expect_state(SessionState::AwaitingPassword, "authenticate")?;
        let io_timeout = self.config.io_timeout();
        let version = self.version.expect("version set during connect");

        let result = async {
            let input = self.input.as_mut().expect("input set during connect");

            let mut challenge = [0u8; 16];
            timed(io_timeout, input.read_bytes(&mut challenge)).await??;

            let response = auth::encrypt_challenge(password, &challenge);
            {
                let writer = self.writer.as_ref().expect("writer set during connect");
                let mut out = writer.lock().await;
                out.write_bytes(&response);
                out.flush().await?;
            }

            let input = self.input.as_mut().expect("input set during connect");
            timed(io_timeout, input.read_u32()).await?.map_err(SessionError::from)
        }
        .await;

        match result {
            Ok(0) => {
                tracing::info!("VNC authentication accepted");
                self.state = SessionState::Initializing;
                Ok(true)
            }
            Ok(_) => {
                // 3.8 follows the failure word with a reason string.
                if version == ProtocolVersion::V3_8 {
                    if let Some(input) = self.input.as_mut() {
                        if let Ok(Ok(reason)) = timed(io_timeout, read_reason(input)).await {
                            tracing::warn!(reason = %reason, "VNC authentication refused");
                        }
                    }
                }
                self.teardown();
                Ok(false)
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    /// Exchange ClientInit/ServerInit, build the framebuffer, and send
    /// the client's encoding and pixel format choices.
    ///
    /// `(bits_per_pixel, depth)` pairs matching a preset override the
    /// server's advertised pixel format; any other pair keeps it.
    pub async fn initialize(&mut self, bits_per_pixel: u8, depth: u8) -> Result<(), SessionError> {
        self.expect_state(SessionState::Initializing, "initialize")?;
        let io_timeout = self.config.io_timeout();
        let shared = self.config.shared;

        let result = async {
            {
                let writer = self.writer.as_ref().expect("writer set during connect");
                let mut out = writer.lock().await;
                ClientInit { shared }.write_to(&mut out);
                out.flush().await?;
            }

            let input = self.input.as_mut().expect("input set during connect");
            let server_init = timed(io_timeout, ServerInit::read_from(input))
                .await?
                .map_err(|e| SessionError::Protocol(format!("bad ServerInit: {}", e)))?;
            tracing::info!(
                width = server_init.framebuffer_width,
                height = server_init.framebuffer_height,
                name = %server_init.name,
                "session initialized"
            );

            let mut fb = Framebuffer::new(
                server_init.framebuffer_width,
                server_init.framebuffer_height,
                server_init.pixel_format,
                server_init.name,
            );

            let writer = self.writer.as_ref().expect("writer set during connect");
            let mut out = writer.lock().await;
            SetEncodings {
                encodings: ADVERTISED_ENCODINGS.to_vec(),
            }
            .write_to(&mut out);
            if let Some(preset) = PixelFormat::preset(bits_per_pixel, depth) {
                SetPixelFormat {
                    pixel_format: preset,
                }
                .write_to(&mut out);
                fb.set_format(preset);
            }
            out.flush().await?;

            Ok::<Framebuffer, SessionError>(fb)
        }
        .await;

        match result {
            Ok(fb) => {
                self.framebuffer = Some(Arc::new(tokio::sync::Mutex::new(fb)));
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    /// Spawn the reader task. It immediately requests a full-screen
    /// update and then mirrors the server until cancelled or the
    /// connection dies.
    pub fn start_updates(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Connected, "start_updates")?;
        if self.reader_task.is_some() {
            return Err(SessionError::InvalidState(
                "reader task already running".to_string(),
            ));
        }

        let input = self.input.take().expect("input set during connect");
        let framebuffer = self.framebuffer.clone().expect("framebuffer set during initialize");
        let ctx = ReaderContext {
            input,
            writer: self.writer.clone().expect("writer set during connect"),
            framebuffer,
            events: self.events_tx.clone(),
            done: self.done.clone(),
            full_screen_refresh: self.full_screen_refresh.clone(),
            lost: self.lost.clone(),
            io_timeout: self.config.io_timeout(),
        };
        self.reader_task = Some(tokio::spawn(reader_loop(ctx)));
        Ok(())
    }

    /// Tear the session down: cancel the reader, wake its blocked read
    /// with a 1x1 update request, wait for it briefly, close the socket.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.state = SessionState::Disconnecting;
        self.done.store(true, Ordering::Release);

        // A tiny incremental request makes the server answer, which
        // unblocks a reader parked in its message-type read.
        if let Some(writer) = self.writer.as_ref() {
            let mut out = writer.lock().await;
            FramebufferUpdateRequest {
                incremental: true,
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            }
            .write_to(&mut out);
            let _ = out.flush().await;
        }

        if let Some(mut task) = self.reader_task.take() {
            if tokio::time::timeout(self.config.shutdown_timeout(), &mut task)
                .await
                .is_err()
            {
                tracing::warn!("reader task did not exit in time; aborting it");
                task.abort();
            }
        }

        self.teardown();
        Ok(())
    }

    /// Send a key press or release. Dropped silently under view-only.
    pub async fn write_key_event(&self, keysym: u32, pressed: bool) -> Result<(), SessionError> {
        self.expect_state(SessionState::Connected, "write_key_event")?;
        if !self.input_policy.allows_key_events() {
            return Ok(());
        }
        self.send(|out| {
            KeyEvent {
                down: pressed,
                key: keysym,
            }
            .write_to(out)
        })
        .await
    }

    /// Send pointer position and button state. Dropped silently under
    /// view-only.
    pub async fn write_pointer_event(
        &self,
        button_mask: u8,
        x: u16,
        y: u16,
    ) -> Result<(), SessionError> {
        self.expect_state(SessionState::Connected, "write_pointer_event")?;
        if !self.input_policy.allows_pointer_events() {
            return Ok(());
        }
        self.send(|out| PointerEvent { button_mask, x, y }.write_to(out))
            .await
    }

    /// Send clipboard text to the server. Forwarded even in view-only
    /// mode.
    pub async fn write_client_cut_text(&self, text: &str) -> Result<(), SessionError> {
        self.expect_state(SessionState::Connected, "write_client_cut_text")?;
        self.send(|out| {
            ClientCutText {
                text: text.to_string(),
            }
            .write_to(out)
        })
        .await
    }

    async fn send(
        &self,
        build: impl FnOnce(&mut RfbOutStream<OwnedWriteHalf>),
    ) -> Result<(), SessionError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no connection".to_string()))?;
        let mut out = writer.lock().await;
        build(&mut out);
        match out.flush().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "write failed; connection is gone");
                if !self.lost.swap(true, Ordering::AcqRel) {
                    let _ = self.events_tx.send(SessionEvent::ConnectionLost);
                }
                Err(SessionError::ConnectionLost)
            }
        }
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState(format!(
                "{} requires {:?}, session is {:?}",
                operation, expected, self.state
            )));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.input = None;
        self.writer = None;
        self.reader_task = None;
        self.state = SessionState::Disconnected;
        self.spent = true;
    }
}

async fn timed<F: Future>(limit: Duration, fut: F) -> Result<F::Output, SessionError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SessionError::Timeout(limit))
}

async fn read_reason(input: &mut Reader) -> std::io::Result<String> {
    let len = input.read_u32().await? as usize;
    let bytes = input.read_bytes_vec(len).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

//
// Reader task
//

struct ReaderContext {
    input: Reader,
    writer: Writer,
    framebuffer: FramebufferHandle,
    events: flume::Sender<SessionEvent>,
    done: Arc<AtomicBool>,
    full_screen_refresh: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    io_timeout: Duration,
}

impl ReaderContext {
    fn emit_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(SessionEvent::ConnectionLost);
        }
    }

    /// Build the next update request; a pending full-refresh demand makes
    /// it non-incremental and is consumed here.
    fn next_incremental(&self) -> bool {
        !self.full_screen_refresh.swap(false, Ordering::AcqRel)
    }

    async fn request_update(&self, incremental: bool, width: u16, height: u16) -> std::io::Result<()> {
        let mut out = self.writer.lock().await;
        FramebufferUpdateRequest {
            incremental,
            x: 0,
            y: 0,
            width,
            height,
        }
        .write_to(&mut out);
        out.flush().await
    }
}

async fn reader_loop(mut ctx: ReaderContext) {
    let mut substream = ZrleInflator::new();
    let (width, height) = {
        let fb = ctx.framebuffer.lock().await;
        (fb.width(), fb.height())
    };

    // Prime the flow with a full-screen request so the first update
    // paints the whole mirror.
    if ctx.request_update(false, width, height).await.is_err() {
        ctx.emit_lost();
        return;
    }

    // One read failure is a no-activity tick; two in a row end the
    // session.
    let mut failed_once = false;

    loop {
        if ctx.done.load(Ordering::Acquire) {
            break;
        }

        let read = tokio::time::timeout(ctx.io_timeout, ctx.input.read_u8()).await;
        let msg_type = match read {
            Ok(Ok(t)) => {
                failed_once = false;
                t
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "server message read failed");
                if ctx.done.load(Ordering::Acquire) {
                    break;
                }
                if failed_once {
                    ctx.emit_lost();
                    break;
                }
                failed_once = true;
                let incremental = ctx.next_incremental();
                if ctx.request_update(incremental, width, height).await.is_err() {
                    ctx.emit_lost();
                    break;
                }
                continue;
            }
            Err(_) => {
                tracing::debug!("no server message within the read timeout");
                if ctx.done.load(Ordering::Acquire) {
                    break;
                }
                if failed_once {
                    ctx.emit_lost();
                    break;
                }
                failed_once = true;
                let incremental = ctx.next_incremental();
                if ctx.request_update(incremental, width, height).await.is_err() {
                    ctx.emit_lost();
                    break;
                }
                continue;
            }
        };

        match msg_type {
            SERVER_MSG_FRAMEBUFFER_UPDATE => {
                match handle_update(&mut ctx, &mut substream).await {
                    Ok(true) => {}
                    Ok(false) => break, // cancelled mid-update
                    Err(e) => {
                        tracing::error!(error = %e, "framebuffer update failed");
                        ctx.emit_lost();
                        break;
                    }
                }
                let incremental = ctx.next_incremental();
                if ctx.request_update(incremental, width, height).await.is_err() {
                    ctx.emit_lost();
                    break;
                }
            }
            SERVER_MSG_SET_COLOUR_MAP_ENTRIES => {
                match timed_io(ctx.io_timeout, SetColourMapEntries::read_from(&mut ctx.input)).await
                {
                    Ok(msg) => {
                        let mut fb = ctx.framebuffer.lock().await;
                        fb.set_color_map_entries(msg.first_color, &msg.colors);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "bad SetColourMapEntries");
                        ctx.emit_lost();
                        break;
                    }
                }
            }
            SERVER_MSG_BELL => {
                let _ = ctx.events.send(SessionEvent::Bell);
            }
            SERVER_MSG_CUT_TEXT => {
                match timed_io(ctx.io_timeout, ServerCutText::read_from(&mut ctx.input)).await {
                    Ok(msg) => {
                        let _ = ctx.events.send(SessionEvent::ServerCutText(msg.text));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "bad ServerCutText");
                        ctx.emit_lost();
                        break;
                    }
                }
            }
            unknown => {
                tracing::error!(message_type = unknown, "unknown server message type");
                ctx.emit_lost();
                break;
            }
        }
    }

    tracing::debug!("reader task exiting");
}

/// Decode every rectangle of one FramebufferUpdate, in server order.
///
/// Returns `Ok(false)` when cancellation interrupted the update.
async fn handle_update(
    ctx: &mut ReaderContext,
    substream: &mut ZrleInflator,
) -> anyhow::Result<bool> {
    let header = timed_io(ctx.io_timeout, FramebufferUpdateHeader::read_from(&mut ctx.input)).await?;

    for i in 0..header.rectangle_count {
        if ctx.done.load(Ordering::Acquire) {
            return Ok(false);
        }

        let rect = timed_io(ctx.io_timeout, Rectangle::read_from(&mut ctx.input)).await?;
        let encoding = Encoding::from_wire(rect.encoding).ok_or_else(|| {
            anyhow::anyhow!(
                "rectangle {} uses unsupported encoding {}",
                i,
                rect.encoding
            )
        })?;

        {
            let mut fb = ctx.framebuffer.lock().await;
            tokio::time::timeout(
                ctx.io_timeout,
                encoding.decode(&mut ctx.input, &rect, &mut fb, substream),
            )
            .await
            .map_err(|_| anyhow::anyhow!("rectangle {} stalled past the read timeout", i))??;
        }

        let _ = ctx.events.send(SessionEvent::Update(Rect::from_u16(
            rect.x,
            rect.y,
            rect.width,
            rect.height,
        )));
    }

    Ok(true)
}

async fn timed_io<T, F>(limit: Duration, fut: F) -> std::io::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))?
}
