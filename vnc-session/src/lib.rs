//! Async VNC client session engine.
//!
//! Ties the lower crates together into a usable client core: a
//! [`VncSession`] owns one TCP connection, drives the RFB handshake and
//! authentication, keeps a live [`vnc_framebuffer::Framebuffer`] mirror
//! through a background reader task, and forwards local input events.
//!
//! # Quick start
//!
//! ```no_run
//! use vnc_session::{SessionConfig, SessionEvent, VncSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = VncSession::new(SessionConfig::default());
//!
//!     if session.connect("localhost", 5900).await? {
//!         if !session.authenticate("secret").await? {
//!             anyhow::bail!("server refused the password");
//!         }
//!     }
//!     session.initialize(32, 24).await?;
//!
//!     let events = session.events();
//!     session.start_updates()?;
//!
//!     while let Ok(event) = events.recv_async().await {
//!         match event {
//!             SessionEvent::Update(rect) => {
//!                 // Repaint `rect` from session.framebuffer()
//!                 let _ = rect;
//!             }
//!             SessionEvent::Bell => { /* beep */ }
//!             SessionEvent::ServerCutText(text) => {
//!                 let _ = text; // fill the clipboard
//!             }
//!             SessionEvent::ConnectionLost => break,
//!         }
//!     }
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! Events are emitted from the reader task; hosts with thread-affine UI
//! toolkits marshal them as needed. The session is single-shot - after a
//! disconnect or a fatal error, build a new one.

pub mod config;
pub mod errors;
pub mod events;
pub mod input;
pub mod keysym;
mod session;

pub use config::SessionConfig;
pub use errors::SessionError;
pub use events::SessionEvent;
pub use input::InputPolicy;
pub use keysym::KeyInput;
pub use session::{FramebufferHandle, SessionState, VncSession};
