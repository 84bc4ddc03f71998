//! Events emitted by the reader task.

use vnc_core::Rect;

/// Observer hooks the session exposes to the host.
///
/// All variants are emitted from the reader task; the host decides how to
/// marshal them onto its own threads. [`SessionEvent::ConnectionLost`] is
/// emitted at most once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One rectangle of a framebuffer update was decoded; the region
    /// carries the invalidated area. Rectangles of a single update arrive
    /// in server order, and the framebuffer already reflects this
    /// rectangle when the event is observed.
    Update(Rect),

    /// The server rang the bell.
    Bell,

    /// The server replaced the clipboard.
    ServerCutText(String),

    /// The connection is gone, either through an error or a disconnect.
    ConnectionLost,
}
