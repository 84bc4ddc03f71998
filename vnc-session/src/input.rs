//! Input forwarding policy.

/// Whether local input reaches the server.
///
/// Swappable at runtime via [`crate::VncSession::set_input_policy`].
/// Clipboard text is forwarded under either policy; view-only drops only
/// key and pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputPolicy {
    /// Forward all input events.
    #[default]
    Full,
    /// Drop key and pointer events.
    ViewOnly,
}

impl InputPolicy {
    pub fn allows_key_events(self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn allows_pointer_events(self) -> bool {
        matches!(self, Self::Full)
    }
}
