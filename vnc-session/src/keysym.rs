//! Host key to X11 keysym translation.
//!
//! KeyEvent messages carry X11 keysyms. Printable characters map to their
//! Unicode code point; special keys use the fixed X11 constants below.
//! The host translates its own toolkit's key type into [`KeyInput`] and
//! the session takes it from there.

/// X11 keysym values for the special keys the protocol needs.
#[allow(non_upper_case_globals)]
pub mod keysyms {
    pub const XK_BackSpace: u32 = 0xff08;
    pub const XK_Tab: u32 = 0xff09;
    pub const XK_Return: u32 = 0xff0d;
    pub const XK_Escape: u32 = 0xff1b;
    pub const XK_Insert: u32 = 0xff63;
    pub const XK_Delete: u32 = 0xffff;
    pub const XK_Home: u32 = 0xff50;
    pub const XK_End: u32 = 0xff57;
    pub const XK_Page_Up: u32 = 0xff55;
    pub const XK_Page_Down: u32 = 0xff56;
    pub const XK_Left: u32 = 0xff51;
    pub const XK_Up: u32 = 0xff52;
    pub const XK_Right: u32 = 0xff53;
    pub const XK_Down: u32 = 0xff54;
    pub const XK_F1: u32 = 0xffbe;
    pub const XK_F12: u32 = 0xffc9;
    pub const XK_Shift_L: u32 = 0xffe1;
    pub const XK_Shift_R: u32 = 0xffe2;
    pub const XK_Control_L: u32 = 0xffe3;
    pub const XK_Control_R: u32 = 0xffe4;
    pub const XK_Alt_L: u32 = 0xffe9;
    pub const XK_Alt_R: u32 = 0xffea;
    pub const XK_Super_L: u32 = 0xffeb;
    pub const XK_Super_R: u32 = 0xffec;
}

use keysyms::*;

/// Toolkit-neutral key identity, as delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// A printable character.
    Char(char),
    Backspace,
    Tab,
    Return,
    Escape,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Up,
    Right,
    Down,
    /// Function key F1..=F12.
    F(u8),
    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    SuperLeft,
    SuperRight,
}

impl KeyInput {
    /// The X11 keysym transmitted in a KeyEvent.
    ///
    /// Returns `None` for function keys outside F1..=F12.
    pub fn to_keysym(self) -> Option<u32> {
        let keysym = match self {
            Self::Char(c) => c as u32,
            Self::Backspace => XK_BackSpace,
            Self::Tab => XK_Tab,
            Self::Return => XK_Return,
            Self::Escape => XK_Escape,
            Self::Insert => XK_Insert,
            Self::Delete => XK_Delete,
            Self::Home => XK_Home,
            Self::End => XK_End,
            Self::PageUp => XK_Page_Up,
            Self::PageDown => XK_Page_Down,
            Self::Left => XK_Left,
            Self::Up => XK_Up,
            Self::Right => XK_Right,
            Self::Down => XK_Down,
            Self::F(n @ 1..=12) => XK_F1 + (n as u32 - 1),
            Self::F(_) => return None,
            Self::ShiftLeft => XK_Shift_L,
            Self::ShiftRight => XK_Shift_R,
            Self::ControlLeft => XK_Control_L,
            Self::ControlRight => XK_Control_R,
            Self::AltLeft => XK_Alt_L,
            Self::AltRight => XK_Alt_R,
            Self::SuperLeft => XK_Super_L,
            Self::SuperRight => XK_Super_R,
        };
        Some(keysym)
    }
}
