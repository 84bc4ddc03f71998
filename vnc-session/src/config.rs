//! Session configuration.

use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Tunable parameters of a [`crate::VncSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Ask for a shared session in ClientInit.
    #[serde(default = "default_true")]
    pub shared: bool,

    /// Start with input forwarding disabled.
    #[serde(default)]
    pub view_only: bool,

    /// Per-operation read/write timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// How long disconnect waits for the reader task to exit, in
    /// milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Proxy id announced to a VNC repeater when the server banner is
    /// `RFB 000.000`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub repeater_proxy_id: Option<String>,

    /// Overrides for nonstandard version banners, mapping the `xxx.yyy`
    /// banner text to the minor version to negotiate. Apple servers
    /// announce `003.889` and expect a 3.8 conversation.
    #[serde(default = "default_version_quirks")]
    pub version_quirks: HashMap<String, u8>,
}

fn default_true() -> bool {
    true
}

fn default_io_timeout_ms() -> u64 {
    15_000
}

fn default_shutdown_timeout_ms() -> u64 {
    3_000
}

fn default_version_quirks() -> HashMap<String, u8> {
    let mut map = HashMap::new();
    map.insert("003.889".to_string(), 8);
    map
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shared: true,
            view_only: false,
            io_timeout_ms: default_io_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            repeater_proxy_id: None,
            version_quirks: default_version_quirks(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        toml::from_str(text).map_err(|e| SessionError::InvalidArgument(format!("bad config: {}", e)))
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SessionError::InvalidArgument(format!(
                "cannot read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
