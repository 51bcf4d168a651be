//! Serving configuration.
//!
//! [`ServeOptions`] deserializes from any serde format, with every field
//! optional:
//!
//! ```rust
//! let options: waypost::ServeOptions =
//!     serde_json::from_str(r#"{ "port": 8080, "drain_timeout_secs": 25 }"#).unwrap();
//! assert_eq!(options.addr().unwrap(), "0.0.0.0:8080");
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServeOptions {
    pub hostname: String,
    pub port: u16,
    /// How long to wait for in-flight requests after the shutdown signal.
    /// Unset waits indefinitely.
    pub drain_timeout_secs: Option<u64>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_owned(),
            port: 3000,
            drain_timeout_secs: None,
        }
    }
}

impl ServeOptions {
    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn addr(&self) -> Result<String, Error> {
        let host = self.hostname.trim();
        if host.is_empty() {
            return Err(Error::InvalidAddress(self.hostname.clone()));
        }
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("[{host}]:{}", self.port))
        } else {
            Ok(format!("{host}:{}", self.port))
        }
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}
