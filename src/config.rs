//! Runtime configuration consumed by the session core.
//!
//! The binary fills this in from its command line; the library itself never
//! parses arguments.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CLIENT_ID: &str = "492e1e45ea814fa3ac555fe1576aaf5b";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8898/login";
pub const DEFAULT_DEVICE_NAME: &str = "Play";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// OAuth application id.
    pub client_id: String,
    pub redirect_uri: String,
    /// Name of the in-process device as other Connect clients see it.
    pub device_name: String,
    /// Credential and refresh token cache.
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Upper bound on bringing the device up.
    pub init_timeout: Duration,
    /// Upper bound on each transport command.
    pub command_timeout: Duration,
    /// Local clock and redraw interval.
    pub tick: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            cache_dir: PathBuf::from(".cache"),
            log_dir: PathBuf::from(".logs"),
            init_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(10),
            tick: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn credentials_path(&self) -> PathBuf {
        self.cache_dir.join("credentials.json")
    }
}
