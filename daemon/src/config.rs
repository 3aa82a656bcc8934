use std::fs::File;
use std::io::BufReader;

use common::errors::{HeraldError, HeraldErrorKind};
use common::herald_err;
use common::protocol::SocketData;
use serde::Deserialize;

/// Daemon settings, read from `$XDG_CONFIG_HOME/herald/daemon.json`.
///
/// A missing file means defaults; a malformed one is a startup error.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Applied when a client passes `expire_timeout = -1`. Zero disables
    /// default expiry entirely.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u32,

    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Start in do-not-disturb mode.
    #[serde(default)]
    pub silent: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            socket_path: default_socket_path(),
            silent: false,
        }
    }
}

fn default_timeout_ms() -> u32 {
    5_000
}
fn default_socket_path() -> String {
    SocketData::SOCKET_ADDR.to_string()
}

pub fn load_config() -> Result<DaemonConfig, HeraldError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("herald");
    let Some(loc) = xdg_dirs.find_config_file("daemon.json") else {
        return Ok(DaemonConfig::default());
    };

    let file =
        File::open(&loc).map_err(|e| herald_err!(HeraldErrorKind::FileOpen, e.to_string()))?;
    let reader = BufReader::new(file);

    serde_json::from_reader::<_, DaemonConfig>(reader)
        .map_err(|e| herald_err!(HeraldErrorKind::Deserialize, e.to_string()))
}
