//! Server configuration: TOML file + CLI overrides.

use chat_core::{ChatError, ChatResult};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to `port + 1` when unset.
    #[serde(default)]
    pub ws_port: Option<u16>,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: None,
            static_dir: default_static_dir(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_static_dir() -> String {
    "public".to_string()
}
fn default_outbound_buffer() -> usize {
    256
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// HTTP port (health + static files).
    pub port: u16,
    /// WebSocket port.
    pub ws_port: u16,
    pub static_dir: PathBuf,
    /// Per-connection outbound queue capacity, in events.
    pub outbound_buffer: usize,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_host: Option<&str>,
        cli_port: Option<u16>,
        cli_ws_port: Option<u16>,
        cli_static_dir: Option<&str>,
    ) -> ChatResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| ChatError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        // Merge CLI overrides
        let host_str = cli_host
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.host);
        let host: IpAddr = host_str
            .parse()
            .map_err(|e| ChatError::Config(format!("invalid host {host_str:?}: {e}")))?;
        let port = cli_port.unwrap_or(file_config.server.port);
        let ws_port = match cli_ws_port.or(file_config.server.ws_port) {
            Some(ws_port) => ws_port,
            // An ephemeral HTTP port gets an ephemeral WebSocket port.
            None if port == 0 => 0,
            None => port.checked_add(1).ok_or_else(|| {
                ChatError::Config(format!(
                    "no default WebSocket port above {port}; set ws_port explicitly"
                ))
            })?,
        };
        if ws_port == port && port != 0 {
            return Err(ChatError::Config(format!(
                "HTTP and WebSocket ports must differ (both {port})"
            )));
        }
        let static_dir = cli_static_dir
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.static_dir);

        Ok(Self {
            host,
            port,
            ws_port,
            static_dir: expand_tilde_str(&static_dir),
            outbound_buffer: file_config.server.outbound_buffer.max(1),
        })
    }
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None, None, None, None, None).unwrap();
        assert_eq!(cfg.host.to_string(), "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.ws_port, 3001);
        assert_eq!(cfg.static_dir, PathBuf::from("public"));
        assert_eq!(cfg.outbound_buffer, 256);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = ServerConfig::load(
            Some(Path::new("/nonexistent/chat-hub/server.toml")),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn file_values_are_used() {
        let file = write_config(
            r#"
[server]
host = "127.0.0.1"
port = 8080
ws_port = 9090
static_dir = "/srv/chat"
outbound_buffer = 32
"#,
        );
        let cfg = ServerConfig::load(Some(file.path()), None, None, None, None).unwrap();
        assert_eq!(cfg.host.to_string(), "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.ws_port, 9090);
        assert_eq!(cfg.static_dir, PathBuf::from("/srv/chat"));
        assert_eq!(cfg.outbound_buffer, 32);
    }

    #[test]
    fn cli_overrides_file() {
        let file = write_config("[server]\nport = 8080\nws_port = 9090\n");
        let cfg = ServerConfig::load(
            Some(file.path()),
            Some("::1"),
            Some(5000),
            None,
            Some("assets"),
        )
        .unwrap();
        assert_eq!(cfg.host.to_string(), "::1");
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.ws_port, 9090);
        assert_eq!(cfg.static_dir, PathBuf::from("assets"));
    }

    #[test]
    fn ws_port_follows_port() {
        let cfg = ServerConfig::load(None, None, Some(4000), None, None).unwrap();
        assert_eq!(cfg.ws_port, 4001);
    }

    #[test]
    fn ephemeral_port_gets_ephemeral_ws_port() {
        let cfg = ServerConfig::load(None, None, Some(0), None, None).unwrap();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.ws_port, 0);
    }

    #[test]
    fn highest_port_needs_explicit_ws_port() {
        let err = ServerConfig::load(None, None, Some(65535), None, None).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));

        let cfg = ServerConfig::load(None, None, Some(65535), Some(8081), None).unwrap();
        assert_eq!(cfg.ws_port, 8081);
    }

    #[test]
    fn equal_ports_are_rejected() {
        let err = ServerConfig::load(None, None, Some(4000), Some(4000), None).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = ServerConfig::load(None, Some("not-an-ip"), None, None, None).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[server]\nport = \"eighty\"\n");
        let err = ServerConfig::load(Some(file.path()), None, None, None, None).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/x/y.toml")), home.join("x/y.toml"));
        }
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
    }
}
