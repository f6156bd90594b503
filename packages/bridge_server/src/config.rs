use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use socket_bridge::SessionSettings;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / bridge.toml / env vars)
// =============================================================================
//
//   bridge.toml:     [backend]
//                    url = "ws://10.0.0.5:8000/ws"
//
//   env var:         BRIDGE_BACKEND__URL=ws://10.0.0.5:8000/ws   (double underscore = nesting)
//
// The variables the first deployment used (PORT, PYTHON_WS_URL) still work but
// lose to anything under BRIDGE_.

const DEFAULT_CONFIG_FILE: &str = "bridge.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub backend: BackendFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path clients upgrade on
    #[serde(default = "default_ws_path")]
    pub path: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_ws_path(),
        }
    }
}

/// Backend settings (lives under `[backend]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendFileConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// 0 disables the timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendFileConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Per-session buffering (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_backend_url() -> String {
    "ws://localhost:8000/ws".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_outbox_capacity() -> usize {
    256
}
fn default_command_capacity() -> usize {
    64
}

/// Build a figment that layers: defaults → config file → legacy env vars → BRIDGE_* env vars.
///
/// Without an explicit path, `bridge.toml` in the working directory is used
/// when present.
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let toml = match config_path {
        Some(path) => Toml::file(path),
        None => Toml::file(DEFAULT_CONFIG_FILE),
    };

    let legacy = Env::raw()
        .only(&["PORT", "PYTHON_WS_URL"])
        .map(|key| {
            if key.as_str().eq_ignore_ascii_case("PORT") {
                "server.port".into()
            } else {
                "backend.url".into()
            }
        });

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(toml)
        .merge(legacy)
        .merge(Env::prefixed("BRIDGE_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

/// Listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Always starts with `/`
    pub ws_path: String,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", fc.host, fc.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", fc.host, fc.port))?;

        let trimmed = fc.path.trim();
        let ws_path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        Ok(Self { bind_addr, ws_path })
    }
}

/// Backend configuration (runtime view).
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub url: String,
    pub connect_timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn from_file(fc: &BackendFileConfig) -> Result<Self> {
        let url = fc.url.trim().to_string();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            bail!("Backend url must be a ws:// or wss:// url, got {:?}", fc.url);
        }

        Ok(Self {
            url,
            connect_timeout: if fc.connect_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.connect_timeout_secs))
            },
        })
    }
}

/// Session settings from the `[session]` and `[backend]` sections.
pub fn session_settings(fc: &FileConfig, backend: &BackendConfig) -> SessionSettings {
    SessionSettings {
        connect_timeout: backend.connect_timeout,
        command_capacity: fc.session.command_capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 3000);
        assert_eq!(fc.server.path, "/ws");
        assert_eq!(fc.backend.url, "ws://localhost:8000/ws");
        assert_eq!(fc.backend.connect_timeout_secs, 10);
        assert_eq!(fc.session.outbox_capacity, 256);
        assert_eq!(fc.session.command_capacity, 64);
    }

    // ── ServerConfig::from_file ─────────────────────────────────────────

    #[test]
    fn test_server_config_from_defaults() {
        let sc = ServerConfig::from_file(&ServerFileConfig::default()).unwrap();
        assert_eq!(sc.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(sc.ws_path, "/ws");
    }

    #[test]
    fn test_server_config_normalizes_path() {
        let fc = ServerFileConfig {
            path: "bridge".to_string(),
            ..Default::default()
        };
        assert_eq!(ServerConfig::from_file(&fc).unwrap().ws_path, "/bridge");
    }

    #[test]
    fn test_server_config_rejects_bad_host() {
        let fc = ServerFileConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(ServerConfig::from_file(&fc).is_err());
    }

    // ── BackendConfig::from_file ────────────────────────────────────────

    #[test]
    fn test_backend_config_timeout() {
        let bc = BackendConfig::from_file(&BackendFileConfig::default()).unwrap();
        assert_eq!(bc.connect_timeout, Some(Duration::from_secs(10)));

        let fc = BackendFileConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert!(BackendConfig::from_file(&fc).unwrap().connect_timeout.is_none());
    }

    #[test]
    fn test_backend_config_requires_ws_scheme() {
        let fc = BackendFileConfig {
            url: "http://localhost:8000/ws".to_string(),
            ..Default::default()
        };
        assert!(BackendConfig::from_file(&fc).is_err());

        let fc = BackendFileConfig {
            url: "wss://backend.internal/ws".to_string(),
            ..Default::default()
        };
        assert!(BackendConfig::from_file(&fc).is_ok());
    }

    #[test]
    fn test_session_settings() {
        let mut fc = FileConfig::default();
        fc.session.command_capacity = 8;
        fc.backend.connect_timeout_secs = 3;
        let bc = BackendConfig::from_file(&fc.backend).unwrap();
        let settings = session_settings(&fc, &bc);
        assert_eq!(settings.command_capacity, 8);
        assert_eq!(settings.connect_timeout, Some(Duration::from_secs(3)));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(Some(&tmp.path().join("absent.toml")))
            .extract()
            .unwrap();
        assert_eq!(fc.server.path, "/ws");
        assert_eq!(fc.session.outbox_capacity, 256);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 8080\n\n[backend]\nurl = \"ws://10.0.0.5:9000/ws\"\nconnect_timeout_secs = 2\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.server.path, "/ws");
        assert_eq!(fc.backend.url, "ws://10.0.0.5:9000/ws");
        assert_eq!(fc.backend.connect_timeout_secs, 2);
    }

    #[test]
    fn test_load_config_partial_section_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(&path, "[session]\noutbox_capacity = 16\n").unwrap();

        let fc: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(fc.session.outbox_capacity, 16);
        assert_eq!(fc.session.command_capacity, 64);
        assert_eq!(fc.backend.connect_timeout_secs, 10);
    }
}
