//! Server configuration.

use anyhow::{Context, Result};
use calm_types::SessionConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the UI bundle, served for any non-API path.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "default_phase_duration")]
    pub phase_duration_seconds: u32,
    #[serde(default = "default_session_length")]
    pub session_length_seconds: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_phase_duration() -> u32 {
    SessionConfig::DEFAULT_PHASE_DURATION
}

fn default_session_length() -> u32 {
    SessionConfig::DEFAULT_SESSION_LENGTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            phase_duration_seconds: default_phase_duration(),
            session_length_seconds: default_session_length(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load config from `config/default.toml`, then the user config dir
    /// (`calm/config.toml`), falling back to defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("config/default.toml");
        if local.exists() {
            return Self::load_from(&local);
        }

        if let Some(user) = dirs::config_dir().map(|dir| dir.join("calm").join("config.toml")) {
            if user.exists() {
                return Self::load_from(&user);
            }
        }

        Ok(Config::default())
    }

    /// Resolve `host` and `port` to the address to listen on.
    ///
    /// `host` may be a hostname, an IPv4 address, or an IPv6 address with or
    /// without brackets.
    pub async fn listen_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        tokio::net::lookup_host((host, self.port))
            .await
            .with_context(|| format!("Failed to resolve host {}", self.host))?
            .next()
            .with_context(|| format!("No address found for host {}", self.host))
    }

    /// Initial session parameters for the controller.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            phase_duration_seconds: self.phase_duration_seconds,
            session_length_seconds: self.session_length_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = toml::from_str("port = 9000").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.static_dir.is_none());
        assert_eq!(config.session(), SessionConfig::default());
    }

    #[test]
    fn test_session_fields() {
        let config: Config = toml::from_str(
            r#"
            phase_duration_seconds = 5
            session_length_seconds = 120
            static_dir = "ui/dist"
            "#,
        )
        .unwrap();
        assert_eq!(config.session().phase_duration_seconds, 5);
        assert_eq!(config.session().session_length_seconds, 120);
        assert_eq!(config.static_dir, Some(PathBuf::from("ui/dist")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calm.toml");
        std::fs::write(&path, "host = \"0.0.0.0\"\nport = 7000\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
    }

    #[tokio::test]
    async fn test_listen_addr_accepts_names_and_ipv6() {
        let mut config = Config {
            port: 9100,
            ..Config::default()
        };
        let addr = config.listen_addr().await.unwrap();
        assert_eq!(addr, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());

        config.host = "localhost".to_string();
        let addr = config.listen_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9100);

        for host in ["::1", "[::1]"] {
            config.host = host.to_string();
            let addr = config.listen_addr().await.unwrap();
            assert_eq!(addr, "[::1]:9100".parse::<SocketAddr>().unwrap());
        }
    }

    #[tokio::test]
    async fn test_listen_addr_rejects_garbage_host() {
        let config = Config {
            host: "no-such-host.invalid".to_string(),
            ..Config::default()
        };
        assert!(config.listen_addr().await.is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
