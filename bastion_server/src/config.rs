// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server configuration: defaults, JSON file, and environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use bastion_vault::EncryptionMethod;

use crate::error::{Result, ServerError};

/// Bind address environment variable.
pub const ENV_BIND_ADDR: &str = "BASTION_BIND_ADDR";
/// Mount root environment variable.
pub const ENV_MOUNT_PATH: &str = "BASTION_MOUNT_PATH";
/// AEAD selection environment variable (`aes` or `chacha20-poly1305`).
pub const ENV_ENCRYPTION_METHOD: &str = "BASTION_ENCRYPTION_METHOD";
/// Log level environment variable.
pub const ENV_LOG_LEVEL: &str = "BASTION_LOG_LEVEL";

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Filesystem root for the on-disk vault layout.
    pub mount_path: PathBuf,
    /// AEAD used for everything the vault writes.
    pub encryption_method: EncryptionMethod,
    /// Log level for the daemon's own crates.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8200)),
            mount_path: PathBuf::from("./data"),
            encryption_method: EncryptionMethod::ChaCha20Poly1305,
            log_level: "info".to_string(),
        }
    }
}

/// JSON config file shape.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    vault: FileVault,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
    #[serde(default)]
    addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileVault {
    #[serde(default)]
    mount_path: Option<String>,
    #[serde(default)]
    encryption_method: Option<String>,
}

impl ServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var(ENV_BIND_ADDR) {
            config.bind_addr = parse_addr(&addr, ENV_BIND_ADDR)?;
        }
        if let Ok(path) = std::env::var(ENV_MOUNT_PATH) {
            config.mount_path = PathBuf::from(path);
        }
        if let Ok(method) = std::env::var(ENV_ENCRYPTION_METHOD) {
            config.encryption_method = parse_method(&method, ENV_ENCRYPTION_METHOD)?;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Load configuration from a JSON file over defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file: FileConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ServerError::Config(format!("config file: {e}")))?;

        let mut config = Self::default();
        if let Some(addr) = file.server.addr {
            config.bind_addr = parse_addr(&addr, "server.addr")?;
        }
        if let Some(mount_path) = file.vault.mount_path {
            config.mount_path = PathBuf::from(mount_path);
        }
        if let Some(method) = file.vault.encryption_method {
            config.encryption_method = parse_method(&method, "vault.encryption_method")?;
        }
        if let Some(level) = file.log_level {
            config.log_level = level;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn with_mount_path(mut self, path: PathBuf) -> Self {
        self.mount_path = path;
        self
    }

    #[must_use]
    pub fn with_encryption_method(mut self, method: EncryptionMethod) -> Self {
        self.encryption_method = method;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.mount_path.as_os_str().is_empty() {
            return Err(ServerError::Config(
                "mount_path must not be empty".to_string(),
            ));
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ServerError::Config(format!(
                "log_level must be one of trace/debug/info/warn/error, got {other}"
            ))),
        }
    }
}

fn parse_addr(value: &str, origin: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid {origin}: {e}")))
}

fn parse_method(value: &str, origin: &str) -> Result<EncryptionMethod> {
    value
        .parse()
        .map_err(|_| ServerError::Config(format!("invalid {origin}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env var tests share process state; serialize them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let saved: Vec<_> = vars
            .iter()
            .map(|(k, v)| {
                let old = std::env::var(k).ok();
                std::env::set_var(k, v);
                (*k, old)
            })
            .collect();

        let result = f();

        for (k, old) in saved {
            match old {
                Some(v) => std::env::set_var(k, v),
                None => std::env::remove_var(k),
            }
        }

        result
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8200);
        assert_eq!(config.mount_path, PathBuf::from("./data"));
        assert_eq!(
            config.encryption_method,
            EncryptionMethod::ChaCha20Poly1305
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .with_bind_addr("0.0.0.0:9999".parse().unwrap())
            .with_mount_path(PathBuf::from("/var/lib/bastion"))
            .with_encryption_method(EncryptionMethod::Aes)
            .with_log_level("debug");

        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.encryption_method, EncryptionMethod::Aes);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let config = ServerConfig::new().with_log_level("loud");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        with_env_vars(
            &[
                (ENV_BIND_ADDR, "0.0.0.0:8300"),
                (ENV_MOUNT_PATH, "/tmp/vault-data"),
                (ENV_ENCRYPTION_METHOD, "aes"),
                (ENV_LOG_LEVEL, "warn"),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8300");
                assert_eq!(config.mount_path, PathBuf::from("/tmp/vault-data"));
                assert_eq!(config.encryption_method, EncryptionMethod::Aes);
                assert_eq!(config.log_level, "warn");
            },
        );
    }

    #[test]
    fn test_from_env_invalid_addr() {
        with_env_vars(&[(ENV_BIND_ADDR, "not-an-addr")], || {
            assert!(ServerConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_from_env_invalid_method() {
        with_env_vars(&[(ENV_ENCRYPTION_METHOD, "rot13")], || {
            assert!(ServerConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "log_level": "debug",
                "server": { "addr": "127.0.0.1:8400" },
                "vault": {
                    "mount_path": "/srv/bastion",
                    "encryption_method": "chacha20-poly1305"
                }
            }"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 8400);
        assert_eq!(config.mount_path, PathBuf::from("/srv/bastion"));
        assert_eq!(
            config.encryption_method,
            EncryptionMethod::ChaCha20Poly1305
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_from_file_partial_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "server": { "addr": "127.0.0.1:8400" } }"#).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 8400);
        assert_eq!(config.mount_path, PathBuf::from("./data"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            ServerConfig::from_file(&path),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            ServerConfig::from_file(Path::new("/nonexistent/config.json")),
            Err(ServerError::Io(_))
        ));
    }
}
