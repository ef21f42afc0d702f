//! TOML-based configuration for the LanLink daemon.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\LanLink\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/lanlink/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/LanLink/config.toml`
//!
//! Example:
//!
//! ```toml
//! [device]
//! id = "4f3c2a1b9d8e4f7a8b6c5d4e3f2a1b0c"
//! name = "Workstation"
//! type = "desktop"
//! log_level = "info"
//!
//! [network]
//! bind_address = "0.0.0.0"
//! discovery_port = 1714
//! broadcast_address = "255.255.255.255"
//! tcp_port_first = 1714
//! tcp_port_last = 1764
//! announce_interval_secs = 30
//!
//! [link]
//! connect_timeout_ms = 5000
//!
//! [link.socket]
//! nodelay = true
//! ```
//!
//! Every field has a serde default, so a missing file, an empty file, or a
//! file written by an older version all load.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanlink_core::{DeviceType, IdentityPackage, PeerIdentity, DEFAULT_DISCOVERY_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::network::link_provider::ProviderConfig;
use crate::infrastructure::network::socket_config::SocketPolicy;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub link: LinkConfig,
}

/// How this machine introduces itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Stable device id.  Generated on first run when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(rename = "type", default = "default_device_type")]
    pub device_type: String,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Sockets and announcement settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Address both sockets bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// UDP port for announcements, in and out.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    /// Destination port for announcements; 0 means "same as `discovery_port`".
    #[serde(default = "default_discovery_port")]
    pub broadcast_port: u16,
    /// First port tried for the link listener; 0 lets the OS choose.
    #[serde(default = "default_tcp_port_first")]
    pub tcp_port_first: u16,
    #[serde(default = "default_tcp_port_last")]
    pub tcp_port_last: u16,
    /// Seconds between periodic announcements; 0 disables them.
    #[serde(default = "default_announce_interval_secs")]
    pub announce_interval_secs: u64,
}

/// Link establishment limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long a fresh stream may take to send its identity.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// How long to wait for a peer we expect to dial us.
    #[serde(default = "default_pending_timeout_ms")]
    pub pending_timeout_ms: u64,
    #[serde(default = "default_max_package_bytes")]
    pub max_package_bytes: usize,
    #[serde(default)]
    pub socket: SocketPolicy,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "LanLink device".to_string())
}
fn default_device_type() -> String {
    DeviceType::Desktop.as_str().to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_tcp_port_first() -> u16 {
    1714
}
fn default_tcp_port_last() -> u16 {
    1764
}
fn default_announce_interval_secs() -> u64 {
    30
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_pending_timeout_ms() -> u64 {
    10_000
}
fn default_max_package_bytes() -> usize {
    1024 * 1024
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: default_device_name(),
            device_type: default_device_type(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            discovery_port: default_discovery_port(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_discovery_port(),
            tcp_port_first: default_tcp_port_first(),
            tcp_port_last: default_tcp_port_last(),
            announce_interval_secs: default_announce_interval_secs(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            pending_timeout_ms: default_pending_timeout_ms(),
            max_package_bytes: default_max_package_bytes(),
            socket: SocketPolicy::default(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Fills in a device id if none is set.  Returns `true` when one was
    /// generated, meaning the config should be saved.
    pub fn ensure_device_id(&mut self) -> bool {
        if !self.device.id.trim().is_empty() {
            return false;
        }
        self.device.id = Uuid::new_v4().simple().to_string();
        true
    }

    /// Validates the file contents and builds the provider's runtime
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first unusable field.
    pub fn to_provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let device_id =
            PeerIdentity::new(self.device.id.trim()).map_err(|e| invalid("device.id", e))?;
        let local = IdentityPackage::new(
            device_id,
            self.device.name.clone(),
            DeviceType::from_wire(&self.device.device_type),
        );

        let bind_address: IpAddr = parse_ip("network.bind_address", &self.network.bind_address)?;
        let broadcast_ip: IpAddr =
            parse_ip("network.broadcast_address", &self.network.broadcast_address)?;
        let broadcast_port = match self.network.broadcast_port {
            0 => None,
            port => Some(port),
        };

        let (first, last) = (self.network.tcp_port_first, self.network.tcp_port_last);
        let tcp_ports = match (first, last) {
            (0, _) => 0..=0,
            (first, last) if first <= last => first..=last,
            _ => {
                return Err(invalid(
                    "network.tcp_port_last",
                    format!("{last} is below tcp_port_first {first}"),
                ))
            }
        };

        if self.link.max_package_bytes == 0 {
            return Err(invalid("link.max_package_bytes", "must be positive"));
        }

        Ok(ProviderConfig {
            local,
            discovery_addr: SocketAddr::new(bind_address, self.network.discovery_port),
            broadcast_ip,
            broadcast_port,
            tcp_ports,
            announce_interval: match self.network.announce_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            connect_timeout: Duration::from_millis(self.link.connect_timeout_ms),
            handshake_grace: Duration::from_millis(self.link.handshake_timeout_ms),
            pending_timeout: Duration::from_millis(self.link.pending_timeout_ms),
            max_package_bytes: self.link.max_package_bytes,
            socket_policy: self.link.socket,
        })
    }
}

fn invalid(field: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::net::AddrParseError| invalid(field, format!("{value:?}: {e}")))
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the platform config base
/// directory cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_to_path(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `LanLink` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanLink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanlink"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
