//! Typed view of identity packages.
//!
//! Every peer introduces itself with an identity package: broadcast on UDP to
//! announce its presence (then carrying `tcpPort`), and as the very first
//! package on every freshly opened TCP stream (without `tcpPort`).
//!
//! Body fields:
//!
//! | field             | type    | required |
//! |-------------------|---------|----------|
//! | `deviceId`        | string  | yes      |
//! | `deviceName`      | string  | no – defaults to the id |
//! | `deviceType`      | string  | no – defaults to `unknown` |
//! | `protocolVersion` | integer | no – 0 when absent |
//! | `tcpPort`         | integer | UDP announcements only |

use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::domain::peer::{PeerIdentity, PeerIdentityError};
use crate::protocol::package::{NetworkPackage, PACKAGE_TYPE_IDENTITY, PROTOCOL_VERSION};

const FIELD_DEVICE_ID: &str = "deviceId";
const FIELD_DEVICE_NAME: &str = "deviceName";
const FIELD_DEVICE_TYPE: &str = "deviceType";
const FIELD_PROTOCOL_VERSION: &str = "protocolVersion";
const FIELD_TCP_PORT: &str = "tcpPort";

/// Errors produced when a package cannot be read as an identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("expected an identity package, got type {found:?}")]
    NotIdentity { found: String },

    #[error("identity package has no deviceId")]
    MissingDeviceId,

    #[error("identity package has an unusable deviceId: {0}")]
    InvalidDeviceId(#[from] PeerIdentityError),

    #[error("identity package advertises invalid tcpPort {0}")]
    InvalidTcpPort(u64),

    /// `tcpPort` is present but not a non-negative integer.  Carries the raw
    /// JSON text.
    #[error("identity package has a non-integer tcpPort {0}")]
    MalformedTcpPort(String),
}

/// Kind of device, as advertised to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    Desktop,
    Laptop,
    Phone,
    Tablet,
    Tv,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Laptop => "laptop",
            DeviceType::Phone => "phone",
            DeviceType::Tablet => "tablet",
            DeviceType::Tv => "tv",
            DeviceType::Unknown => "unknown",
        }
    }

    /// Parses a wire string.  Unrecognised values map to [`DeviceType::Unknown`]
    /// so that a new device class never breaks discovery.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "desktop" => DeviceType::Desktop,
            "laptop" => DeviceType::Laptop,
            "phone" | "smartphone" => DeviceType::Phone,
            "tablet" => DeviceType::Tablet,
            "tv" => DeviceType::Tv,
            _ => DeviceType::Unknown,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed identity package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPackage {
    pub device_id: PeerIdentity,
    pub device_name: String,
    pub device_type: DeviceType,
    pub protocol_version: u32,
    /// TCP port the sender accepts links on.  Only present in announcements.
    pub tcp_port: Option<u16>,
}

impl IdentityPackage {
    /// Builds the local identity at the current [`PROTOCOL_VERSION`].
    pub fn new(
        device_id: PeerIdentity,
        device_name: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            device_type,
            protocol_version: PROTOCOL_VERSION,
            tcp_port: None,
        }
    }

    /// Returns a copy that advertises `port` as the link listening port.
    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    /// Returns a copy without the listening port (the form sent on TCP).
    pub fn without_tcp_port(mut self) -> Self {
        self.tcp_port = None;
        self
    }

    /// Renders this identity as a [`NetworkPackage`].
    pub fn to_package(&self) -> NetworkPackage {
        let np = NetworkPackage::new(PACKAGE_TYPE_IDENTITY)
            .with_field(FIELD_DEVICE_ID, self.device_id.as_str())
            .with_field(FIELD_DEVICE_NAME, self.device_name.as_str())
            .with_field(FIELD_DEVICE_TYPE, self.device_type.as_str())
            .with_field(FIELD_PROTOCOL_VERSION, self.protocol_version);
        match self.tcp_port {
            Some(port) => np.with_field(FIELD_TCP_PORT, port),
            None => np,
        }
    }

    /// Reads an identity out of a package.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the package is not an identity package,
    /// lacks a usable `deviceId`, or advertises a `tcpPort` that is not an
    /// integer in `1..=65535`.
    pub fn from_package(np: &NetworkPackage) -> Result<Self, IdentityError> {
        if !np.is_type(PACKAGE_TYPE_IDENTITY) {
            return Err(IdentityError::NotIdentity {
                found: np.package_type().to_string(),
            });
        }

        let raw_id = np
            .body_str(FIELD_DEVICE_ID)
            .ok_or(IdentityError::MissingDeviceId)?;
        let device_id = PeerIdentity::new(raw_id)?;

        let device_name = match np.body_str(FIELD_DEVICE_NAME) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                trace!("identity {device_id} has no deviceName; using the id");
                device_id.as_str().to_string()
            }
        };

        let device_type = np
            .body_str(FIELD_DEVICE_TYPE)
            .map(DeviceType::from_wire)
            .unwrap_or(DeviceType::Unknown);

        let protocol_version = np
            .body_u64(FIELD_PROTOCOL_VERSION)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);

        let tcp_port = match np.body().get(FIELD_TCP_PORT) {
            None => None,
            Some(value) => {
                let raw = value
                    .as_u64()
                    .ok_or_else(|| IdentityError::MalformedTcpPort(value.to_string()))?;
                match u16::try_from(raw) {
                    Ok(port) if port != 0 => Some(port),
                    _ => return Err(IdentityError::InvalidTcpPort(raw)),
                }
            }
        };

        Ok(Self {
            device_id,
            device_name,
            device_type,
            protocol_version,
            tcp_port,
        })
    }
}

impl TryFrom<&NetworkPackage> for IdentityPackage {
    type Error = IdentityError;

    fn try_from(np: &NetworkPackage) -> Result<Self, Self::Error> {
        Self::from_package(np)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
