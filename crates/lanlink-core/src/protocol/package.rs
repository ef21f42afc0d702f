//! The [`NetworkPackage`] type: the single message shape used on every socket.
//!
//! A package is a JSON object with a fixed envelope and a free-form body:
//!
//! ```text
//! {"id":1700000000000,"type":"kdeconnect.identity","body":{"deviceId":"phone-42","tcpPort":1716}}\n
//! ```
//!
//! - `id` – creation time in milliseconds since the Unix epoch.
//! - `type` – dotted tag naming what the body means.
//! - `body` – named, typed fields.  Keys are kept sorted so encoding is
//!   deterministic.
//! - `payloadSize` / `payloadTransferInfo` – optional, describe a side-channel
//!   payload announced by upper layers.  This crate only carries them.
//!
//! Top-level fields this version does not know about are kept in
//! [`NetworkPackage::extra`] and written back out unchanged, so a newer peer's
//! packages survive a round trip through an older one.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol version advertised in identity packages.
pub const PROTOCOL_VERSION: u32 = 7;

/// Type tag of identity / announcement packages.
pub const PACKAGE_TYPE_IDENTITY: &str = "kdeconnect.identity";

/// Well-known UDP port on which announcements are broadcast.
pub const DEFAULT_DISCOVERY_PORT: u16 = 1714;

// ── Package ───────────────────────────────────────────────────────────────────

/// One protocol message.
///
/// Immutable once built: the `with_*` methods consume and return the package,
/// and there are no setters on a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPackage {
    #[serde(default)]
    id: i64,

    #[serde(rename = "type")]
    package_type: String,

    #[serde(default)]
    body: Map<String, Value>,

    #[serde(
        rename = "payloadSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    payload_size: Option<i64>,

    #[serde(
        rename = "payloadTransferInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    payload_transfer_info: Option<Map<String, Value>>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl NetworkPackage {
    /// Creates an empty package of the given type, stamped with the current time.
    pub fn new(package_type: impl Into<String>) -> Self {
        Self {
            id: current_timestamp_ms(),
            package_type: package_type.into(),
            body: Map::new(),
            payload_size: None,
            payload_transfer_info: None,
            extra: Map::new(),
        }
    }

    /// Replaces the package id.  Tests use this to build reproducible bytes.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Adds (or replaces) one body field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Declares the size of a side-channel payload.
    pub fn with_payload(mut self, size: i64, transfer_info: Map<String, Value>) -> Self {
        self.payload_size = Some(size);
        self.payload_transfer_info = Some(transfer_info);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    /// Returns `true` when this package's type tag equals `package_type`.
    pub fn is_type(&self, package_type: &str) -> bool {
        self.package_type == package_type
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn payload_size(&self) -> Option<i64> {
        self.payload_size
    }

    pub fn payload_transfer_info(&self) -> Option<&Map<String, Value>> {
        self.payload_transfer_info.as_ref()
    }

    /// Top-level fields that are not part of the known envelope.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Returns a body field as a string slice, if present and a string.
    pub fn body_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Returns a body field as an unsigned integer, if present and representable.
    pub fn body_u64(&self, key: &str) -> Option<u64> {
        self.body.get(key).and_then(Value::as_u64)
    }
}

/// Returns the current time as milliseconds since the Unix epoch.
fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
