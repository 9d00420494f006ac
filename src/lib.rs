//! CEF Bridge
//!
//! Re-encodes structured security event records into Common Event Format
//! (CEF) syslog lines and delivers them to SIEM receivers, driven entirely
//! by a declarative per-tenant attribute-mapping document.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         CEF Bridge                               │
//! │                                                                  │
//! │  mapping JSON ──► Mapping Validator (once, at config acceptance) │
//! │                        │                                         │
//! │  raw records ──► Transform Pipeline ──► Field Resolver           │
//! │  (alert/event)         │                (direct / JSONPath /     │
//! │                        ▼                 default precedence)     │
//! │                  CEF Generator                                   │
//! │                  (header + escaped key=value extensions)         │
//! │                        │                                         │
//! │                        ▼                                         │
//! │                  Delivery Handler ──► UDP / TCP / TLS syslog     │
//! │                  (one per worker, per-line flush)                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The attribute mapping is validated once per configuration change and is
//! then immutable; workers share it read-only behind an `Arc`. Each worker
//! owns its transport handle exclusively, so no locking is needed anywhere
//! in the hot path.

use serde::{Deserialize, Serialize};

pub mod cef;
pub mod config;
pub mod delivery;
pub mod error;
pub mod mappings;
pub mod pipeline;
pub mod resolve;

pub use cef::CefGenerator;
pub use config::{validate_config, OutputFormat, Protocol, SiemConfig, ValidationResult};
pub use delivery::{test_connectivity, SyslogHandler, CHUNK_SIZE};
pub use error::{CefError, DeliveryError, FieldError, MappingValidationError};
pub use mappings::{AttributeMapping, ExtensionRule, HeaderRule, SubtypeMapping};
pub use pipeline::{TransformMetrics, Transformer};

/// Data type tag supplied by the host with each batch of raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Security alerts (e.g. DLP, malware, anomaly).
    Alert,
    /// Raw platform events (e.g. page, application, audit).
    Event,
}

impl DataType {
    /// Key of this data type inside the mapping taxonomy.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Alert => "alert",
            DataType::Event => "event",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External tenant/identity lookup used to resolve the `$tenant_name`
/// mapping variable. The host supplies an implementation; the pipeline only
/// ever asks for the tenant name string.
pub trait TenantLookup: Send + Sync {
    /// Name of the tenant the current configuration belongs to.
    fn tenant_name(&self) -> String;
}
