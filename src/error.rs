//! Error types for CEF Bridge

use thiserror::Error;

/// Attribute-mapping document failed structural or semantic validation.
///
/// Fatal to the configuration being accepted; every variant carries enough
/// context (data type, subtype, field name) to localize the bad entry.
#[derive(Error, Debug)]
pub enum MappingValidationError {
    /// Document is not valid JSON or not a JSON object.
    #[error("mapping document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Problem at the document root (missing taxonomy, bad cef_version, ...).
    #[error("mapping document: {0}")]
    Document(String),

    /// Problem with one subtype entry.
    #[error("[{data_type}]: subtype \"{subtype}\": {reason}")]
    Subtype {
        /// Data type the subtype belongs to
        data_type: String,
        /// Subtype name as declared in the document
        subtype: String,
        /// What is wrong with it
        reason: String,
    },

    /// Problem with one header or extension field rule.
    #[error("[{data_type}][{subtype}]: {kind} field \"{field}\": {reason}")]
    Field {
        /// Data type the rule belongs to
        data_type: String,
        /// Subtype the rule belongs to
        subtype: String,
        /// "header" or "extension"
        kind: &'static str,
        /// Output field name
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

/// One output field could not be resolved from the input record.
///
/// Recovered locally: the caller omits the field or skips the record,
/// sibling fields and records are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Mapping target absent from the record and no usable default.
    #[error("field \"{0}\" not present in record and no default configured")]
    NotFound(String),

    /// Rule carries neither a mapping field nor a default value. Validation
    /// rejects such rules, so this only surfaces for hand-built rules.
    #[error("rule has neither mapping field nor default value")]
    Unresolvable,
}

/// CEF line generation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CefError {
    /// Every extension field was filtered out; a CEF line with no extension
    /// carries no security payload and is rejected rather than delivered.
    #[error("no extension fields left after allow-list filtering")]
    EmptyExtension,
}

/// Transport-level delivery failure.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// A write on an established connection failed.
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),

    /// TLS configuration or handshake problem.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Receiver host is not a valid DNS name or IP address.
    #[error("invalid server name: {0}")]
    ServerName(String),

    /// Connect or write exceeded the configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
