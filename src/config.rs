//! Configuration surface
//!
//! Everything here is checked once, at configuration-acceptance time. A
//! failed check rejects the configuration; nothing is silently defaulted.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mappings::AttributeMapping;

fn default_timeout_secs() -> u64 {
    30
}

/// Outbound syslog transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Datagram, fire-and-forget (default).
    #[default]
    Udp,
    /// Stream, newline-terminated lines.
    Tcp,
    /// TCP wrapped in an encrypted channel; requires certificate material.
    Tls,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Tls => f.write_str("TLS"),
        }
    }
}

/// Output wire format. Closed set; only CEF today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    /// Common Event Format syslog lines.
    #[default]
    Cef,
}

/// Receiver and transport configuration for one SIEM destination.
#[derive(Debug, Clone, Deserialize)]
pub struct SiemConfig {
    /// Receiver host, IP or FQDN.
    pub server: String,
    /// Receiver port.
    pub port: u16,
    /// Transport protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Output format identifier.
    #[serde(default)]
    pub format: OutputFormat,
    /// PEM-encoded certificate material; required iff protocol is TLS.
    #[serde(default)]
    pub certificate: Option<String>,
    /// Comma/newline-separated allow-list of CEF extension keys the
    /// receiver accepts.
    pub valid_extensions: String,
    /// Bound on connection establishment and each write, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SiemConfig {
    /// Allow-list parsed into a key set.
    pub fn extension_allow_list(&self) -> HashSet<String> {
        self.valid_extensions
            .split([',', '\n'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Bounded I/O timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Outcome of configuration validation, reported back to the host with a
/// human-readable, field-localized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the configuration may be activated.
    pub success: bool,
    /// Actionable message naming the offending parameter on failure.
    pub message: String,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: "Validation successful.".to_string(),
        }
    }

    fn fail(message: &str) -> Self {
        tracing::error!("configuration validation failed: {message}");
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// Validate the configuration parameters and the attribute-mapping
/// document. On failure the configuration must be rejected, not persisted
/// as active.
///
/// Network reachability is deliberately not probed here; run
/// [`crate::delivery::test_connectivity`] separately so the host can report
/// connection problems as their own actionable message.
pub fn validate_config(config: &SiemConfig, mapping_json: &str) -> ValidationResult {
    if config.server.trim().is_empty() {
        return ValidationResult::fail("Invalid server IP/FQDN provided.");
    }

    if config.port == 0 {
        return ValidationResult::fail("Invalid port provided.");
    }

    if config.protocol == Protocol::Tls
        && config
            .certificate
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return ValidationResult::fail(
            "Invalid certificate provided: TLS requires PEM certificate material.",
        );
    }

    if config.extension_allow_list().is_empty() {
        return ValidationResult::fail("Invalid extensions provided.");
    }

    if let Err(e) = AttributeMapping::parse(mapping_json) {
        return ValidationResult::fail(&format!("Invalid attribute mapping provided: {e}"));
    }

    ValidationResult::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_MAPPING: &str = r#"{
        "cef_version": "0",
        "taxonomy": {
            "alert": {
                "DLP": {
                    "header": { "severity": { "mapping_field": "severity" } },
                    "extension": { "src": { "mapping_field": "srcip" } }
                }
            }
        }
    }"#;

    fn config() -> SiemConfig {
        SiemConfig {
            server: "siem.example.com".to_string(),
            port: 514,
            protocol: Protocol::Udp,
            format: OutputFormat::Cef,
            certificate: None,
            valid_extensions: "src, dst, act".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_valid_configuration() {
        let result = validate_config(&config(), VALID_MAPPING);
        assert!(result.success, "{}", result.message);
    }

    #[test]
    fn test_empty_server_rejected() {
        let mut cfg = config();
        cfg.server = "  ".to_string();
        let result = validate_config(&cfg, VALID_MAPPING);
        assert!(!result.success);
        assert!(result.message.contains("server"));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut cfg = config();
        cfg.port = 0;
        assert!(!validate_config(&cfg, VALID_MAPPING).success);
    }

    #[test]
    fn test_tls_requires_certificate() {
        let mut cfg = config();
        cfg.protocol = Protocol::Tls;
        let result = validate_config(&cfg, VALID_MAPPING);
        assert!(!result.success);
        assert!(result.message.contains("certificate"));

        cfg.certificate = Some("-----BEGIN CERTIFICATE-----".to_string());
        assert!(validate_config(&cfg, VALID_MAPPING).success);
    }

    #[test]
    fn test_empty_extension_allow_list_rejected() {
        let mut cfg = config();
        cfg.valid_extensions = " , ".to_string();
        let result = validate_config(&cfg, VALID_MAPPING);
        assert!(!result.success);
        assert!(result.message.contains("extensions"));
    }

    #[test]
    fn test_bad_mapping_rejected_with_context() {
        let bad = r#"{ "cef_version": "0", "taxonomy": { "alert": {
            "DLP": { "header": {}, "extension": { "src": {} } }
        } } }"#;
        let result = validate_config(&config(), bad);
        assert!(!result.success);
        assert!(result.message.contains("src"));
    }

    #[test]
    fn test_allow_list_parsing() {
        let mut cfg = config();
        cfg.valid_extensions = "src,dst\nact, suser ".to_string();
        let set = cfg.extension_allow_list();
        assert_eq!(set.len(), 4);
        assert!(set.contains("suser"));
    }

    #[test]
    fn test_protocol_parses_from_upper_case() {
        let p: Protocol = serde_json::from_str("\"TLS\"").unwrap();
        assert_eq!(p, Protocol::Tls);
        let f: OutputFormat = serde_json::from_str("\"CEF\"").unwrap();
        assert_eq!(f, OutputFormat::Cef);
    }
}
