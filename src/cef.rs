//! CEF Generator
//!
//! Assembles resolved header and extension fields into one CEF line:
//!
//! ```text
//! CEF:Version|Device Vendor|Device Product|Device Version|Device Event Class ID|Name|Severity|key=value ...
//! ```
//!
//! Header values escape backslash and pipe; extension values escape
//! backslash, equals and newlines. Extension keys are filtered against the
//! configured allow-list and joined with the configured delimiter in mapping
//! declaration order.

use std::collections::{HashMap, HashSet};

use crate::error::CefError;
use crate::mappings::HEADER_FIELDS;
use crate::DataType;

/// Device vendor emitted in every line.
pub const DEVICE_VENDOR: &str = "CefBridge";
/// Device product used when the mapping did not resolve `product_name`.
pub const DEFAULT_PRODUCT: &str = "Security Events";
/// Device version used when the mapping did not resolve `product_version`.
pub const DEFAULT_PRODUCT_VERSION: &str = "1.0";

/// CEF line generator for one validated configuration.
pub struct CefGenerator {
    valid_extensions: HashSet<String>,
    delimiter: String,
    cef_version: String,
}

impl CefGenerator {
    /// Create a generator from the configured extension allow-list, the
    /// extension-pair delimiter, and the CEF version tag.
    pub fn new(valid_extensions: HashSet<String>, delimiter: &str, cef_version: &str) -> Self {
        Self {
            valid_extensions,
            delimiter: delimiter.to_string(),
            cef_version: cef_version.to_string(),
        }
    }

    /// Produce one CEF line from resolved header and extension fields.
    ///
    /// Extension fields absent from the allow-list are dropped with a
    /// warning. Fails with [`CefError::EmptyExtension`] when nothing
    /// survives the filter. `extensions` must be in mapping declaration
    /// order; that order is preserved on the wire.
    pub fn generate(
        &self,
        headers: &HashMap<String, String>,
        extensions: &[(String, String)],
        data_type: DataType,
        subtype: &str,
    ) -> Result<String, CefError> {
        let mut pairs: Vec<String> = Vec::with_capacity(extensions.len());
        for (key, value) in extensions {
            if !self.valid_extensions.contains(key) {
                tracing::warn!(
                    %data_type,
                    subtype,
                    field = %key,
                    "extension key not in the valid-extensions allow-list, dropping field"
                );
                continue;
            }
            pairs.push(format!("{}={}", key, escape_extension(value)));
        }
        if pairs.is_empty() {
            return Err(CefError::EmptyExtension);
        }

        for key in headers.keys() {
            if !HEADER_FIELDS.contains(&key.as_str()) {
                tracing::warn!(
                    %data_type,
                    subtype,
                    field = %key,
                    "unknown header field configured in mapping, ignoring"
                );
            }
        }

        let product = headers
            .get("product_name")
            .map(String::as_str)
            .unwrap_or(DEFAULT_PRODUCT);
        let version = headers
            .get("product_version")
            .map(String::as_str)
            .unwrap_or(DEFAULT_PRODUCT_VERSION);
        // Event class id and name both fall back to the subtype.
        let event_type = headers
            .get("product_event_type")
            .map(String::as_str)
            .unwrap_or(subtype);
        let severity = normalize_severity(headers.get("severity").map(String::as_str));

        Ok(format!(
            "CEF:{}|{}|{}|{}|{}|{}|{}|{}",
            self.cef_version,
            escape_header(DEVICE_VENDOR),
            escape_header(product),
            escape_header(version),
            escape_header(event_type),
            escape_header(event_type),
            severity,
            pairs.join(&self.delimiter)
        ))
    }
}

/// Map a raw severity value onto the receiver severity scale. Numeric
/// severities 0-10 and the common label spellings are recognized; anything
/// else is "Unknown".
pub fn normalize_severity(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else { return "Unknown" };
    match raw.to_lowercase().as_str() {
        "low" | "0" | "1" | "2" | "3" => "Low",
        "med" | "medium" | "4" | "5" | "6" => "Medium",
        "high" | "7" | "8" => "High",
        "very-high" | "critical" | "9" | "10" => "Very-High",
        _ => "Unknown",
    }
}

/// Escape backslash and pipe in a header value. Newlines cannot appear in a
/// header (they would break line framing) and are replaced with spaces.
pub fn escape_header(value: &str) -> String {
    escape_chars(value, &['|']).replace(['\n', '\r'], " ")
}

/// Escape backslash, equals and newlines in an extension value.
pub fn escape_extension(value: &str) -> String {
    escape_chars(value, &['='])
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Backslash-escape `specials` and backslash itself. Existing escapes are
/// stripped first so escaping already-escaped input is idempotent.
fn escape_chars(value: &str, specials: &[char]) -> String {
    let stripped = strip_escapes(value, specials);
    let mut out = String::with_capacity(stripped.len() + 4);
    for c in stripped.chars() {
        if c == '\\' || specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn strip_escapes(value: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\\' || specials.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(keys: &[&str]) -> CefGenerator {
        let allow: HashSet<String> = keys.iter().map(|k| k.to_string()).collect();
        CefGenerator::new(allow, " ", "0")
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_generate_fixed_header_order() {
        let gen = generator(&["src"]);
        let headers = headers(&[
            ("product_name", "NS"),
            ("product_version", "1.0"),
            ("product_event_type", "alert"),
            ("severity", "5"),
        ]);
        let extensions = vec![("src".to_string(), "10.0.0.1".to_string())];

        let line = gen
            .generate(&headers, &extensions, DataType::Alert, "DLP")
            .unwrap();
        assert_eq!(line, "CEF:0|CefBridge|NS|1.0|alert|alert|Medium|src=10.0.0.1");
    }

    #[test]
    fn test_generate_substitutes_constants_for_missing_headers() {
        let gen = generator(&["src"]);
        let extensions = vec![("src".to_string(), "10.0.0.1".to_string())];

        let line = gen
            .generate(&HashMap::new(), &extensions, DataType::Alert, "DLP")
            .unwrap();
        assert_eq!(
            line,
            "CEF:0|CefBridge|Security Events|1.0|DLP|DLP|Unknown|src=10.0.0.1"
        );
    }

    #[test]
    fn test_empty_extension_after_filtering_is_rejected() {
        let gen = generator(&["src"]);
        let extensions = vec![("nonexistent_key".to_string(), "x".to_string())];

        let err = gen
            .generate(&HashMap::new(), &extensions, DataType::Alert, "DLP")
            .unwrap_err();
        assert_eq!(err, CefError::EmptyExtension);
    }

    #[test]
    fn test_disallowed_extension_dropped_but_line_still_emitted() {
        let gen = generator(&["src"]);
        let extensions = vec![
            ("src".to_string(), "10.0.0.1".to_string()),
            ("bogus".to_string(), "x".to_string()),
        ];

        let line = gen
            .generate(&HashMap::new(), &extensions, DataType::Alert, "DLP")
            .unwrap();
        assert!(line.ends_with("|src=10.0.0.1"));
        assert!(!line.contains("bogus"));
    }

    #[test]
    fn test_extension_insertion_order_preserved() {
        let gen = generator(&["src", "dst", "act"]);
        let extensions = vec![
            ("dst".to_string(), "10.0.0.2".to_string()),
            ("act".to_string(), "block".to_string()),
            ("src".to_string(), "10.0.0.1".to_string()),
        ];

        let line = gen
            .generate(&HashMap::new(), &extensions, DataType::Event, "page")
            .unwrap();
        assert!(line.ends_with("|dst=10.0.0.2 act=block src=10.0.0.1"));
    }

    #[test]
    fn test_custom_delimiter_joins_pairs() {
        let allow: HashSet<String> = ["src", "dst"].iter().map(|k| k.to_string()).collect();
        let gen = CefGenerator::new(allow, "\t", "0");
        let extensions = vec![
            ("src".to_string(), "a".to_string()),
            ("dst".to_string(), "b".to_string()),
        ];

        let line = gen
            .generate(&HashMap::new(), &extensions, DataType::Event, "page")
            .unwrap();
        assert!(line.ends_with("|src=a\tdst=b"));
    }

    #[test]
    fn test_extension_escape_round_trip() {
        let escaped = escape_extension("a=b\\c");
        assert_eq!(escaped, "a\\=b\\\\c");

        // Re-parse: unescape recovers the original value exactly.
        let mut recovered = String::new();
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                recovered.push(chars.next().unwrap());
            } else {
                recovered.push(c);
            }
        }
        assert_eq!(recovered, "a=b\\c");
    }

    #[test]
    fn test_escaping_is_idempotent() {
        let once = escape_extension("a=b\\c");
        let twice = escape_extension(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_header_escape() {
        assert_eq!(escape_header("a|b\\c"), "a\\|b\\\\c");
        assert_eq!(escape_header("line\nbreak"), "line break");
    }

    #[test]
    fn test_severity_normalization() {
        assert_eq!(normalize_severity(Some("0")), "Low");
        assert_eq!(normalize_severity(Some("5")), "Medium");
        assert_eq!(normalize_severity(Some("8")), "High");
        assert_eq!(normalize_severity(Some("critical")), "Very-High");
        assert_eq!(normalize_severity(Some("HIGH")), "High");
        assert_eq!(normalize_severity(Some("nonsense")), "Unknown");
        assert_eq!(normalize_severity(None), "Unknown");
    }
}
