//! Field Resolver
//!
//! Resolves one output field's value from one input record plus one
//! field-mapping rule, with a fixed precedence between the mapped record
//! value and the configured default:
//!
//! ```text
//!  default | mapping | target in record | result
//! ---------+---------+------------------+------------------
//!     P    |    P    |        P         | mapped value
//!     P    |    P    |        NP        | default
//!     NP   |    P    |        P         | mapped value
//!     P    |    NP   |        —         | default
//!     NP   |    P    |        NP        | FieldError::NotFound
//! ```
//!
//! ("P" = present and non-empty, "NP" = absent or empty.)

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::FieldError;

/// Resolve one field.
///
/// `mapping_field` is a direct record key, or a JSONPath expression when
/// `is_json_path` is set. JSONPath matches are string-coerced and joined
/// with commas; an empty result set counts as "target absent" and falls
/// through to the default.
///
/// Compatibility quirk carried over from the upstream mapping convention:
/// a present but falsy record value resolves to the literal string "null",
/// except integers, which are always returned as-is (so a present `0`
/// resolves to `"0"`, not `"null"`). Do not extend this substitution to
/// other types.
pub fn resolve_field(
    record: &Value,
    mapping_field: Option<&str>,
    default_value: Option<&str>,
    is_json_path: bool,
) -> Result<String, FieldError> {
    let mapping = mapping_field.filter(|m| !m.is_empty());
    let default = default_value.filter(|d| !d.is_empty());

    match mapping {
        Some(field) => {
            let target = if is_json_path {
                lookup_json_path(record, field)
            } else {
                lookup_direct(record, field)
            };
            match target {
                Some(value) => Ok(value),
                None => default
                    .map(str::to_string)
                    .ok_or_else(|| FieldError::NotFound(field.to_string())),
            }
        }
        None => default
            .map(str::to_string)
            .ok_or(FieldError::Unresolvable),
    }
}

/// Direct key lookup with the falsy-value substitution described on
/// [`resolve_field`]. Returns `None` only when the key is absent.
fn lookup_direct(record: &Value, field: &str) -> Option<String> {
    let value = record.get(field)?;
    if is_integer(value) || is_truthy(value) {
        Some(coerce_to_string(value))
    } else {
        Some("null".to_string())
    }
}

/// Evaluate a JSONPath expression against the whole record and join all
/// matches with commas. An unparseable expression behaves like an empty
/// result set.
fn lookup_json_path(record: &Value, expression: &str) -> Option<String> {
    let path = match JsonPath::parse(expression) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(expression, error = %e, "invalid JSONPath expression, treating as no match");
            return None;
        }
    };
    let matches = path.query(record).all();
    if matches.is_empty() {
        return None;
    }
    Some(
        matches
            .iter()
            .map(|v| coerce_to_string(v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "srcip": "10.0.0.1",
            "count": 0,
            "ratio": 0.0,
            "empty": "",
            "flag": false,
            "user": { "email": "a@b.com" },
            "dlp": { "files": [ { "name": "a.txt" }, { "name": "b.txt" } ] }
        })
    }

    #[test]
    fn test_mapped_value_wins_over_default() {
        let value = resolve_field(&record(), Some("srcip"), Some("0.0.0.0"), false).unwrap();
        assert_eq!(value, "10.0.0.1");
    }

    #[test]
    fn test_default_when_target_absent() {
        let value = resolve_field(&record(), Some("missing"), Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_mapped_value_without_default() {
        let value = resolve_field(&record(), Some("srcip"), None, false).unwrap();
        assert_eq!(value, "10.0.0.1");
    }

    #[test]
    fn test_default_without_mapping() {
        let value = resolve_field(&record(), None, Some("constant"), false).unwrap();
        assert_eq!(value, "constant");
    }

    #[test]
    fn test_not_found_when_no_default() {
        let err = resolve_field(&record(), Some("missing"), None, false).unwrap_err();
        assert_eq!(err, FieldError::NotFound("missing".to_string()));
    }

    #[test]
    fn test_neither_mapping_nor_default() {
        let err = resolve_field(&record(), None, None, false).unwrap_err();
        assert_eq!(err, FieldError::Unresolvable);
    }

    #[test]
    fn test_integer_zero_is_returned_as_is() {
        let value = resolve_field(&record(), Some("count"), None, false).unwrap();
        assert_eq!(value, "0");
    }

    #[test]
    fn test_non_integer_falsy_values_become_null() {
        assert_eq!(resolve_field(&record(), Some("empty"), None, false).unwrap(), "null");
        assert_eq!(resolve_field(&record(), Some("flag"), None, false).unwrap(), "null");
        assert_eq!(resolve_field(&record(), Some("ratio"), None, false).unwrap(), "null");
    }

    #[test]
    fn test_empty_mapping_field_falls_back_to_default() {
        let value = resolve_field(&record(), Some(""), Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_json_path_single_match() {
        let value = resolve_field(&record(), Some("$.user.email"), None, true).unwrap();
        assert_eq!(value, "a@b.com");
    }

    #[test]
    fn test_json_path_multiple_matches_joined_with_comma() {
        let value =
            resolve_field(&record(), Some("$.dlp.files[*].name"), None, true).unwrap();
        assert_eq!(value, "a.txt,b.txt");
    }

    #[test]
    fn test_json_path_empty_result_falls_back_to_default() {
        let value = resolve_field(&record(), Some("$.nope"), Some("fallback"), true).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_json_path_empty_result_without_default_fails() {
        let err = resolve_field(&record(), Some("$.nope"), None, true).unwrap_err();
        assert_eq!(err, FieldError::NotFound("$.nope".to_string()));
    }

    #[test]
    fn test_invalid_json_path_treated_as_no_match() {
        let value = resolve_field(&record(), Some("not a path"), Some("fallback"), true).unwrap();
        assert_eq!(value, "fallback");
    }
}
