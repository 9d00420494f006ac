//! Attribute-Mapping Model and Validator
//!
//! Parses the user-authored mapping document into strict in-memory types,
//! validated once at configuration-acceptance time. After that the mapping
//! is immutable and safely shared read-only across workers.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::MappingValidationError;
use crate::DataType;

/// The closed set of canonical CEF header keys. Any other key found in a
/// `header` sub-document still gets its rule validated, but is ignored with
/// a warning when the line is generated.
pub const HEADER_FIELDS: [&str; 4] = [
    "product_name",
    "product_version",
    "product_event_type",
    "severity",
];

/// Delimiter joining extension key=value pairs when the document omits one.
pub const DEFAULT_DELIMITER: &str = " ";

/// Rule for one CEF header field: a direct record key and/or a constant
/// fallback. At most two properties.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRule {
    /// Record key to resolve the value from.
    #[serde(default)]
    pub mapping_field: Option<String>,
    /// Constant used when the record key is absent (or exclusively).
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Rule for one CEF extension field. Same as [`HeaderRule`] plus the
/// `is_json_path` flag; at most three properties.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionRule {
    /// Record key, or a JSONPath expression when `is_json_path` is set.
    #[serde(default)]
    pub mapping_field: Option<String>,
    /// Constant used when the mapping target is absent (or exclusively).
    #[serde(default)]
    pub default_value: Option<String>,
    /// Interpret `mapping_field` as a JSONPath expression.
    #[serde(default)]
    pub is_json_path: bool,
}

/// Validated mapping for one subtype: ordered header and extension rules.
#[derive(Debug, Clone)]
pub struct SubtypeMapping {
    /// Header field rules in declaration order.
    pub header: Vec<(String, HeaderRule)>,
    /// Extension field rules in declaration order.
    pub extension: Vec<(String, ExtensionRule)>,
}

/// The validated attribute-mapping document.
///
/// Subtype lookup is case-insensitive; validation guarantees at most one
/// entry per case-folded name.
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    delimiter: String,
    cef_version: String,
    alerts: Vec<(String, SubtypeMapping)>,
    events: Vec<(String, SubtypeMapping)>,
}

impl AttributeMapping {
    /// Parse and validate a raw mapping document.
    pub fn parse(raw: &str) -> Result<Self, MappingValidationError> {
        let doc: Value = serde_json::from_str(raw)?;
        Self::from_value(&doc)
    }

    /// Validate an already-deserialized mapping document.
    pub fn from_value(doc: &Value) -> Result<Self, MappingValidationError> {
        let root = doc
            .as_object()
            .ok_or_else(|| document_error("expected a JSON object at the root"))?;

        let delimiter = match root.get("delimiter") {
            None => DEFAULT_DELIMITER.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => return Err(document_error("\"delimiter\" must be a non-empty string")),
        };

        let cef_version = match root.get("cef_version") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                return Err(document_error(
                    "\"cef_version\" is required and must be a non-empty string",
                ))
            }
        };

        let taxonomy = root
            .get("taxonomy")
            .and_then(Value::as_object)
            .ok_or_else(|| document_error("\"taxonomy\" is required and must be an object"))?;

        for key in taxonomy.keys() {
            if key != "alert" && key != "event" {
                return Err(document_error(&format!(
                    "taxonomy key \"{key}\" is not a known data type (expected \"alert\" or \"event\")"
                )));
            }
        }

        Ok(Self {
            delimiter,
            cef_version,
            alerts: validate_data_type(taxonomy, DataType::Alert)?,
            events: validate_data_type(taxonomy, DataType::Event)?,
        })
    }

    /// Delimiter joining extension key=value pairs.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// CEF version tag emitted at the start of every line.
    pub fn cef_version(&self) -> &str {
        &self.cef_version
    }

    /// Case-insensitive subtype lookup.
    pub fn subtype_mapping(&self, data_type: DataType, subtype: &str) -> Option<&SubtypeMapping> {
        let wanted = subtype.to_lowercase();
        self.subtypes(data_type)
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, mapping)| mapping)
    }

    /// Subtype names mapped for a data type, in declaration order.
    pub fn extract_subtypes(&self, data_type: DataType) -> Vec<String> {
        self.subtypes(data_type)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn subtypes(&self, data_type: DataType) -> &[(String, SubtypeMapping)] {
        match data_type {
            DataType::Alert => &self.alerts,
            DataType::Event => &self.events,
        }
    }
}

fn document_error(reason: &str) -> MappingValidationError {
    MappingValidationError::Document(reason.to_string())
}

fn validate_data_type(
    taxonomy: &Map<String, Value>,
    data_type: DataType,
) -> Result<Vec<(String, SubtypeMapping)>, MappingValidationError> {
    let Some(subtypes) = taxonomy.get(data_type.as_str()) else {
        return Ok(Vec::new());
    };
    let subtypes = subtypes.as_object().ok_or_else(|| {
        document_error(&format!("taxonomy entry \"{data_type}\" must be an object"))
    })?;

    let mut validated: Vec<(String, SubtypeMapping)> = Vec::with_capacity(subtypes.len());
    for (subtype, mapping) in subtypes {
        let folded = subtype.to_lowercase();
        if validated
            .iter()
            .any(|(name, _)| name.to_lowercase() == folded)
        {
            return Err(MappingValidationError::Subtype {
                data_type: data_type.to_string(),
                subtype: subtype.clone(),
                reason: "duplicate subtype name (lookup is case-insensitive)".to_string(),
            });
        }
        let mapping = validate_subtype(data_type, subtype, mapping)?;
        validated.push((subtype.clone(), mapping));
    }
    Ok(validated)
}

fn validate_subtype(
    data_type: DataType,
    subtype: &str,
    mapping: &Value,
) -> Result<SubtypeMapping, MappingValidationError> {
    let subtype_error = |reason: String| MappingValidationError::Subtype {
        data_type: data_type.to_string(),
        subtype: subtype.to_string(),
        reason,
    };

    let members = mapping
        .as_object()
        .ok_or_else(|| subtype_error("expected an object".to_string()))?;

    for key in members.keys() {
        if key != "header" && key != "extension" {
            return Err(subtype_error(format!(
                "unexpected member \"{key}\" (only \"header\" and \"extension\" are allowed)"
            )));
        }
    }
    let header = members
        .get("header")
        .and_then(Value::as_object)
        .ok_or_else(|| subtype_error("\"header\" is required and must be an object".to_string()))?;
    let extension = members
        .get("extension")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            subtype_error("\"extension\" is required and must be an object".to_string())
        })?;

    Ok(SubtypeMapping {
        header: validate_rules(data_type, subtype, "header", header)?,
        extension: validate_rules(data_type, subtype, "extension", extension)?,
    })
}

fn validate_rules<R>(
    data_type: DataType,
    subtype: &str,
    kind: &'static str,
    fields: &Map<String, Value>,
) -> Result<Vec<(String, R)>, MappingValidationError>
where
    R: for<'de> Deserialize<'de> + FieldRule,
{
    let field_error = |field: &str, reason: String| MappingValidationError::Field {
        data_type: data_type.to_string(),
        subtype: subtype.to_string(),
        kind,
        field: field.to_string(),
        reason,
    };

    let mut rules = Vec::with_capacity(fields.len());
    for (field, raw) in fields {
        let rule: R = serde_json::from_value(raw.clone())
            .map_err(|e| field_error(field, e.to_string()))?;
        rule.check_invariant()
            .map_err(|reason| field_error(field, reason))?;
        rules.push((field.clone(), rule));
    }
    Ok(rules)
}

/// Shared mapping/default invariant: at least one of the two must be present
/// and non-empty; both present is fine; both empty is invalid; exactly one
/// present and empty is invalid.
pub(crate) trait FieldRule {
    fn mapping_field(&self) -> Option<&str>;
    fn default_value(&self) -> Option<&str>;

    fn check_invariant(&self) -> Result<(), String> {
        match (self.mapping_field(), self.default_value()) {
            (None, None) => Err(
                "at least one of \"mapping_field\" and \"default_value\" must be present"
                    .to_string(),
            ),
            (Some(m), Some(d)) if m.is_empty() && d.is_empty() => {
                Err("\"mapping_field\" and \"default_value\" cannot both be empty".to_string())
            }
            (Some(m), None) if m.is_empty() => {
                Err("\"mapping_field\" cannot be empty when no \"default_value\" is provided"
                    .to_string())
            }
            (None, Some(d)) if d.is_empty() => {
                Err("\"default_value\" cannot be empty when no \"mapping_field\" is provided"
                    .to_string())
            }
            _ => Ok(()),
        }
    }
}

impl FieldRule for HeaderRule {
    fn mapping_field(&self) -> Option<&str> {
        self.mapping_field.as_deref()
    }
    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

impl FieldRule for ExtensionRule {
    fn mapping_field(&self) -> Option<&str> {
        self.mapping_field.as_deref()
    }
    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}
