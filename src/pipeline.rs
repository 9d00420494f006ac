//! Transform Pipeline
//!
//! Drives a batch of parsed records through field resolution and CEF
//! generation. Failures are isolated per record: a record that cannot be
//! transformed is logged and skipped, never aborting the batch. Output
//! order follows input order for the records that survive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::cef::CefGenerator;
use crate::config::SiemConfig;
use crate::mappings::{AttributeMapping, SubtypeMapping};
use crate::resolve::resolve_field;
use crate::{DataType, TenantLookup};

/// Counters for one transformer, monotonically increasing over its
/// lifetime. Cheap to read at any point.
#[derive(Debug, Default)]
struct TransformStats {
    records_in: AtomicU64,
    records_out: AtomicU64,
    records_skipped: AtomicU64,
}

/// Point-in-time snapshot of the transform counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformMetrics {
    /// Records handed to [`Transformer::transform`].
    pub records_in: u64,
    /// CEF lines produced.
    pub records_out: u64,
    /// Records dropped after a per-record failure.
    pub records_skipped: u64,
}

/// Batch transformer binding one validated mapping to one generator
/// configuration. Shareable across workers behind an `Arc`.
pub struct Transformer {
    mapping: Arc<AttributeMapping>,
    generator: CefGenerator,
    variables: HashMap<String, String>,
    stats: TransformStats,
}

impl Transformer {
    /// Build a transformer from a validated mapping and the destination
    /// configuration it will generate lines for.
    pub fn new(mapping: Arc<AttributeMapping>, config: &SiemConfig) -> Self {
        let generator = CefGenerator::new(
            config.extension_allow_list(),
            mapping.delimiter(),
            mapping.cef_version(),
        );
        Self {
            mapping,
            generator,
            variables: HashMap::new(),
            stats: TransformStats::default(),
        }
    }

    /// Register the tenant so mapping values of `$tenant_name` substitute
    /// to the tenant's display name.
    pub fn with_tenant(mut self, tenant: &dyn TenantLookup) -> Self {
        self.variables
            .insert("$tenant_name".to_string(), tenant.tenant_name());
        self
    }

    /// Transform a batch of records of one data type and subtype into CEF
    /// lines.
    ///
    /// An unmapped subtype yields an empty batch after a single warning.
    /// Any other per-record failure is logged with the record index and
    /// skipped; surviving lines keep input order.
    pub fn transform(&self, records: &[Value], data_type: DataType, subtype: &str) -> Vec<String> {
        self.stats
            .records_in
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        let Some(subtype_mapping) = self.mapping.subtype_mapping(data_type, subtype) else {
            tracing::warn!(
                %data_type,
                subtype,
                count = records.len(),
                "no mapping configured for subtype, dropping batch"
            );
            self.stats
                .records_skipped
                .fetch_add(records.len() as u64, Ordering::Relaxed);
            return Vec::new();
        };

        let mut lines = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match self.transform_record(record, subtype_mapping, data_type, subtype) {
                Ok(line) => lines.push(line),
                Err(reason) => {
                    tracing::error!(
                        %data_type,
                        subtype,
                        index,
                        reason,
                        "could not transform record, skipping"
                    );
                    self.stats.records_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.stats
            .records_out
            .fetch_add(lines.len() as u64, Ordering::Relaxed);
        lines
    }

    /// Snapshot of the lifetime counters.
    pub fn metrics(&self) -> TransformMetrics {
        TransformMetrics {
            records_in: self.stats.records_in.load(Ordering::Relaxed),
            records_out: self.stats.records_out.load(Ordering::Relaxed),
            records_skipped: self.stats.records_skipped.load(Ordering::Relaxed),
        }
    }

    fn transform_record(
        &self,
        record: &Value,
        subtype_mapping: &SubtypeMapping,
        data_type: DataType,
        subtype: &str,
    ) -> Result<String, String> {
        let headers = self.build_headers(record, subtype_mapping, data_type, subtype);
        let extensions = self.build_extensions(record, subtype_mapping, data_type, subtype);
        self.generator
            .generate(&headers, &extensions, data_type, subtype)
            .map_err(|e| e.to_string())
    }

    /// Resolve the header rules. A header field that fails to resolve is
    /// omitted; the generator substitutes its fallback.
    fn build_headers(
        &self,
        record: &Value,
        subtype_mapping: &SubtypeMapping,
        data_type: DataType,
        subtype: &str,
    ) -> HashMap<String, String> {
        let mut headers = HashMap::with_capacity(subtype_mapping.header.len());
        let mut missing: Vec<&str> = Vec::new();
        for (field, rule) in &subtype_mapping.header {
            match resolve_field(
                record,
                rule.mapping_field.as_deref(),
                rule.default_value.as_deref(),
                false,
            ) {
                Ok(value) => {
                    let value = self
                        .variables
                        .get(&value.to_lowercase())
                        .cloned()
                        .unwrap_or(value);
                    headers.insert(field.clone(), value);
                }
                Err(_) => missing.push(field),
            }
        }
        if !missing.is_empty() {
            tracing::debug!(
                %data_type,
                subtype,
                fields = ?missing,
                "header fields unresolved, using fallbacks"
            );
        }
        headers
    }

    /// Resolve the extension rules in declaration order. Unresolved fields
    /// are omitted; allow-list filtering happens in the generator.
    fn build_extensions(
        &self,
        record: &Value,
        subtype_mapping: &SubtypeMapping,
        data_type: DataType,
        subtype: &str,
    ) -> Vec<(String, String)> {
        let mut extensions = Vec::with_capacity(subtype_mapping.extension.len());
        let mut missing: Vec<&str> = Vec::new();
        for (field, rule) in &subtype_mapping.extension {
            match resolve_field(
                record,
                rule.mapping_field.as_deref(),
                rule.default_value.as_deref(),
                rule.is_json_path,
            ) {
                Ok(value) => extensions.push((field.clone(), value)),
                Err(_) => missing.push(field),
            }
        }
        if !missing.is_empty() {
            tracing::debug!(
                %data_type,
                subtype,
                fields = ?missing,
                "extension fields unresolved, omitting"
            );
        }
        extensions
    }
}
