//! GraphBuilder - turns normalized mapping records into a [`LineageGraph`]
//!
//! The builder is a pure transformation: it can be re-run on re-ingested
//! records and always yields the same graph for the same input.
//!
//! ## Soft-failure policy
//!
//! A malformed row never aborts the build. Every problem is recorded as a
//! [`Diagnostic`] and a documented default is substituted:
//!
//! | Problem | Recovery |
//! |---------|----------|
//! | Missing table/field column | `UNNAMED` placeholder (`MALFORMED_RECORD`) |
//! | Missing object name / rule | empty string |
//! | Missing mapping kind | configured default kind (`MAP`) |
//! | Unrecognised kind label | TRANSFORM (`UNKNOWN_MAPPING_KIND`) |
//! | Endpoint not in schema | placeholder table/field (`DANGLING_REFERENCE`) |
//! | Duplicate identity key | last row wins (`DUPLICATE_IDENTITY`) |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::LineageConfig;
use crate::error::{Diagnostic, Diagnostics, Result};
use crate::graph::types::{
    normalize_name, Field, JoinInfo, LineageGraph, Mapping, MappingKey, MappingKind, Table,
};

/// Name substituted for a missing table or field column
pub const UNNAMED: &str = "UNNAMED";

// =============================================================================
// INPUT RECORDS
// =============================================================================

/// One normalized mapping row supplied by the ingestion collaborator
///
/// Column alias resolution happens upstream; every column is optional here so
/// that a malformed row can still be decoded and recovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub source_table: Option<String>,
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub dest_table: Option<String>,
    #[serde(default)]
    pub dest_field: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub mapping_kind: Option<String>,
    #[serde(default)]
    pub join_alias: Option<String>,
    #[serde(default)]
    pub join_keys: Option<String>,
    #[serde(default)]
    pub join_filters: Option<String>,
    #[serde(default)]
    pub constant_value: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MappingRecord {
    pub fn new(
        source_table: impl Into<String>,
        source_field: impl Into<String>,
        dest_table: impl Into<String>,
        dest_field: impl Into<String>,
    ) -> Self {
        Self {
            source_table: Some(source_table.into()),
            source_field: Some(source_field.into()),
            dest_table: Some(dest_table.into()),
            dest_field: Some(dest_field.into()),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.mapping_kind = Some(kind.into());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_object(mut self, object_name: impl Into<String>) -> Self {
        self.object_name = Some(object_name.into());
        self
    }

    fn join_info(&self) -> Option<JoinInfo> {
        let join = JoinInfo {
            alias: non_blank(&self.join_alias),
            keys: non_blank(&self.join_keys),
            filters: non_blank(&self.join_filters),
        };
        (!join.is_empty()).then_some(join)
    }
}

/// One column declaration from the optional schema collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub table_name: String,
    pub column_name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Decode a JSON array of mapping records
pub fn records_from_json(json: &str) -> Result<Vec<MappingRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Decode a JSON array of schema records
pub fn schema_from_json(json: &str) -> Result<Vec<SchemaRecord>> {
    Ok(serde_json::from_str(json)?)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// BUILD OUTPUT
// =============================================================================

/// A built graph plus everything that was recovered along the way
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    pub graph: LineageGraph,
    pub diagnostics: Diagnostics,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for one version's lineage graph
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    version: String,
    default_kind: String,
    include_unmapped_tables: bool,
    /// Declared tables -> declared fields, keyed by canonical names
    declared: Option<BTreeMap<String, BTreeMap<String, Field>>>,
}

impl GraphBuilder {
    /// Create a builder with default configuration
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_config(version, &LineageConfig::default())
    }

    pub fn with_config(version: impl Into<String>, config: &LineageConfig) -> Self {
        Self {
            version: version.into(),
            default_kind: config.default_mapping_kind.clone(),
            include_unmapped_tables: config.include_unmapped_tables,
            declared: None,
        }
    }

    /// Attach schema declarations used to enrich field attributes
    pub fn with_schema(mut self, schema: &[SchemaRecord]) -> Self {
        let mut declared: BTreeMap<String, BTreeMap<String, Field>> = BTreeMap::new();
        for record in schema {
            let table = normalize_name(&record.table_name);
            let column = normalize_name(&record.column_name);
            if table.is_empty() || column.is_empty() {
                continue;
            }
            declared.entry(table).or_default().insert(
                column.clone(),
                Field {
                    name: column,
                    data_type: non_blank(&record.data_type),
                    is_primary_key: record.is_primary_key,
                    is_foreign_key: record.is_foreign_key,
                    description: non_blank(&record.description),
                    declared: true,
                },
            );
        }
        self.declared = Some(declared);
        self
    }

    /// Build the graph from records in input order
    pub fn build(&self, records: &[MappingRecord]) -> BuildOutput {
        let mut graph = LineageGraph::new(self.version.clone());
        let mut diagnostics = Diagnostics::new();

        for (row, record) in records.iter().enumerate() {
            self.apply_record(&mut graph, &mut diagnostics, row, record);
        }

        if self.include_unmapped_tables {
            self.add_unmapped_tables(&mut graph);
        }

        info!(
            version = %self.version,
            records = records.len(),
            tables = graph.table_count(),
            mappings = graph.mapping_count(),
            diagnostics = diagnostics.len(),
            "Built lineage graph"
        );

        BuildOutput { graph, diagnostics }
    }

    fn apply_record(
        &self,
        graph: &mut LineageGraph,
        diagnostics: &mut Diagnostics,
        row: usize,
        record: &MappingRecord,
    ) {
        let source_table = required(&record.source_table, "source_table", row, diagnostics);
        let source_field = required(&record.source_field, "source_field", row, diagnostics);
        let dest_table = required(&record.dest_table, "dest_table", row, diagnostics);
        let dest_field = required(&record.dest_field, "dest_field", row, diagnostics);

        self.attach_endpoint(graph, diagnostics, row, &source_table, &source_field);
        self.attach_endpoint(graph, diagnostics, row, &dest_table, &dest_field);

        let kind_label = non_blank(&record.mapping_kind).unwrap_or_else(|| self.default_kind.clone());
        let kind = MappingKind::classify(&kind_label).unwrap_or_else(|| {
            diagnostics.push(Diagnostic::UnknownMappingKind {
                row,
                label: kind_label.clone(),
            });
            MappingKind::Transform
        });

        let mapping = Mapping {
            key: MappingKey {
                source_table,
                source_field,
                dest_table,
                dest_field,
            },
            object_name: non_blank(&record.object_name).unwrap_or_default(),
            kind,
            kind_label,
            rule: non_blank(&record.rule).unwrap_or_default(),
            join: record.join_info(),
            constant_value: non_blank(&record.constant_value),
            notes: non_blank(&record.notes),
            source_row: row,
        };

        let key = mapping.key.clone();
        if let Some(replaced) = graph.insert_mapping(mapping) {
            warn!(%key, replaced_row = replaced.source_row, row, "Duplicate mapping identity, last row wins");
            diagnostics.push(Diagnostic::DuplicateIdentity {
                key,
                replaced_row: replaced.source_row,
                overriding_row: row,
            });
        }
    }

    /// Ensure table and field exist, enriching from the schema when declared
    fn attach_endpoint(
        &self,
        graph: &mut LineageGraph,
        diagnostics: &mut Diagnostics,
        row: usize,
        table_name: &str,
        field_name: &str,
    ) {
        let declared_table = self
            .declared
            .as_ref()
            .and_then(|declared| declared.get(table_name));

        let (table, created) = graph.ensure_table(table_name);
        if created {
            if let Some(fields) = declared_table {
                table.declared = true;
                table.fields = fields.clone();
            }
        }

        if table.ensure_field(field_name) && self.declared.is_some() {
            debug!(table = table_name, field = field_name, row, "Synthesized placeholder field");
            diagnostics.push(Diagnostic::DanglingReference {
                row,
                table: table_name.to_string(),
                field: field_name.to_string(),
            });
        }
    }

    fn add_unmapped_tables(&self, graph: &mut LineageGraph) {
        let Some(declared) = &self.declared else {
            return;
        };
        for (name, fields) in declared {
            if graph.has_table(name) {
                continue;
            }
            let first_seen = graph.table_count();
            graph.insert_table(Table {
                name: name.clone(),
                fields: fields.clone(),
                first_seen,
                declared: true,
            });
        }
    }
}

/// Canonical value of a required column, or the placeholder
fn required(
    value: &Option<String>,
    column: &str,
    row: usize,
    diagnostics: &mut Diagnostics,
) -> String {
    match value.as_deref().map(normalize_name) {
        Some(name) if !name.is_empty() => name,
        _ => {
            diagnostics.push(Diagnostic::MalformedRecord {
                row,
                column: column.to_string(),
                substituted: UNNAMED.to_string(),
            });
            UNNAMED.to_string()
        }
    }
}
