//! Graph types for field-level lineage
//!
//! A [`LineageGraph`] owns the tables, their fields and the field-to-field
//! mappings of one version. Derived attributes (upstream/downstream tables,
//! mapped fields) are always recomputed from the mapping set, never stored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Canonical case form for table and field names
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Case-insensitive comparison form of an object / ETL name.
/// The name itself keeps the case it was supplied with.
pub fn fold_object_name(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// =============================================================================
// FIELDS & TABLES
// =============================================================================

/// A column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared by the schema source (false for synthesized placeholders)
    #[serde(default)]
    pub declared: bool,
}

impl Field {
    /// Placeholder field synthesized for an undeclared mapping endpoint
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            is_primary_key: false,
            is_foreign_key: false,
            description: None,
            declared: false,
        }
    }
}

/// A named collection of fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Fields keyed by canonical name
    pub fields: BTreeMap<String, Field>,
    /// Order in which the table was first seen in the input (lane tie-break)
    pub first_seen: usize,
    /// Declared by the schema source (false for synthesized placeholders)
    #[serde(default)]
    pub declared: bool,
}

impl Table {
    pub fn placeholder(name: impl Into<String>, first_seen: usize) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            first_seen,
            declared: false,
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Ensure a field exists, returning true when it had to be created
    pub fn ensure_field(&mut self, name: &str) -> bool {
        if self.fields.contains_key(name) {
            return false;
        }
        self.fields
            .insert(name.to_string(), Field::placeholder(name));
        true
    }
}

// =============================================================================
// MAPPINGS
// =============================================================================

/// Kind of transformation a mapping performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Direct copy of the source value
    Direct,
    Join,
    Lookup,
    Transform,
    Constant,
}

impl MappingKind {
    /// Classify a raw kind label; `None` when the label is not recognised
    pub fn classify(label: &str) -> Option<Self> {
        let upper = label.trim().to_uppercase();
        match upper.as_str() {
            "" | "MAP" | "MAPPING" | "DIRECT" | "COPY" => return Some(MappingKind::Direct),
            _ => {}
        }

        if upper.contains("JOIN") {
            Some(MappingKind::Join)
        } else if upper.contains("LOOKUP") {
            Some(MappingKind::Lookup)
        } else if upper.contains("CONST") {
            Some(MappingKind::Constant)
        } else if ["TRANSFORM", "CALC", "DERIV", "EXPR"]
            .iter()
            .any(|k| upper.contains(k))
        {
            Some(MappingKind::Transform)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingKind::Direct => "MAP",
            MappingKind::Join => "JOIN",
            MappingKind::Lookup => "LOOKUP",
            MappingKind::Transform => "TRANSFORM",
            MappingKind::Constant => "CONSTANT",
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, MappingKind::Direct)
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `TABLE.FIELD` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(table: impl AsRef<str>, field: impl AsRef<str>) -> Self {
        Self {
            table: normalize_name(table.as_ref()),
            field: normalize_name(field.as_ref()),
        }
    }

    /// Parse a `TABLE.FIELD` composite. The table part is everything up to
    /// the last dot so schema-qualified tables (`SCHEMA.TABLE.FIELD`) work.
    pub fn parse(s: &str) -> Option<Self> {
        let (table, field) = s.trim().rsplit_once('.')?;
        if table.trim().is_empty() || field.trim().is_empty() {
            return None;
        }
        Some(Self::new(table, field))
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// Identity of a mapping: unique per graph version, unit of delta comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_table: String,
    pub source_field: String,
    pub dest_table: String,
    pub dest_field: String,
}

impl MappingKey {
    pub fn new(
        source_table: impl AsRef<str>,
        source_field: impl AsRef<str>,
        dest_table: impl AsRef<str>,
        dest_field: impl AsRef<str>,
    ) -> Self {
        Self {
            source_table: normalize_name(source_table.as_ref()),
            source_field: normalize_name(source_field.as_ref()),
            dest_table: normalize_name(dest_table.as_ref()),
            dest_field: normalize_name(dest_field.as_ref()),
        }
    }

    pub fn source(&self) -> FieldRef {
        FieldRef {
            table: self.source_table.clone(),
            field: self.source_field.clone(),
        }
    }

    pub fn dest(&self) -> FieldRef {
        FieldRef {
            table: self.dest_table.clone(),
            field: self.dest_field.clone(),
        }
    }

    /// Mapping from a table into itself
    pub fn is_self_table(&self) -> bool {
        self.source_table == self.dest_table
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_table, self.source_field, self.dest_table, self.dest_field
        )
    }
}

/// Join metadata carried by JOIN mappings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
}

impl JoinInfo {
    pub fn is_empty(&self) -> bool {
        self.alias.is_none() && self.keys.is_none() && self.filters.is_none()
    }
}

/// A directed source field -> destination field mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub key: MappingKey,
    /// Owning object / ETL name (empty when not supplied)
    pub object_name: String,
    pub kind: MappingKind,
    /// Raw kind label as supplied, for display
    pub kind_label: String,
    /// Free-text transformation rule (empty when not supplied)
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Input row this mapping came from
    pub source_row: usize,
}

/// Values that carry their own [`MappingKey`]
pub(crate) trait Keyed {
    fn identity(&self) -> &MappingKey;
}

impl Keyed for Mapping {
    fn identity(&self) -> &MappingKey {
        &self.key
    }
}

/// Serde adapter for maps keyed by [`MappingKey`]: JSON object keys must be
/// strings, so the map is written as the sequence of its values and rebuilt
/// from each value's own key.
pub(crate) mod keyed_values {
    use super::{Keyed, MappingKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<V, S>(map: &BTreeMap<MappingKey, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<BTreeMap<MappingKey, V>, D::Error>
    where
        V: Deserialize<'de> + Keyed,
        D: Deserializer<'de>,
    {
        let values = Vec::<V>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|value| (value.identity().clone(), value))
            .collect())
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// Direction flags of a field relative to the mappings touching it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUsage {
    /// Field is the source of at least one mapping
    pub outgoing: bool,
    /// Field is the destination of at least one mapping
    pub incoming: bool,
}

/// Statistics about a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub table_count: usize,
    pub field_count: usize,
    pub mapping_count: usize,
    pub object_count: usize,
    pub mappings_by_kind: BTreeMap<MappingKind, usize>,
}

/// Tables and mappings of one version
///
/// Invariant: every mapping endpoint names a field that exists on a table of
/// this graph. [`crate::graph::GraphBuilder`] upholds it by synthesizing
/// placeholders; [`LineageGraph::retain_mappings`] keeps all tables so it
/// cannot break it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub version: String,
    tables: BTreeMap<String, Table>,
    #[serde(with = "keyed_values")]
    mappings: BTreeMap<MappingKey, Mapping>,
}

impl LineageGraph {
    /// Create a new empty graph for a version label
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            tables: BTreeMap::new(),
            mappings: BTreeMap::new(),
        }
    }

    // =========================================================================
    // CONSTRUCTION (crate-internal, used by builder and delta)
    // =========================================================================

    /// Table for `name`, created as a placeholder if absent.
    /// Returns the table and whether it was created.
    pub(crate) fn ensure_table(&mut self, name: &str) -> (&mut Table, bool) {
        let next_seen = self.tables.len();
        let mut created = false;
        let table = self.tables.entry(name.to_string()).or_insert_with(|| {
            created = true;
            Table::placeholder(name, next_seen)
        });
        (table, created)
    }

    pub(crate) fn insert_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Insert a mapping, returning the one it replaced
    pub(crate) fn insert_mapping(&mut self, mapping: Mapping) -> Option<Mapping> {
        self.mappings.insert(mapping.key.clone(), mapping)
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn field(&self, field: &FieldRef) -> Option<&Field> {
        self.tables.get(&field.table)?.field(&field.field)
    }

    pub fn mapping(&self, key: &MappingKey) -> Option<&Mapping> {
        self.mappings.get(key)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables in first-seen order (name as tie-break)
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.name.cmp(&b.name))
        });
        tables
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Mappings in identity-key order
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    // =========================================================================
    // DERIVED ATTRIBUTES
    // =========================================================================

    /// Tables feeding `table` directly
    pub fn upstream_tables(&self, table: &str) -> BTreeSet<&str> {
        self.mappings
            .keys()
            .filter(|k| k.dest_table == table)
            .map(|k| k.source_table.as_str())
            .collect()
    }

    /// Tables fed by `table` directly
    pub fn downstream_tables(&self, table: &str) -> BTreeSet<&str> {
        self.mappings
            .keys()
            .filter(|k| k.source_table == table)
            .map(|k| k.dest_table.as_str())
            .collect()
    }

    /// Fields of `table` that participate in at least one mapping
    pub fn mapped_fields(&self, table: &str) -> BTreeMap<&str, FieldUsage> {
        let mut fields: BTreeMap<&str, FieldUsage> = BTreeMap::new();
        for key in self.mappings.keys() {
            if key.source_table == table {
                fields.entry(key.source_field.as_str()).or_default().outgoing = true;
            }
            if key.dest_table == table {
                fields.entry(key.dest_field.as_str()).or_default().incoming = true;
            }
        }
        fields
    }

    /// Object / ETL names with the number of mappings they own
    pub fn objects(&self) -> BTreeMap<&str, usize> {
        let mut objects: BTreeMap<&str, usize> = BTreeMap::new();
        for mapping in self.mappings.values() {
            if !mapping.object_name.is_empty() {
                *objects.entry(mapping.object_name.as_str()).or_insert(0) += 1;
            }
        }
        objects
    }

    /// Copy of this graph keeping only mappings matching `keep`.
    /// All tables and fields are kept.
    pub fn retain_mappings<F>(&self, mut keep: F) -> LineageGraph
    where
        F: FnMut(&Mapping) -> bool,
    {
        LineageGraph {
            version: self.version.clone(),
            tables: self.tables.clone(),
            mappings: self
                .mappings
                .iter()
                .filter(|(_, m)| keep(m))
                .map(|(k, m)| (k.clone(), m.clone()))
                .collect(),
        }
    }

    /// Every mapping endpoint whose table or field is missing
    pub fn dangling_endpoints(&self) -> Vec<FieldRef> {
        self.mappings
            .keys()
            .flat_map(|k| [k.source(), k.dest()])
            .filter(|f| self.field(f).is_none())
            .collect()
    }

    pub fn compute_stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            table_count: self.tables.len(),
            field_count: self.tables.values().map(Table::field_count).sum(),
            mapping_count: self.mappings.len(),
            object_count: self.objects().len(),
            mappings_by_kind: BTreeMap::new(),
        };
        for mapping in self.mappings.values() {
            *stats.mappings_by_kind.entry(mapping.kind).or_insert(0) += 1;
        }
        stats
    }
}
