//! Version comparison
//!
//! [`DeltaEngine::compare`] classifies every mapping identity key of two graphs
//! as added, removed, modified or unchanged, and lays out the union of both
//! graphs so the delta view can show removed mappings next to current ones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use super::layout::{LayoutEngine, LayoutResult};
use super::types::{keyed_values, Keyed, LineageGraph, Mapping, MappingKey, MappingKind, Table};

/// Classification of one mapping across two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Added => "added",
            DeltaKind::Removed => "removed",
            DeltaKind::Modified => "modified",
            DeltaKind::Unchanged => "unchanged",
        }
    }

    /// Kind seen when old and new are swapped
    pub fn inverted(&self) -> Self {
        match self {
            DeltaKind::Added => DeltaKind::Removed,
            DeltaKind::Removed => DeltaKind::Added,
            other => *other,
        }
    }
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The compared attributes of a mapping in one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub object_name: String,
    pub kind: MappingKind,
    pub kind_label: String,
    pub rule: String,
}

impl From<&Mapping> for MappingSnapshot {
    fn from(mapping: &Mapping) -> Self {
        Self {
            object_name: mapping.object_name.clone(),
            kind: mapping.kind,
            kind_label: mapping.kind_label.clone(),
            rule: mapping.rule.clone(),
        }
    }
}

impl MappingSnapshot {
    /// Kind label and rule are the compared attributes. Labels are compared
    /// as supplied (trimmed, any case), so `LEFT JOIN` and `INNER JOIN` differ
    /// even though both classify as a join.
    fn differs_from(&self, other: &MappingSnapshot) -> bool {
        comparable_label(&self.kind_label) != comparable_label(&other.kind_label)
            || self.rule != other.rule
    }
}

/// `MAPPING` is an alias of `MAP`
fn comparable_label(label: &str) -> String {
    let upper = label.trim().to_uppercase();
    if upper == "MAPPING" {
        "MAP".to_string()
    } else {
        upper
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub key: MappingKey,
    pub kind: DeltaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<MappingSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<MappingSnapshot>,
}

impl Keyed for DeltaRecord {
    fn identity(&self) -> &MappingKey {
        &self.key
    }
}

impl DeltaRecord {
    /// The record as a comparison in the opposite direction would produce it
    pub fn inverted(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind.inverted(),
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Aggregate counts of a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl DeltaSummary {
    fn count(&mut self, kind: DeltaKind) {
        match kind {
            DeltaKind::Added => self.added += 1,
            DeltaKind::Removed => self.removed += 1,
            DeltaKind::Modified => self.modified += 1,
            DeltaKind::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified + self.unchanged
    }

    pub fn has_changes(&self) -> bool {
        self.added + self.removed + self.modified > 0
    }
}

/// Presence of a table across the two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableChange {
    Added,
    Removed,
    Unchanged,
}

/// Union graph annotated with per-mapping classifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaGraph {
    pub graph: LineageGraph,
    #[serde(with = "keyed_values")]
    pub records: BTreeMap<MappingKey, DeltaRecord>,
    pub table_changes: BTreeMap<String, TableChange>,
    pub summary: DeltaSummary,
    pub layout: LayoutResult,
}

impl DeltaGraph {
    pub fn record(&self, key: &MappingKey) -> Option<&DeltaRecord> {
        self.records.get(key)
    }

    pub fn records_of(&self, kind: DeltaKind) -> impl Iterator<Item = &DeltaRecord> {
        self.records.values().filter(move |r| r.kind == kind)
    }

    pub fn table_change(&self, table: &str) -> Option<TableChange> {
        self.table_changes.get(table).copied()
    }
}

/// Stateless comparison engine
#[derive(Debug, Clone, Default)]
pub struct DeltaEngine {
    layout: LayoutEngine,
}

impl DeltaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: LayoutEngine) -> Self {
        Self { layout }
    }

    pub fn compare(&self, old: &LineageGraph, new: &LineageGraph) -> DeltaGraph {
        let mut records = BTreeMap::new();
        let mut summary = DeltaSummary::default();

        for mapping in new.mappings() {
            let new_snapshot = MappingSnapshot::from(mapping);
            let record = match old.mapping(&mapping.key) {
                None => DeltaRecord {
                    key: mapping.key.clone(),
                    kind: DeltaKind::Added,
                    old: None,
                    new: Some(new_snapshot),
                },
                Some(previous) => {
                    let old_snapshot = MappingSnapshot::from(previous);
                    let kind = if old_snapshot.differs_from(&new_snapshot) {
                        DeltaKind::Modified
                    } else {
                        DeltaKind::Unchanged
                    };
                    DeltaRecord {
                        key: mapping.key.clone(),
                        kind,
                        old: Some(old_snapshot),
                        new: Some(new_snapshot),
                    }
                }
            };
            summary.count(record.kind);
            records.insert(mapping.key.clone(), record);
        }

        for mapping in old.mappings() {
            if new.mapping(&mapping.key).is_none() {
                summary.count(DeltaKind::Removed);
                records.insert(
                    mapping.key.clone(),
                    DeltaRecord {
                        key: mapping.key.clone(),
                        kind: DeltaKind::Removed,
                        old: Some(MappingSnapshot::from(mapping)),
                        new: None,
                    },
                );
            }
        }

        let (graph, table_changes) = union_graph(old, new);
        let layout = self.layout.layout(&graph);

        info!(
            old = %old.version,
            new = %new.version,
            added = summary.added,
            removed = summary.removed,
            modified = summary.modified,
            unchanged = summary.unchanged,
            "Compared lineage versions"
        );

        DeltaGraph {
            graph,
            records,
            table_changes,
            summary,
            layout,
        }
    }
}

/// Tables and fields of both versions; mappings of `new` plus those only in `old`.
/// First-seen order follows `new`, then tables only in `old`.
fn union_graph(
    old: &LineageGraph,
    new: &LineageGraph,
) -> (LineageGraph, BTreeMap<String, TableChange>) {
    let mut graph = LineageGraph::new(format!("{} vs {}", old.version, new.version));
    let mut changes = BTreeMap::new();

    for table in new.tables() {
        let mut merged = table.clone();
        merged.first_seen = graph.table_count();
        let change = match old.table(&table.name) {
            Some(previous) => {
                for (name, field) in &previous.fields {
                    merged
                        .fields
                        .entry(name.clone())
                        .or_insert_with(|| field.clone());
                }
                merged.declared |= previous.declared;
                TableChange::Unchanged
            }
            None => TableChange::Added,
        };
        changes.insert(table.name.clone(), change);
        graph.insert_table(merged);
    }

    for table in old.tables() {
        if new.has_table(&table.name) {
            continue;
        }
        graph.insert_table(Table {
            first_seen: graph.table_count(),
            ..table.clone()
        });
        changes.insert(table.name.clone(), TableChange::Removed);
    }

    for mapping in new.mappings() {
        graph.insert_mapping(mapping.clone());
    }
    for mapping in old.mappings() {
        if new.mapping(&mapping.key).is_none() {
            graph.insert_mapping(mapping.clone());
        }
    }

    (graph, changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::{GraphBuilder, MappingRecord};

    fn build(version: &str, records: &[MappingRecord]) -> LineageGraph {
        GraphBuilder::new(version).build(records).graph
    }

    fn base_records() -> Vec<MappingRecord> {
        vec![
            MappingRecord::new("A", "ID", "B", "ID"),
            MappingRecord::new("B", "ID", "C", "ID").with_rule("x"),
        ]
    }

    #[test]
    fn test_identity_comparison_is_all_unchanged() {
        let graph = build("v1", &base_records());
        let delta = DeltaEngine::new().compare(&graph, &graph);

        assert_eq!(
            delta.summary,
            DeltaSummary {
                added: 0,
                removed: 0,
                modified: 0,
                unchanged: 2,
            }
        );
        assert!(!delta.summary.has_changes());
        assert_eq!(delta.graph.mapping_count(), 2);
    }

    #[test]
    fn test_rule_change_is_single_modification() {
        let old = build("v1", &base_records());
        let mut changed = base_records();
        changed[1] = MappingRecord::new("B", "ID", "C", "ID").with_rule("x*2");
        let new = build("v2", &changed);

        let delta = DeltaEngine::new().compare(&old, &new);
        assert_eq!(delta.summary.modified, 1);
        assert_eq!(delta.summary.added, 0);
        assert_eq!(delta.summary.removed, 0);

        let record = delta.records_of(DeltaKind::Modified).next().unwrap();
        assert_eq!(record.key, MappingKey::new("B", "ID", "C", "ID"));
        assert_eq!(record.old.as_ref().unwrap().rule, "x");
        assert_eq!(record.new.as_ref().unwrap().rule, "x*2");
    }

    #[test]
    fn test_kind_change_is_modification() {
        let old = build("v1", &[MappingRecord::new("A", "ID", "B", "ID")]);
        let new = build(
            "v2",
            &[MappingRecord::new("A", "ID", "B", "ID").with_kind("LOOKUP")],
        );

        let delta = DeltaEngine::new().compare(&old, &new);
        assert_eq!(delta.summary.modified, 1);
    }

    #[test]
    fn test_label_change_within_one_class_is_modification() {
        for (before, after) in [("LEFT JOIN", "INNER JOIN"), ("PIVOT", "AGGREGATE")] {
            let old = build("v1", &[MappingRecord::new("A", "ID", "B", "ID").with_kind(before)]);
            let new = build("v2", &[MappingRecord::new("A", "ID", "B", "ID").with_kind(after)]);
            assert_eq!(
                old.mappings().next().unwrap().kind,
                new.mappings().next().unwrap().kind
            );

            let delta = DeltaEngine::new().compare(&old, &new);
            assert_eq!(delta.summary.modified, 1, "{} -> {}", before, after);
            assert_eq!(delta.summary.unchanged, 0);
        }
    }

    #[test]
    fn test_label_case_and_map_alias_are_unchanged() {
        let old = build(
            "v1",
            &[
                MappingRecord::new("A", "ID", "B", "ID").with_kind("MAP"),
                MappingRecord::new("A", "NAME", "B", "NAME").with_kind("Left Join"),
            ],
        );
        let new = build(
            "v2",
            &[
                MappingRecord::new("A", "ID", "B", "ID").with_kind("mapping"),
                MappingRecord::new("A", "NAME", "B", "NAME").with_kind(" LEFT JOIN "),
            ],
        );

        let delta = DeltaEngine::new().compare(&old, &new);
        assert_eq!(delta.summary.unchanged, 2);
        assert!(!delta.summary.has_changes());
    }

    #[test]
    fn test_delta_graph_json_round_trip() {
        let old = build("v1", &base_records());
        let new = build(
            "v2",
            &[
                MappingRecord::new("B", "ID", "C", "ID").with_rule("x*2"),
                MappingRecord::new("C", "ID", "D", "ID"),
            ],
        );
        let delta = DeltaEngine::new().compare(&old, &new);

        let json = serde_json::to_string(&delta).unwrap();
        let decoded: DeltaGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, delta);

        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(value["records"].as_array().unwrap().len(), 3);
        assert_eq!(value["graph"]["mappings"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_object_rename_alone_is_unchanged() {
        let old = build("v1", &[MappingRecord::new("A", "ID", "B", "ID").with_object("OLD")]);
        let new = build("v2", &[MappingRecord::new("A", "ID", "B", "ID").with_object("NEW")]);

        let delta = DeltaEngine::new().compare(&old, &new);
        assert_eq!(delta.summary.unchanged, 1);
    }

    #[test]
    fn test_added_removed_and_union_tables() {
        let old = build("v1", &[MappingRecord::new("A", "ID", "LEGACY", "ID")]);
        let new = build("v2", &[MappingRecord::new("A", "ID", "B", "ID")]);

        let delta = DeltaEngine::new().compare(&old, &new);
        assert_eq!(delta.summary.added, 1);
        assert_eq!(delta.summary.removed, 1);

        assert_eq!(delta.graph.table_count(), 3);
        assert_eq!(delta.graph.mapping_count(), 2);
        assert_eq!(delta.table_change("A"), Some(TableChange::Unchanged));
        assert_eq!(delta.table_change("B"), Some(TableChange::Added));
        assert_eq!(delta.table_change("LEGACY"), Some(TableChange::Removed));
        assert!(delta.graph.dangling_endpoints().is_empty());

        // Removed table placed after the new version's tables
        assert_eq!(delta.graph.table("LEGACY").unwrap().first_seen, 2);
        assert_eq!(delta.layout.position("LEGACY").unwrap().depth, 1);
    }

    #[test]
    fn test_fields_unioned_per_table() {
        let old = build("v1", &[MappingRecord::new("A", "OLD_COL", "B", "ID")]);
        let new = build("v2", &[MappingRecord::new("A", "NEW_COL", "B", "ID")]);

        let delta = DeltaEngine::new().compare(&old, &new);
        let table = delta.graph.table("A").unwrap();
        assert!(table.has_field("OLD_COL"));
        assert!(table.has_field("NEW_COL"));
    }

    #[test]
    fn test_swap_inverts_records() {
        let old = build("v1", &base_records());
        let new = build(
            "v2",
            &[
                MappingRecord::new("B", "ID", "C", "ID").with_rule("x*2"),
                MappingRecord::new("C", "ID", "D", "ID"),
            ],
        );

        let engine = DeltaEngine::new();
        let forward = engine.compare(&old, &new);
        let backward = engine.compare(&new, &old);

        assert_eq!(forward.summary.added, backward.summary.removed);
        assert_eq!(forward.summary.removed, backward.summary.added);
        assert_eq!(forward.summary.modified, backward.summary.modified);
        for (key, record) in &forward.records {
            assert_eq!(backward.record(key), Some(&record.inverted()));
        }
    }
}
