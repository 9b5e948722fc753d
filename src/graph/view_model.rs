//! Render model handed to the drawing collaborator
//!
//! The render model is the only output of a session render pass. It is fully
//! resolved: every table has a grid slot and a canvas point, and every mapping
//! endpoint names the card row (or header) it attaches to. The renderer never
//! looks at the graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::delta::{DeltaRecord, DeltaSummary, TableChange};
use super::layout::{BackEdge, LayoutPosition, Point};
use super::trace::{Selector, TraceOutcome};
use super::types::{FieldUsage, MappingKey, MappingKind, Table};

// =============================================================================
// CARD DETAIL
// =============================================================================

/// How much of a table card is drawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardMode {
    /// Header only; every edge attaches to the header
    Compact,
    /// First rows plus a "+N more" marker
    #[default]
    Standard,
    /// Every field row
    Expanded,
}

/// Where an edge endpoint attaches on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anchor", rename_all = "snake_case")]
pub enum EdgeAnchor {
    FieldRow { row: usize },
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub usage: FieldUsage,
}

// =============================================================================
// RENDER MODEL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderStatus {
    Ready,
    /// Too many tables to draw without a focal selection
    AwaitingSelection { table_count: usize, threshold: usize },
    /// The selection traced to nothing
    EmptySelection { outcome: TraceOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTable {
    pub name: String,
    pub position: LayoutPosition,
    pub point: Point,
    /// Position comes from a manual override
    pub pinned: bool,
    pub card_mode: CardMode,
    /// Field rows drawn, in row order
    pub fields: Vec<RenderField>,
    /// Rows behind the "+N more" marker (all rows when compact)
    pub hidden_field_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<TableChange>,
}

impl RenderTable {
    /// Anchor for an edge touching `field`; falls back to the header whenever
    /// the row is not drawn
    pub fn anchor(&self, field: &str) -> EdgeAnchor {
        self.fields
            .iter()
            .position(|f| f.name == field)
            .map_or(EdgeAnchor::Header, |row| EdgeAnchor::FieldRow { row })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMapping {
    pub key: MappingKey,
    pub kind: MappingKind,
    pub kind_label: String,
    pub object_name: String,
    pub rule: String,
    pub source_anchor: EdgeAnchor,
    pub dest_anchor: EdgeAnchor,
    /// Set in delta mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaRecord>,
}

/// Fully resolved output of one render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderModel {
    pub session_id: Uuid,
    /// View state revision this model was computed from
    pub revision: u64,
    pub version: String,
    pub status: RenderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selector>,
    pub tables: Vec<RenderTable>,
    pub mappings: Vec<RenderMapping>,
    pub back_edges: Vec<BackEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_summary: Option<DeltaSummary>,
}

impl RenderModel {
    pub fn is_ready(&self) -> bool {
        self.status == RenderStatus::Ready
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&RenderTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn mapping(&self, key: &MappingKey) -> Option<&RenderMapping> {
        self.mappings.iter().find(|m| &m.key == key)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// =============================================================================
// CARD CONSTRUCTION
// =============================================================================

/// Rows of a card: mapped fields of `table` in name order, optionally
/// restricted to `scope`, cut according to `mode`.
/// Returns the drawn rows and the hidden count.
pub fn card_fields(
    table: &Table,
    mapped: &BTreeMap<&str, FieldUsage>,
    scope: Option<&BTreeSet<String>>,
    mode: CardMode,
    visible_rows: usize,
) -> (Vec<RenderField>, usize) {
    let rows: Vec<RenderField> = mapped
        .iter()
        .filter(|(name, _)| scope.map_or(true, |s| s.contains(**name)))
        .map(|(name, usage)| {
            let field = table.field(name);
            RenderField {
                name: name.to_string(),
                data_type: field.and_then(|f| f.data_type.clone()),
                is_primary_key: field.is_some_and(|f| f.is_primary_key),
                is_foreign_key: field.is_some_and(|f| f.is_foreign_key),
                usage: *usage,
            }
        })
        .collect();

    let shown = match mode {
        CardMode::Compact => 0,
        CardMode::Standard => visible_rows.min(rows.len()),
        CardMode::Expanded => rows.len(),
    };
    let hidden = rows.len() - shown;
    let mut rows = rows;
    rows.truncate(shown);
    (rows, hidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::{GraphBuilder, MappingRecord};
    use crate::graph::types::LineageGraph;

    fn wide_graph(fields: usize) -> LineageGraph {
        let records: Vec<MappingRecord> = (0..fields)
            .map(|i| {
                let name = format!("COL_{:02}", i);
                MappingRecord::new("WIDE", &name, "NARROW", &name)
            })
            .collect();
        GraphBuilder::new("test").build(&records).graph
    }

    fn card(graph: &LineageGraph, mode: CardMode) -> RenderTable {
        let table = graph.table("WIDE").unwrap();
        let mapped = graph.mapped_fields("WIDE");
        let (fields, hidden_field_count) = card_fields(table, &mapped, None, mode, 8);
        RenderTable {
            name: "WIDE".to_string(),
            position: LayoutPosition::new(0, 0),
            point: Point { x: 0.0, y: 0.0 },
            pinned: false,
            card_mode: mode,
            fields,
            hidden_field_count,
            delta: None,
        }
    }

    #[test]
    fn test_standard_card_collapses_overflow() {
        let graph = wide_graph(12);
        let card = card(&graph, CardMode::Standard);

        assert_eq!(card.fields.len(), 8);
        assert_eq!(card.hidden_field_count, 4);
        assert_eq!(card.anchor("COL_03"), EdgeAnchor::FieldRow { row: 3 });
        assert_eq!(card.anchor("COL_10"), EdgeAnchor::Header);
    }

    #[test]
    fn test_compact_card_anchors_header() {
        let graph = wide_graph(3);
        let card = card(&graph, CardMode::Compact);

        assert!(card.fields.is_empty());
        assert_eq!(card.hidden_field_count, 3);
        assert_eq!(card.anchor("COL_00"), EdgeAnchor::Header);
    }

    #[test]
    fn test_expanded_card_shows_everything() {
        let graph = wide_graph(12);
        let card = card(&graph, CardMode::Expanded);

        assert_eq!(card.fields.len(), 12);
        assert_eq!(card.hidden_field_count, 0);
        assert_eq!(card.anchor("COL_11"), EdgeAnchor::FieldRow { row: 11 });
    }

    #[test]
    fn test_scope_restricts_rows() {
        let graph = wide_graph(5);
        let table = graph.table("WIDE").unwrap();
        let mapped = graph.mapped_fields("WIDE");
        let scope: BTreeSet<String> = ["COL_04".to_string()].into_iter().collect();

        let (fields, hidden) = card_fields(table, &mapped, Some(&scope), CardMode::Standard, 8);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "COL_04");
        assert!(fields[0].usage.outgoing);
        assert_eq!(hidden, 0);
    }

    #[test]
    fn test_status_serialization() {
        let status = RenderStatus::AwaitingSelection {
            table_count: 150,
            threshold: 100,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "awaiting_selection");
        assert_eq!(json["table_count"], 150);
    }
}
