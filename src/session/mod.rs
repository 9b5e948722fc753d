//! Workspaces and sessions
//!
//! A [`LineageWorkspace`] owns the immutable version graphs. They are built
//! once and shared behind `Arc`, so any number of sessions (possibly on
//! different threads) can read them.
//!
//! A [`LineageSession`] is the explicit per-user context. Every interaction
//! mutates its [`ViewState`] and then calls [`LineageSession::render`], which
//! recomputes the whole render model:
//!
//! ```text
//! filter -> layout -> lazy-render gate -> trace -> reconcile -> RenderModel
//! ```
//!
//! A newer render simply replaces an older one; there is nothing to cancel.

pub mod view_state;

pub use view_state::{ManualPosition, ResolvedPosition, ViewFilters, ViewState};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LineageConfig;
use crate::error::{Diagnostics, Result};
use crate::graph::builder::{BuildOutput, GraphBuilder, MappingRecord, SchemaRecord};
use crate::graph::delta::{DeltaEngine, DeltaGraph};
use crate::graph::layout::LayoutEngine;
use crate::graph::search::{SearchHit, SearchIndex};
use crate::graph::trace::{LineageTracer, Selector};
use crate::graph::types::{LineageGraph, MappingKey};
use crate::graph::view_model::{
    card_fields, RenderMapping, RenderModel, RenderStatus, RenderTable,
};

// =============================================================================
// WORKSPACE
// =============================================================================

/// Which graph a session is looking at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveVersion {
    #[default]
    Primary,
    Secondary,
    /// Union of primary (old) and secondary (new) with change annotations
    Delta,
}

#[derive(Debug)]
struct VersionData {
    graph: Arc<LineageGraph>,
    diagnostics: Diagnostics,
    search: SearchIndex,
}

impl VersionData {
    fn new(output: BuildOutput) -> Arc<Self> {
        let search = SearchIndex::build(&output.graph);
        Arc::new(Self {
            graph: Arc::new(output.graph),
            diagnostics: output.diagnostics,
            search,
        })
    }
}

/// Shared, immutable graphs of one or two versions
#[derive(Debug, Clone)]
pub struct LineageWorkspace {
    config: Arc<LineageConfig>,
    primary: Arc<VersionData>,
    secondary: Option<Arc<VersionData>>,
    delta: Option<Arc<DeltaGraph>>,
    delta_search: Option<Arc<SearchIndex>>,
}

impl LineageWorkspace {
    /// Workspace around an already built primary version
    pub fn new(config: LineageConfig, primary: BuildOutput) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            primary: VersionData::new(primary),
            secondary: None,
            delta: None,
            delta_search: None,
        })
    }

    /// Build the primary version from records
    pub fn from_records(
        config: LineageConfig,
        version: &str,
        records: &[MappingRecord],
        schema: Option<&[SchemaRecord]>,
    ) -> Result<Self> {
        let output = build_version(&config, version, records, schema);
        Self::new(config, output)
    }

    /// Add a second version and compare it against the primary one
    pub fn with_secondary(mut self, secondary: BuildOutput) -> Self {
        let layout = LayoutEngine::with_config(self.config.layout.clone());
        let delta = DeltaEngine::with_layout(layout).compare(&self.primary.graph, &secondary.graph);

        self.delta_search = Some(Arc::new(SearchIndex::build(&delta.graph)));
        self.delta = Some(Arc::new(delta));
        self.secondary = Some(VersionData::new(secondary));
        self
    }

    pub fn with_secondary_records(
        self,
        version: &str,
        records: &[MappingRecord],
        schema: Option<&[SchemaRecord]>,
    ) -> Self {
        let output = build_version(&self.config, version, records, schema);
        self.with_secondary(output)
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    pub fn primary(&self) -> &LineageGraph {
        &self.primary.graph
    }

    pub fn secondary(&self) -> Option<&LineageGraph> {
        self.secondary.as_ref().map(|v| v.graph.as_ref())
    }

    pub fn delta(&self) -> Option<&DeltaGraph> {
        self.delta.as_deref()
    }

    /// Build diagnostics of a version; the delta view has none
    pub fn diagnostics(&self, version: ActiveVersion) -> Option<&Diagnostics> {
        match version {
            ActiveVersion::Primary => Some(&self.primary.diagnostics),
            ActiveVersion::Secondary => self.secondary.as_ref().map(|v| &v.diagnostics),
            ActiveVersion::Delta => None,
        }
    }

    pub fn has_version(&self, version: ActiveVersion) -> bool {
        match version {
            ActiveVersion::Primary => true,
            ActiveVersion::Secondary => self.secondary.is_some(),
            ActiveVersion::Delta => self.delta.is_some(),
        }
    }

    /// Start an independent session
    pub fn session(&self) -> LineageSession {
        LineageSession::new(self.clone())
    }

    fn graph(&self, version: ActiveVersion) -> &LineageGraph {
        let primary: &LineageGraph = &self.primary.graph;
        match version {
            ActiveVersion::Primary => primary,
            ActiveVersion::Secondary => self.secondary().unwrap_or(primary),
            ActiveVersion::Delta => self.delta().map_or(primary, |d| &d.graph),
        }
    }

    fn search_index(&self, version: ActiveVersion) -> &SearchIndex {
        let primary = &self.primary.search;
        match version {
            ActiveVersion::Primary => primary,
            ActiveVersion::Secondary => self.secondary.as_ref().map_or(primary, |v| &v.search),
            ActiveVersion::Delta => self.delta_search.as_deref().unwrap_or(primary),
        }
    }
}

fn build_version(
    config: &LineageConfig,
    version: &str,
    records: &[MappingRecord],
    schema: Option<&[SchemaRecord]>,
) -> BuildOutput {
    let builder = GraphBuilder::with_config(version, config);
    match schema {
        Some(schema) => builder.with_schema(schema).build(records),
        None => builder.build(records),
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Per-user view over a workspace
#[derive(Debug, Clone)]
pub struct LineageSession {
    workspace: LineageWorkspace,
    active: ActiveVersion,
    state: ViewState,
    layout: LayoutEngine,
    tracer: LineageTracer,
}

impl LineageSession {
    pub fn new(workspace: LineageWorkspace) -> Self {
        let layout = LayoutEngine::with_config(workspace.config.layout.clone());
        Self {
            workspace,
            active: ActiveVersion::Primary,
            state: ViewState::new(),
            layout,
            tracer: LineageTracer::new(),
        }
    }

    pub fn workspace(&self) -> &LineageWorkspace {
        &self.workspace
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }

    pub fn active(&self) -> ActiveVersion {
        self.active
    }

    /// Switch the active graph; returns false when that version is not loaded
    pub fn set_active(&mut self, version: ActiveVersion) -> bool {
        if !self.workspace.has_version(version) {
            warn!(?version, session_id = %self.state.session_id, "Version not loaded");
            return false;
        }
        self.active = version;
        true
    }

    pub fn active_graph(&self) -> &LineageGraph {
        self.workspace.graph(self.active)
    }

    /// Autocomplete over the active graph
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.workspace.search_index(self.active).search(query, limit)
    }

    pub fn select(&mut self, selector: Selector) {
        self.state.select(selector);
    }

    /// Recompute the render model from scratch
    pub fn render(&self) -> RenderModel {
        let config = self.workspace.config();
        let graph = self.active_graph();
        let delta = match self.active {
            ActiveVersion::Delta => self.workspace.delta(),
            _ => None,
        };
        let filters = self.state.filters();

        let filtered = graph.retain_mappings(|m| {
            filters.allows_mapping(m)
                && delta
                    .and_then(|d| d.record(&m.key))
                    .map_or(true, |r| filters.allows_delta(r.kind))
        });
        let layout = self.layout.layout(&filtered);

        let mut model = RenderModel {
            session_id: self.state.session_id,
            revision: self.state.revision(),
            version: graph.version.clone(),
            status: RenderStatus::Ready,
            selection: self.state.selection().cloned(),
            tables: Vec::new(),
            mappings: Vec::new(),
            back_edges: Vec::new(),
            delta_summary: delta.map(|d| d.summary),
        };

        let table_count = filtered.table_count();
        if self.state.selection().is_none()
            && !self.state.render_all()
            && table_count > config.lazy_render_threshold
        {
            info!(
                table_count,
                threshold = config.lazy_render_threshold,
                "Render gated until a selection is made"
            );
            model.status = RenderStatus::AwaitingSelection {
                table_count,
                threshold: config.lazy_render_threshold,
            };
            return model;
        }

        // Visible tables and mappings, plus per-table field scope
        let (tables, mappings, scope): (BTreeSet<String>, BTreeSet<MappingKey>, _) =
            match self.state.selection() {
                Some(selector) => {
                    let trace = self.tracer.trace(&filtered, selector, filters.direction);
                    if trace.is_empty() {
                        model.status = RenderStatus::EmptySelection {
                            outcome: trace.outcome,
                        };
                        return model;
                    }
                    (trace.tables, trace.mappings, trace.field_scope)
                }
                None => (
                    filtered.table_names().map(str::to_string).collect(),
                    filtered.mappings().map(|m| m.key.clone()).collect(),
                    BTreeMap::new(),
                ),
            };

        let resolved = self.state.reconcile(&layout, &self.layout);
        let visible = filtered.retain_mappings(|m| mappings.contains(&m.key));

        for table in filtered.tables() {
            if !tables.contains(&table.name) {
                continue;
            }
            let Some(position) = resolved.get(&table.name) else {
                continue;
            };
            let mode = self.state.card_mode(&table.name);
            let mapped = visible.mapped_fields(&table.name);
            let (fields, hidden_field_count) = card_fields(
                table,
                &mapped,
                scope.get(&table.name),
                mode,
                config.visible_field_rows,
            );
            model.tables.push(RenderTable {
                name: table.name.clone(),
                position: position.position,
                point: position.point,
                pinned: position.pinned,
                card_mode: mode,
                fields,
                hidden_field_count,
                delta: delta.and_then(|d| d.table_change(&table.name)),
            });
        }

        let cards: HashMap<&str, &RenderTable> = model
            .tables
            .iter()
            .map(|t| (t.name.as_str(), t))
            .collect();
        let mut rendered_mappings = Vec::with_capacity(visible.mapping_count());
        for mapping in visible.mappings() {
            let key = &mapping.key;
            let (Some(source), Some(dest)) = (
                cards.get(key.source_table.as_str()),
                cards.get(key.dest_table.as_str()),
            ) else {
                continue;
            };
            rendered_mappings.push(RenderMapping {
                key: key.clone(),
                kind: mapping.kind,
                kind_label: mapping.kind_label.clone(),
                object_name: mapping.object_name.clone(),
                rule: mapping.rule.clone(),
                source_anchor: source.anchor(&key.source_field),
                dest_anchor: dest.anchor(&key.dest_field),
                delta: delta.and_then(|d| d.record(key).cloned()),
            });
        }
        model.mappings = rendered_mappings;

        model.back_edges = layout
            .back_edges
            .into_iter()
            .filter(|e| tables.contains(&e.source_table) && tables.contains(&e.dest_table))
            .collect();

        debug!(
            session_id = %self.state.session_id,
            revision = model.revision,
            tables = model.tables.len(),
            mappings = model.mappings.len(),
            "Rendered lineage view"
        );
        model
    }
}
