//! Lineage tracing from a focal selector
//!
//! - Table trace: BFS over table edges in the requested direction(s)
//! - Field trace: BFS over field edges, narrower than the table trace
//! - Object trace: direct filter on the owning object name, not a BFS
//!
//! The tracer never computes layout. Callers restrict an existing
//! [`LayoutResult`] to the traced tables with [`TraceResult::positions`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

use super::layout::{LayoutPosition, LayoutResult};
use super::types::{fold_object_name, normalize_name, FieldRef, LineageGraph, Mapping, MappingKey};

/// What the user focused on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Table(String),
    Field(FieldRef),
    Object(String),
}

impl Selector {
    pub fn table(name: impl AsRef<str>) -> Self {
        Selector::Table(normalize_name(name.as_ref()))
    }

    pub fn field(table: impl AsRef<str>, field: impl AsRef<str>) -> Self {
        Selector::Field(FieldRef::new(table, field))
    }

    pub fn object(name: impl AsRef<str>) -> Self {
        Selector::Object(name.as_ref().trim().to_string())
    }

    /// Same selector in canonical form. Selectors decoded from JSON skip the
    /// constructors, so the tracer normalizes them before lookup.
    pub fn normalized(&self) -> Self {
        match self {
            Selector::Table(name) => Selector::table(name),
            Selector::Field(field) => Selector::field(&field.table, &field.field),
            Selector::Object(name) => Selector::object(name),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Table(name) => write!(f, "table {}", name),
            Selector::Field(field) => write!(f, "field {}", field),
            Selector::Object(name) => write!(f, "object {}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDirection {
    Upstream,
    Downstream,
    #[default]
    Both,
}

impl TraceDirection {
    pub fn includes_upstream(&self) -> bool {
        matches!(self, TraceDirection::Upstream | TraceDirection::Both)
    }

    pub fn includes_downstream(&self) -> bool {
        matches!(self, TraceDirection::Downstream | TraceDirection::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    /// At least one mapping was traced
    Found,
    /// The selector exists but nothing is reachable in the requested direction
    Empty,
    /// The selector names nothing in the graph
    NotFound,
}

/// Induced subgraph of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceResult {
    pub selector: Selector,
    pub direction: TraceDirection,
    pub outcome: TraceOutcome,
    pub tables: BTreeSet<String>,
    pub mappings: BTreeSet<MappingKey>,
    /// Relevant fields per table; empty for table traces (all fields relevant)
    pub field_scope: BTreeMap<String, BTreeSet<String>>,
}

impl TraceResult {
    fn empty(selector: &Selector, direction: TraceDirection, outcome: TraceOutcome) -> Self {
        Self {
            selector: selector.clone(),
            direction,
            outcome,
            tables: BTreeSet::new(),
            mappings: BTreeSet::new(),
            field_scope: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn contains_mapping(&self, key: &MappingKey) -> bool {
        self.mappings.contains(key)
    }

    /// Fields of `table` the trace touches, `None` when every field is relevant
    pub fn field_scope(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.field_scope.get(table)
    }

    /// Existing positions of the traced tables, unchanged
    pub fn positions(&self, layout: &LayoutResult) -> BTreeMap<String, LayoutPosition> {
        self.tables
            .iter()
            .filter_map(|t| layout.position(t).map(|p| (t.clone(), p)))
            .collect()
    }
}

/// Stateless tracer over a graph
#[derive(Debug, Clone, Copy, Default)]
pub struct LineageTracer;

impl LineageTracer {
    pub fn new() -> Self {
        Self
    }

    pub fn trace(
        &self,
        graph: &LineageGraph,
        selector: &Selector,
        direction: TraceDirection,
    ) -> TraceResult {
        let selector = &selector.normalized();
        let result = match selector {
            Selector::Table(name) => self.trace_table(graph, selector, name, direction),
            Selector::Field(field) => self.trace_field(graph, selector, field, direction),
            Selector::Object(name) => self.trace_object(graph, selector, name, direction),
        };

        debug!(
            %selector,
            ?direction,
            outcome = ?result.outcome,
            tables = result.tables.len(),
            mappings = result.mappings.len(),
            "Traced lineage"
        );
        result
    }

    fn trace_table(
        &self,
        graph: &LineageGraph,
        selector: &Selector,
        table: &str,
        direction: TraceDirection,
    ) -> TraceResult {
        if !graph.has_table(table) {
            return TraceResult::empty(selector, direction, TraceOutcome::NotFound);
        }

        let mut incoming: HashMap<&str, Vec<&Mapping>> = HashMap::new();
        let mut outgoing: HashMap<&str, Vec<&Mapping>> = HashMap::new();
        for mapping in graph.mappings() {
            incoming
                .entry(mapping.key.dest_table.as_str())
                .or_default()
                .push(mapping);
            outgoing
                .entry(mapping.key.source_table.as_str())
                .or_default()
                .push(mapping);
        }

        let mut mappings = BTreeSet::new();
        if direction.includes_upstream() {
            walk(table, &incoming, |m| m.key.source_table.as_str(), &mut mappings);
        }
        if direction.includes_downstream() {
            walk(table, &outgoing, |m| m.key.dest_table.as_str(), &mut mappings);
        }

        self.finish(selector, direction, mappings, false)
    }

    fn trace_field(
        &self,
        graph: &LineageGraph,
        selector: &Selector,
        field: &FieldRef,
        direction: TraceDirection,
    ) -> TraceResult {
        if graph.field(field).is_none() {
            return TraceResult::empty(selector, direction, TraceOutcome::NotFound);
        }

        let mut incoming: HashMap<FieldRef, Vec<&Mapping>> = HashMap::new();
        let mut outgoing: HashMap<FieldRef, Vec<&Mapping>> = HashMap::new();
        for mapping in graph.mappings() {
            incoming.entry(mapping.key.dest()).or_default().push(mapping);
            outgoing.entry(mapping.key.source()).or_default().push(mapping);
        }

        let mut mappings = BTreeSet::new();
        if direction.includes_upstream() {
            walk(field.clone(), &incoming, |m| m.key.source(), &mut mappings);
        }
        if direction.includes_downstream() {
            walk(field.clone(), &outgoing, |m| m.key.dest(), &mut mappings);
        }

        self.finish(selector, direction, mappings, true)
    }

    fn trace_object(
        &self,
        graph: &LineageGraph,
        selector: &Selector,
        object: &str,
        direction: TraceDirection,
    ) -> TraceResult {
        let folded = fold_object_name(object);
        let mappings: BTreeSet<MappingKey> = graph
            .mappings()
            .filter(|m| !m.object_name.is_empty() && fold_object_name(&m.object_name) == folded)
            .map(|m| m.key.clone())
            .collect();

        if mappings.is_empty() {
            return TraceResult::empty(selector, direction, TraceOutcome::NotFound);
        }
        self.finish(selector, direction, mappings, true)
    }

    fn finish(
        &self,
        selector: &Selector,
        direction: TraceDirection,
        mappings: BTreeSet<MappingKey>,
        scoped: bool,
    ) -> TraceResult {
        if mappings.is_empty() {
            return TraceResult::empty(selector, direction, TraceOutcome::Empty);
        }

        let mut tables = BTreeSet::new();
        let mut field_scope: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for key in &mappings {
            tables.insert(key.source_table.clone());
            tables.insert(key.dest_table.clone());
            if scoped {
                field_scope
                    .entry(key.source_table.clone())
                    .or_default()
                    .insert(key.source_field.clone());
                field_scope
                    .entry(key.dest_table.clone())
                    .or_default()
                    .insert(key.dest_field.clone());
            }
        }

        TraceResult {
            selector: selector.clone(),
            direction,
            outcome: TraceOutcome::Found,
            tables,
            mappings,
            field_scope,
        }
    }
}

/// BFS from `start` along `edges`, collecting every traversed mapping.
/// `next` yields the node at the far end of a mapping.
fn walk<'a, N, F>(
    start: N,
    edges: &HashMap<N, Vec<&'a Mapping>>,
    next: F,
    collected: &mut BTreeSet<MappingKey>,
) where
    N: std::hash::Hash + Eq + Clone,
    F: Fn(&'a Mapping) -> N,
{
    let mut visited: HashSet<N> = HashSet::new();
    let mut queue: VecDeque<N> = VecDeque::new();
    visited.insert(start.clone());
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let Some(mappings) = edges.get(&node) else {
            continue;
        };
        for &mapping in mappings {
            collected.insert(mapping.key.clone());
            let neighbor = next(mapping);
            if visited.insert(neighbor.clone()) {
                queue.push_back(neighbor);
            }
        }
    }
}
