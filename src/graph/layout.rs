//! Hierarchical layout for lineage graphs
//!
//! Tables are placed in columns by depth (longest path from a source table)
//! and in rows by lane (stable order within a depth).
//!
//! ## Algorithm
//!
//! 1. Collapse mappings into distinct table-to-table edges (self-mappings ignored)
//! 2. Roots are tables with no incoming edge; they start at depth 0
//! 3. BFS from all roots with max-relaxation: depth(v) = max(depth(v), depth(u) + 1)
//! 4. An edge into a table already on the current path is a cycle and is not followed
//! 5. Tables never reached (disconnected or cycle-only islands) get depth 0
//! 6. Lanes follow first-seen input order, name as tie-break
//! 7. Edges with depth(dst) <= depth(src) are reported as back edges

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

use super::types::LineageGraph;

/// Spacing of the canvas grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Distance between depth columns
    #[serde(default = "default_column_spacing")]
    pub column_spacing: f32,
    /// Distance between lanes within a column
    #[serde(default = "default_row_spacing")]
    pub row_spacing: f32,
    /// Margin from the canvas origin
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Depth grows left-to-right when true, top-to-bottom otherwise
    #[serde(default = "default_horizontal")]
    pub horizontal: bool,
}

fn default_column_spacing() -> f32 {
    320.0
}

fn default_row_spacing() -> f32 {
    120.0
}

fn default_margin() -> f32 {
    60.0
}

fn default_horizontal() -> bool {
    true
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_spacing: default_column_spacing(),
            row_spacing: default_row_spacing(),
            margin: default_margin(),
            horizontal: default_horizontal(),
        }
    }
}

/// Grid slot of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub depth: u32,
    pub lane: u32,
}

impl LayoutPosition {
    pub fn new(depth: u32, lane: u32) -> Self {
        Self { depth, lane }
    }
}

/// Canvas coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Table edge that does not point forward in the layout
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackEdge {
    pub source_table: String,
    pub dest_table: String,
}

/// Result of a layout run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub positions: BTreeMap<String, LayoutPosition>,
    /// Edges closing a cycle
    pub back_edges: Vec<BackEdge>,
    pub max_depth: u32,
}

impl LayoutResult {
    pub fn position(&self, table: &str) -> Option<LayoutPosition> {
        self.positions.get(table).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn has_cycles(&self) -> bool {
        !self.back_edges.is_empty()
    }

    /// Tables at a depth in lane order
    pub fn column(&self, depth: u32) -> Vec<&str> {
        let mut column: Vec<(u32, &str)> = self
            .positions
            .iter()
            .filter(|(_, p)| p.depth == depth)
            .map(|(name, p)| (p.lane, name.as_str()))
            .collect();
        column.sort();
        column.into_iter().map(|(_, name)| name).collect()
    }
}

/// Stateless layout engine
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Compute positions for every table of `graph`
    pub fn layout(&self, graph: &LineageGraph) -> LayoutResult {
        let tables = graph.tables();
        if tables.is_empty() {
            return LayoutResult::default();
        }

        let index: HashMap<&str, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();

        // Distinct table edges, ordered for deterministic traversal
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for mapping in graph.mappings() {
            let key = &mapping.key;
            if key.is_self_table() {
                continue;
            }
            if let (Some(&from), Some(&to)) = (
                index.get(key.source_table.as_str()),
                index.get(key.dest_table.as_str()),
            ) {
                edges.insert((from, to));
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
        let mut in_degree = vec![0usize; tables.len()];
        for &(from, to) in &edges {
            children[from].push(to);
            in_degree[to] += 1;
        }

        let depths = self.assign_depths(&children, &in_degree);

        let mut positions = BTreeMap::new();
        let mut next_lane: BTreeMap<u32, u32> = BTreeMap::new();
        for (i, table) in tables.iter().enumerate() {
            let depth = depths[i];
            let lane = next_lane.entry(depth).or_insert(0);
            positions.insert(table.name.clone(), LayoutPosition::new(depth, *lane));
            *lane += 1;
        }

        let back_edges: Vec<BackEdge> = edges
            .iter()
            .filter(|(from, to)| depths[*to] <= depths[*from])
            .map(|&(from, to)| BackEdge {
                source_table: tables[from].name.clone(),
                dest_table: tables[to].name.clone(),
            })
            .collect();

        let max_depth = depths.iter().copied().max().unwrap_or(0);

        debug!(
            tables = tables.len(),
            edges = edges.len(),
            max_depth,
            back_edges = back_edges.len(),
            "Computed lineage layout"
        );

        LayoutResult {
            positions,
            back_edges,
            max_depth,
        }
    }

    /// BFS with max-relaxation from every root.
    ///
    /// Each queue entry carries the path that reached it; an edge into a table
    /// on that path is not followed, so depths are bounded by the table count
    /// and the traversal terminates on cyclic input.
    fn assign_depths(&self, children: &[Vec<usize>], in_degree: &[usize]) -> Vec<u32> {
        let mut depth: Vec<Option<u32>> = vec![None; children.len()];
        let mut queue: VecDeque<(usize, u32, Vec<usize>)> = VecDeque::new();

        for (i, &degree) in in_degree.iter().enumerate() {
            if degree == 0 {
                depth[i] = Some(0);
                queue.push_back((i, 0, vec![i]));
            }
        }

        while let Some((current, current_depth, path)) = queue.pop_front() {
            // Superseded by a deeper assignment
            if depth[current].is_some_and(|d| d > current_depth) {
                continue;
            }

            for &child in &children[current] {
                if path.contains(&child) {
                    continue;
                }
                let candidate = current_depth + 1;
                if depth[child].map_or(true, |d| candidate > d) {
                    depth[child] = Some(candidate);
                    let mut child_path = path.clone();
                    child_path.push(child);
                    queue.push_back((child, candidate, child_path));
                }
            }
        }

        depth.into_iter().map(|d| d.unwrap_or(0)).collect()
    }

    /// Canvas coordinate of a grid slot
    pub fn coordinates(&self, position: LayoutPosition) -> Point {
        let along = self.config.margin + position.depth as f32 * self.config.column_spacing;
        let across = self.config.margin + position.lane as f32 * self.config.row_spacing;
        if self.config.horizontal {
            Point {
                x: along,
                y: across,
            }
        } else {
            Point {
                x: across,
                y: along,
            }
        }
    }
}
