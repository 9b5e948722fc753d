//! Per-session view state
//!
//! Everything the user changes interactively lives here: manual placement,
//! card detail, filters, the focal selection and the render-all override.
//! Tables are referenced by name only; entries for tables that are not in
//! the current render are kept and simply not applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::graph::delta::DeltaKind;
use crate::graph::layout::{LayoutEngine, LayoutPosition, LayoutResult, Point};
use crate::graph::trace::{Selector, TraceDirection};
use crate::graph::types::{normalize_name, Mapping};
use crate::graph::view_model::CardMode;

/// A user-dragged position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManualPosition {
    /// Dropped onto a grid slot
    Slot { depth: u32, lane: u32 },
    /// Dropped at a free canvas coordinate
    Free { x: f32, y: f32 },
}

impl From<LayoutPosition> for ManualPosition {
    fn from(position: LayoutPosition) -> Self {
        ManualPosition::Slot {
            depth: position.depth,
            lane: position.lane,
        }
    }
}

impl From<Point> for ManualPosition {
    fn from(point: Point) -> Self {
        ManualPosition::Free {
            x: point.x,
            y: point.y,
        }
    }
}

/// Position of a table after manual overrides are applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPosition {
    pub position: LayoutPosition,
    pub point: Point,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilters {
    pub direction: TraceDirection,
    /// Show only direct (MAP) mappings
    pub direct_only: bool,
    /// Delta classifications shown in delta mode
    pub delta_kinds: BTreeSet<DeltaKind>,
}

impl Default for ViewFilters {
    fn default() -> Self {
        Self {
            direction: TraceDirection::Both,
            direct_only: false,
            delta_kinds: [
                DeltaKind::Added,
                DeltaKind::Removed,
                DeltaKind::Modified,
                DeltaKind::Unchanged,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ViewFilters {
    pub fn allows_mapping(&self, mapping: &Mapping) -> bool {
        !self.direct_only || mapping.kind.is_direct()
    }

    pub fn allows_delta(&self, kind: DeltaKind) -> bool {
        self.delta_kinds.contains(&kind)
    }
}

/// Interactive state of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewState {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Bumped on every change; carried by render models
    revision: u64,
    overrides: BTreeMap<String, ManualPosition>,
    card_modes: BTreeMap<String, CardMode>,
    default_card_mode: CardMode,
    filters: ViewFilters,
    selection: Option<Selector>,
    render_all: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::with_session(Uuid::new_v4())
    }

    pub fn with_session(session_id: Uuid) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            revision: 0,
            overrides: BTreeMap::new(),
            card_modes: BTreeMap::new(),
            default_card_mode: CardMode::Standard,
            filters: ViewFilters::default(),
            selection: None,
            render_all: false,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // =========================================================================
    // MANUAL PLACEMENT
    // =========================================================================

    /// Record a drag result for `table`
    pub fn pin(&mut self, table: &str, position: impl Into<ManualPosition>) {
        self.overrides.insert(normalize_name(table), position.into());
        self.touch();
    }

    pub fn unpin(&mut self, table: &str) -> Option<ManualPosition> {
        let removed = self.overrides.remove(&normalize_name(table));
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
        self.touch();
    }

    pub fn manual_position(&self, table: &str) -> Option<ManualPosition> {
        self.overrides.get(&normalize_name(table)).copied()
    }

    pub fn overrides(&self) -> &BTreeMap<String, ManualPosition> {
        &self.overrides
    }

    /// Positions of every laid-out table; a manual override always wins over
    /// the computed slot. Overrides for tables missing from `layout` are ignored.
    pub fn reconcile(
        &self,
        layout: &LayoutResult,
        engine: &LayoutEngine,
    ) -> BTreeMap<String, ResolvedPosition> {
        layout
            .positions
            .iter()
            .map(|(name, computed)| {
                let resolved = match self.overrides.get(name) {
                    Some(ManualPosition::Slot { depth, lane }) => {
                        let position = LayoutPosition::new(*depth, *lane);
                        ResolvedPosition {
                            position,
                            point: engine.coordinates(position),
                            pinned: true,
                        }
                    }
                    Some(ManualPosition::Free { x, y }) => ResolvedPosition {
                        position: *computed,
                        point: Point { x: *x, y: *y },
                        pinned: true,
                    },
                    None => ResolvedPosition {
                        position: *computed,
                        point: engine.coordinates(*computed),
                        pinned: false,
                    },
                };
                (name.clone(), resolved)
            })
            .collect()
    }

    // =========================================================================
    // CARD DETAIL
    // =========================================================================

    pub fn card_mode(&self, table: &str) -> CardMode {
        self.card_modes
            .get(&normalize_name(table))
            .copied()
            .unwrap_or(self.default_card_mode)
    }

    pub fn set_card_mode(&mut self, table: &str, mode: CardMode) {
        self.card_modes.insert(normalize_name(table), mode);
        self.touch();
    }

    /// Toggle between compact and standard detail
    pub fn toggle_compact(&mut self, table: &str) -> CardMode {
        let next = match self.card_mode(table) {
            CardMode::Compact => CardMode::Standard,
            _ => CardMode::Compact,
        };
        self.set_card_mode(table, next);
        next
    }

    /// Detail used for tables without an explicit mode
    pub fn set_default_card_mode(&mut self, mode: CardMode) {
        self.default_card_mode = mode;
        self.touch();
    }

    // =========================================================================
    // FILTERS
    // =========================================================================

    pub fn filters(&self) -> &ViewFilters {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut ViewFilters {
        self.touch();
        &mut self.filters
    }

    pub fn set_direction(&mut self, direction: TraceDirection) {
        self.filters_mut().direction = direction;
    }

    pub fn set_direct_only(&mut self, direct_only: bool) {
        self.filters_mut().direct_only = direct_only;
    }

    pub fn show_delta_kind(&mut self, kind: DeltaKind, shown: bool) {
        let filters = self.filters_mut();
        if shown {
            filters.delta_kinds.insert(kind);
        } else {
            filters.delta_kinds.remove(&kind);
        }
    }

    // =========================================================================
    // SELECTION & GATE
    // =========================================================================

    pub fn selection(&self) -> Option<&Selector> {
        self.selection.as_ref()
    }

    pub fn select(&mut self, selector: Selector) {
        self.selection = Some(selector);
        self.touch();
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.touch();
    }

    pub fn render_all(&self) -> bool {
        self.render_all
    }

    /// Explicitly bypass the lazy-render gate
    pub fn set_render_all(&mut self, render_all: bool) {
        self.render_all = render_all;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::{GraphBuilder, MappingRecord};

    fn make_test_layout() -> LayoutResult {
        let records = vec![
            MappingRecord::new("A", "ID", "B", "ID"),
            MappingRecord::new("B", "ID", "C", "ID"),
        ];
        let graph = GraphBuilder::new("test").build(&records).graph;
        LayoutEngine::new().layout(&graph)
    }

    #[test]
    fn test_slot_override_wins() {
        let layout = make_test_layout();
        let engine = LayoutEngine::new();
        let mut state = ViewState::new();
        state.pin("b", LayoutPosition::new(4, 2));

        let resolved = state.reconcile(&layout, &engine);
        assert_eq!(resolved["B"].position, LayoutPosition::new(4, 2));
        assert!(resolved["B"].pinned);
        assert_eq!(resolved["A"].position, LayoutPosition::new(0, 0));
        assert!(!resolved["A"].pinned);
    }

    #[test]
    fn test_free_override_keeps_slot() {
        let layout = make_test_layout();
        let engine = LayoutEngine::new();
        let mut state = ViewState::new();
        state.pin("C", Point { x: 15.0, y: 25.0 });

        let resolved = state.reconcile(&layout, &engine);
        assert_eq!(resolved["C"].position, LayoutPosition::new(2, 0));
        assert_eq!(resolved["C"].point, Point { x: 15.0, y: 25.0 });
    }

    #[test]
    fn test_override_for_missing_table_is_tolerated() {
        let layout = make_test_layout();
        let mut state = ViewState::new();
        state.pin("GONE", LayoutPosition::new(1, 1));

        let resolved = state.reconcile(&layout, &LayoutEngine::new());
        assert_eq!(resolved.len(), 3);
        assert!(!resolved.contains_key("GONE"));
        assert!(state.manual_position("gone").is_some());
    }

    #[test]
    fn test_card_modes() {
        let mut state = ViewState::new();
        assert_eq!(state.card_mode("A"), CardMode::Standard);

        assert_eq!(state.toggle_compact("a"), CardMode::Compact);
        assert_eq!(state.card_mode("A"), CardMode::Compact);
        assert_eq!(state.toggle_compact("A"), CardMode::Standard);

        state.set_default_card_mode(CardMode::Expanded);
        assert_eq!(state.card_mode("OTHER"), CardMode::Expanded);
    }

    #[test]
    fn test_revision_tracks_changes() {
        let mut state = ViewState::new();
        let start = state.revision();

        state.set_direct_only(true);
        state.select(Selector::table("A"));
        assert_eq!(state.revision(), start + 2);

        // Nothing to remove, nothing changes
        state.unpin("A");
        assert_eq!(state.revision(), start + 2);
    }

    #[test]
    fn test_delta_kind_filter() {
        let mut state = ViewState::new();
        assert!(state.filters().allows_delta(DeltaKind::Unchanged));

        state.show_delta_kind(DeltaKind::Unchanged, false);
        assert!(!state.filters().allows_delta(DeltaKind::Unchanged));
        assert!(state.filters().allows_delta(DeltaKind::Added));
    }

    #[test]
    fn test_sessions_are_distinct() {
        assert_ne!(ViewState::new().session_id, ViewState::new().session_id);
    }
}
