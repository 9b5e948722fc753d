//! Field-level lineage graph
//!
//! Build a [`LineageGraph`] from mapping records, lay it out, compare two
//! versions, trace from a focal selector and search for selectors.

pub mod builder;
pub mod delta;
pub mod layout;
pub mod search;
pub mod trace;
pub mod types;
pub mod view_model;

pub use builder::{
    records_from_json, schema_from_json, BuildOutput, GraphBuilder, MappingRecord, SchemaRecord,
    UNNAMED,
};
pub use delta::{
    DeltaEngine, DeltaGraph, DeltaKind, DeltaRecord, DeltaSummary, MappingSnapshot, TableChange,
};
pub use layout::{BackEdge, LayoutConfig, LayoutEngine, LayoutPosition, LayoutResult, Point};
pub use search::{MatchRank, SearchEntry, SearchHit, SearchIndex, SearchKind};
pub use trace::{LineageTracer, Selector, TraceDirection, TraceOutcome, TraceResult};
pub use types::*;
pub use view_model::{
    CardMode, EdgeAnchor, RenderField, RenderMapping, RenderModel, RenderStatus, RenderTable,
};
