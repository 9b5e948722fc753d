//! Lineage Explorer - field-level data lineage engine
//!
//! Turns source-to-target mapping spreadsheets (already decoded into
//! [`MappingRecord`]s) into an interactive lineage graph:
//!
//! - [`GraphBuilder`] - normalized, deduplicated graph with build diagnostics
//! - [`LayoutEngine`] - depth/lane hierarchical layout, tolerant of cycles
//! - [`DeltaEngine`] - added/removed/modified/unchanged across two versions
//! - [`LineageTracer`] - table, field and object traces
//! - [`LineageSession`] - per-session view state and render pass
//!
//! ## Quick Start
//!
//! ```rust
//! use lineage_explorer::{LineageConfig, LineageWorkspace, MappingRecord, Selector};
//!
//! let records = vec![
//!     MappingRecord::new("src_customer", "id", "stg_customer", "id"),
//!     MappingRecord::new("stg_customer", "id", "dim_customer", "customer_id"),
//! ];
//! let workspace =
//!     LineageWorkspace::from_records(LineageConfig::default(), "v1", &records, None).unwrap();
//!
//! let mut session = workspace.session();
//! session.select(Selector::field("STG_CUSTOMER", "ID"));
//! let model = session.render();
//! assert_eq!(model.tables.len(), 3);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod session;

pub use config::LineageConfig;
pub use error::{Diagnostic, Diagnostics, LineageError, Result, Severity};
pub use graph::{
    BuildOutput, CardMode, DeltaEngine, DeltaGraph, DeltaKind, GraphBuilder, LayoutEngine,
    LayoutPosition, LineageGraph, LineageTracer, MappingKey, MappingRecord, RenderModel,
    RenderStatus, SchemaRecord, SearchIndex, Selector, TraceDirection,
};
pub use session::{ActiveVersion, LineageSession, LineageWorkspace, ManualPosition, ViewState};
