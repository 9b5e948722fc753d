//! End-to-end scenarios through workspaces and sessions

use anyhow::{Context, Result};
use lineage_explorer::graph::{
    records_from_json, EdgeAnchor, LayoutPosition, RenderStatus, SchemaRecord, TraceOutcome,
};
use lineage_explorer::{
    ActiveVersion, CardMode, DeltaKind, LineageConfig, LineageWorkspace, MappingKey,
    MappingRecord, Selector, TraceDirection,
};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineage_explorer=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn workspace(records: &[MappingRecord]) -> Result<LineageWorkspace> {
    Ok(LineageWorkspace::from_records(
        LineageConfig::default(),
        "v1",
        records,
        None,
    )?)
}

fn chain(tables: usize) -> Vec<MappingRecord> {
    (0..tables.saturating_sub(1))
        .map(|i| {
            MappingRecord::new(
                format!("T{:03}", i),
                "ID",
                format!("T{:03}", i + 1),
                "ID",
            )
        })
        .collect()
}

#[test]
fn test_simple_chain_depths() -> Result<()> {
    init_tracing();
    let records = vec![
        MappingRecord::new("A", "id", "B", "id").with_kind("MAP"),
        MappingRecord::new("B", "id", "C", "id").with_kind("MAP"),
    ];
    let model = workspace(&records)?.session().render();

    let depths: Vec<(String, u32)> = model
        .tables
        .iter()
        .map(|t| (t.name.clone(), t.position.depth))
        .collect();
    assert_eq!(
        depths,
        vec![
            ("A".to_string(), 0),
            ("B".to_string(), 1),
            ("C".to_string(), 2),
        ]
    );
    assert!(model.back_edges.is_empty());
    Ok(())
}

#[test]
fn test_single_rule_change_is_one_modification() -> Result<()> {
    init_tracing();
    let old = vec![
        MappingRecord::new("A", "ID", "B", "ID"),
        MappingRecord::new("B", "ID", "C", "ID").with_rule("x"),
    ];
    let new = vec![
        MappingRecord::new("A", "ID", "B", "ID"),
        MappingRecord::new("B", "ID", "C", "ID").with_rule("x*2"),
    ];
    let workspace = workspace(&old)?.with_secondary_records("v2", &new, None);
    let delta = workspace.delta().context("delta computed")?;

    assert_eq!(delta.summary.modified, 1);
    assert_eq!(delta.summary.added, 0);
    assert_eq!(delta.summary.removed, 0);
    assert_eq!(delta.records_of(DeltaKind::Modified).count(), 1);
    Ok(())
}

#[test]
fn test_lazy_render_gate_and_render_all() -> Result<()> {
    init_tracing();
    let mut session = workspace(&chain(150))?.session();

    let gated = session.render();
    assert_eq!(
        gated.status,
        RenderStatus::AwaitingSelection {
            table_count: 150,
            threshold: 100,
        }
    );
    assert!(gated.is_empty());
    assert!(gated.to_json()?.contains("awaiting_selection"));

    session.state_mut().set_render_all(true);
    let full = session.render();
    assert!(full.is_ready());
    assert_eq!(full.tables.len(), 150);
    assert_eq!(full.mappings.len(), 149);
    Ok(())
}

#[test]
fn test_selection_bypasses_gate() -> Result<()> {
    init_tracing();
    let mut session = workspace(&chain(150))?.session();
    session.select(Selector::table("T010"));
    session.state_mut().set_direction(TraceDirection::Upstream);

    let model = session.render();
    assert!(model.is_ready());
    assert_eq!(model.tables.len(), 11);
    assert_eq!(
        model.table("T010").map(|t| t.position),
        Some(LayoutPosition::new(10, 0))
    );
    Ok(())
}

#[test]
fn test_manual_override_survives_filter_change() -> Result<()> {
    init_tracing();
    let records = vec![
        MappingRecord::new("A", "ID", "B", "ID"),
        MappingRecord::new("B", "ID", "C", "ID").with_kind("LOOKUP"),
        MappingRecord::new("A", "ID", "C", "ID"),
        MappingRecord::new("C", "ID", "D", "ID"),
    ];
    let mut session = workspace(&records)?.session();
    session.state_mut().pin("B", LayoutPosition::new(5, 5));

    let before = session.render();
    assert_eq!(before.table("C").map(|t| t.position.depth), Some(2));

    session.state_mut().set_direct_only(true);
    let after = session.render();

    let pinned = after.table("B").context("B rendered")?;
    assert_eq!(pinned.position, LayoutPosition::new(5, 5));
    assert!(pinned.pinned);
    assert_eq!(
        before.table("B").map(|t| t.point),
        after.table("B").map(|t| t.point)
    );

    // Unpinned tables reflow
    assert_eq!(after.table("C").map(|t| t.position.depth), Some(1));
    assert_eq!(after.table("D").map(|t| t.position.depth), Some(2));
    Ok(())
}

#[test]
fn test_unmapped_field_trace_is_empty_render() -> Result<()> {
    init_tracing();
    let schema = vec![
        SchemaRecord {
            table_name: "A".to_string(),
            column_name: "ID".to_string(),
            ..SchemaRecord::default()
        },
        SchemaRecord {
            table_name: "A".to_string(),
            column_name: "UNUSED".to_string(),
            ..SchemaRecord::default()
        },
    ];
    let records = vec![MappingRecord::new("A", "ID", "B", "ID")];
    let workspace =
        LineageWorkspace::from_records(LineageConfig::default(), "v1", &records, Some(&schema))?;

    let mut session = workspace.session();
    session.select(Selector::field("A", "UNUSED"));
    let model = session.render();

    assert_eq!(
        model.status,
        RenderStatus::EmptySelection {
            outcome: TraceOutcome::Empty
        }
    );
    assert!(model.is_empty());

    session.select(Selector::table("NOT_THERE"));
    let model = session.render();
    assert_eq!(
        model.status,
        RenderStatus::EmptySelection {
            outcome: TraceOutcome::NotFound
        }
    );
    Ok(())
}

#[test]
fn test_collapsed_rows_route_to_header() -> Result<()> {
    init_tracing();
    let records: Vec<MappingRecord> = (0..10)
        .map(|i| MappingRecord::new("WIDE", format!("COL_{}", i), "TGT", format!("COL_{}", i)))
        .collect();
    let mut session = workspace(&records)?.session();

    let model = session.render();
    let wide = model.table("WIDE").context("WIDE rendered")?;
    assert_eq!(wide.fields.len(), 8);
    assert_eq!(wide.hidden_field_count, 2);

    // COL_9 sorts after COL_0..COL_8 and is behind "+2 more"
    let hidden = model
        .mapping(&MappingKey::new("WIDE", "COL_9", "TGT", "COL_9"))
        .context("mapping rendered")?;
    assert_eq!(hidden.source_anchor, EdgeAnchor::Header);

    session.state_mut().set_card_mode("WIDE", CardMode::Expanded);
    let model = session.render();
    let shown = model
        .mapping(&MappingKey::new("WIDE", "COL_9", "TGT", "COL_9"))
        .context("mapping rendered")?;
    assert_eq!(shown.source_anchor, EdgeAnchor::FieldRow { row: 9 });
    Ok(())
}

#[test]
fn test_sessions_are_isolated_across_threads() -> Result<()> {
    init_tracing();
    let workspace = workspace(&chain(5))?;

    let handles: Vec<_> = (0..4u32)
        .map(|lane| {
            let workspace = workspace.clone();
            std::thread::spawn(move || {
                let mut session = workspace.session();
                session.state_mut().pin("T000", LayoutPosition::new(0, lane + 10));
                session.render().table("T000").map(|t| t.position.lane)
            })
        })
        .collect();

    let mut lanes = Vec::new();
    for handle in handles {
        let lane = handle
            .join()
            .map_err(|_| anyhow::anyhow!("session thread panicked"))?;
        lanes.push(lane);
    }
    assert_eq!(lanes, vec![Some(10), Some(11), Some(12), Some(13)]);

    // The shared workspace never sees session state
    assert_eq!(
        workspace.session().render().table("T000").map(|t| t.position.lane),
        Some(0)
    );
    Ok(())
}

#[test]
fn test_json_ingestion_with_diagnostics() -> Result<()> {
    init_tracing();
    let json = r#"[
        {"object_name": "LOAD_STG", "source_table": "src", "source_field": "id",
         "dest_table": "stg", "dest_field": "id", "mapping_kind": "MAP"},
        {"object_name": "LOAD_STG", "source_table": "src", "source_field": "id",
         "dest_table": "stg", "dest_field": "id", "rule": "upper(id)"},
        {"source_table": "stg", "dest_table": "dim", "dest_field": "id", "mapping_kind": "PIVOT"}
    ]"#;
    let records = records_from_json(json)?;
    let workspace = workspace(&records)?;

    let diagnostics = workspace
        .diagnostics(ActiveVersion::Primary)
        .context("primary diagnostics")?;
    assert_eq!(diagnostics.count("DUPLICATE_IDENTITY"), 1);
    assert_eq!(diagnostics.count("MALFORMED_RECORD"), 1);
    assert_eq!(diagnostics.count("UNKNOWN_MAPPING_KIND"), 1);

    assert_eq!(workspace.primary().mapping_count(), 2);
    assert!(workspace.primary().dangling_endpoints().is_empty());

    let mut session = workspace.session();
    let hit = session
        .search("load_stg", 1)
        .into_iter()
        .next()
        .context("object found")?;
    session.select(hit.entry.selector);
    let model = session.render();
    assert_eq!(model.mappings.len(), 1);
    assert_eq!(model.mappings[0].rule, "upper(id)");
    Ok(())
}

#[test]
fn test_configured_threshold() -> Result<()> {
    init_tracing();
    let config = LineageConfig::from_yaml("lazy_render_threshold: 3")?;
    let workspace = LineageWorkspace::from_records(config, "v1", &chain(5), None)?;

    let model = workspace.session().render();
    assert_eq!(
        model.status,
        RenderStatus::AwaitingSelection {
            table_count: 5,
            threshold: 3,
        }
    );
    Ok(())
}
