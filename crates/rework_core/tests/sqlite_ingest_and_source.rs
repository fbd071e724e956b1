use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use time::macros::date;

use rework_core::cache::DimensionCache;
use rework_core::config::EngineConfig;
use rework_core::db;
use rework_core::filter::{DateWindow, Dimension, RecordFilter};
use rework_core::ingest::service_orders_csv::{
    import_service_orders_csv, parse_service_orders_csv, ServiceOrderCsvMapping,
};
use rework_core::engine::run_classification;
use rework_core::repo::{count_service_orders, InMemorySource, ServiceOrderSource, SqliteSource};

const FLEET_SAMPLE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../fixtures/service_orders/fleet_sample.csv"
));

fn first_half() -> DateWindow {
    DateWindow::new(date!(2024 - 01 - 01), date!(2024 - 06 - 30))
}

fn order_ids<S: ServiceOrderSource>(source: &S, filter: &RecordFilter) -> BTreeSet<String> {
    source
        .fetch_service_orders(filter, "TODAS")
        .expect("fetch")
        .into_iter()
        .map(|o| o.order_id)
        .collect()
}

#[test]
fn import_skips_keyless_rows_and_flags_unreadable_timestamps() {
    let tmp = tempdir().unwrap();
    let mut conn = db::open_and_migrate(&tmp.path().join("fleet.sqlite")).expect("open");

    let summary =
        import_service_orders_csv(&mut conn, FLEET_SAMPLE, &ServiceOrderCsvMapping::default())
            .expect("import");
    assert_eq!(summary.inserted, 9);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        summary
            .warnings
            .iter()
            .map(|w| w.code.as_str())
            .collect::<Vec<_>>(),
        vec!["INGEST_ROW_KEY_MISSING", "INGEST_TS_UNPARSEABLE"]
    );
    assert_eq!(count_service_orders(&conn).unwrap(), 9);
}

#[test]
fn import_requires_mapped_columns() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let mapping = ServiceOrderCsvMapping {
        vehicle_id: "PLACA".to_string(),
        ..ServiceOrderCsvMapping::default()
    };
    let err = import_service_orders_csv(&mut conn, FLEET_SAMPLE, &mapping).unwrap_err();
    assert_eq!(err.code, "INGEST_CSV_MISSING_COLUMN");
    assert_eq!(count_service_orders(&conn).unwrap(), 0);
}

#[test]
fn sqlite_and_in_memory_sources_select_the_same_orders() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    import_service_orders_csv(&mut conn, FLEET_SAMPLE, &ServiceOrderCsvMapping::default())
        .expect("import");
    let (orders, _) =
        parse_service_orders_csv(FLEET_SAMPLE, &ServiceOrderCsvMapping::default()).expect("parse");

    let sqlite = SqliteSource::new(&conn);
    let memory = InMemorySource::new(orders);

    let everything = RecordFilter::all(first_half(), "TODAS");

    let mut north = everything.clone();
    north.workshops = vec!["North Depot".to_string()];

    let mut spring = RecordFilter::all(
        DateWindow::new(date!(2024 - 03 - 01), date!(2024 - 06 - 30)),
        "TODAS",
    );
    spring.models = vec!["Minibus 8m".to_string(), "Urban Bus 12m".to_string()];

    let mut picked = everything.clone();
    picked.order_ids = vec!["OS-1001".to_string(), "OS-1009".to_string()];

    for filter in [&everything, &north, &spring, &picked] {
        assert_eq!(order_ids(&sqlite, filter), order_ids(&memory, filter));
    }

    assert_eq!(
        order_ids(&sqlite, &north),
        ["OS-1004", "OS-1005"]
            .iter()
            .map(|s| s.to_string())
            .collect::<BTreeSet<_>>()
    );
    // Unreadable opening dates pass the window so the normalizer can report them.
    assert!(order_ids(&sqlite, &spring).contains("OS-1008"));
}

#[test]
fn classification_over_sqlite_reports_exclusions() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    import_service_orders_csv(&mut conn, FLEET_SAMPLE, &ServiceOrderCsvMapping::default())
        .expect("import");

    let run = run_classification(
        &SqliteSource::new(&conn),
        &RecordFilter::all(first_half(), "TODAS"),
        Some(10),
        &EngineConfig::default(),
    )
    .expect("run");

    assert_eq!(run.fetched_count, 9);
    assert_eq!(run.duplicates_superseded, 1);
    assert_eq!(run.group_count, 3);
    assert_eq!(
        run.excluded
            .iter()
            .map(|e| (e.order_id.as_str(), e.warning.code.as_str()))
            .collect::<Vec<_>>(),
        vec![
            ("OS-1006", "DQ_ORDER_TYPE_EXCLUDED"),
            ("OS-1008", "DQ_OPENED_AT_UNPARSEABLE"),
        ]
    );

    let summary = run
        .records
        .iter()
        .map(|r| {
            (
                r.record.order_id.as_str(),
                r.next_gap_days,
                r.status().as_str(),
                r.episode_no,
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            ("OS-1001", Some(4), "rework", 1),
            ("OS-1002", Some(51), "late_correction", 1),
            ("OS-1003", None, "first_correction", 2),
            ("OS-1004", Some(5), "rework", 1),
            ("OS-1005", None, "late_correction", 1),
            ("OS-1009", None, "first_correction", 1),
        ]
    );
    assert_eq!(
        run.records[3].record.opened_at.date(),
        date!(2024 - 02 - 06),
        "duplicate OS-1004 keeps the later opening"
    );
}

#[test]
fn dimension_values_are_served_through_the_cache() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    import_service_orders_csv(&mut conn, FLEET_SAMPLE, &ServiceOrderCsvMapping::default())
        .expect("import");

    let source = SqliteSource::new(&conn);
    let cache = DimensionCache::new(&EngineConfig::default());

    let workshops = cache
        .get_or_load(Dimension::Workshop, || {
            source.list_dimension_values(Dimension::Workshop)
        })
        .expect("workshops");
    assert_eq!(workshops, vec!["Central Garage", "North Depot"]);

    let again = cache
        .get_or_load(Dimension::Workshop, || panic!("cached value expected"))
        .expect("cached");
    assert_eq!(again, workshops);

    let models = cache
        .get_or_load(Dimension::Model, || source.list_dimension_values(Dimension::Model))
        .expect("models");
    assert_eq!(models, vec!["Articulated 18m", "Minibus 8m", "Urban Bus 12m"]);
    assert_eq!(cache.stats().hits, 1);
}
