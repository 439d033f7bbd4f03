use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use scsync_core::{
    ColumnDef, CommitValue, Consumer, DeleteAction, Decomposer, Materializer,
    MaterializerConfig, MemoryCheckpointStore, MemoryCommitSource, MemoryMirror, MirrorStore,
    Predicate, RetryPolicy, Rule, RowMap, TableSchema,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    description: String,
    tables: Vec<TableDef>,
    rules: Vec<RuleDef>,
    #[serde(default = "default_chunk_size")]
    chunk_size: u64,
    commits: Vec<CommitDef>,
    /// Expected rows per table, in primary key order.
    expected: BTreeMap<String, Vec<RowMap>>,
}

#[derive(Debug, Deserialize)]
struct TableDef {
    name: String,
    key: Vec<ColumnDef>,
    columns: Vec<ColumnDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    template: String,
    table: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    on_delete: DeleteAction,
}

#[derive(Debug, Deserialize)]
struct CommitDef {
    key: String,
    value: serde_json::Value,
}

fn default_chunk_size() -> u64 {
    1000
}

fn build_consumer(fixture: &Fixture) -> Consumer {
    let tables = fixture
        .tables
        .iter()
        .map(|t| TableSchema::new(&t.name, t.key.clone(), t.columns.clone()).unwrap())
        .collect();

    let rules = fixture
        .rules
        .iter()
        .map(|r| {
            let mut builder = Rule::builder(&r.template)
                .table(&r.table)
                .on_delete(r.on_delete);
            if let Some(column) = &r.column {
                builder = builder.column(column);
            }
            for ignored in &r.ignore {
                builder = builder.ignore(ignored);
            }
            builder.build().unwrap()
        })
        .collect();

    let decomposer = Decomposer::new(tables, rules).unwrap();
    Consumer::new(&fixture.name, "fixture", decomposer)
}

fn run_fixture(fixture: &Fixture) -> MemoryMirror {
    let source = MemoryCommitSource::new();
    for (index, commit) in fixture.commits.iter().enumerate() {
        let value = CommitValue::from_json(index as u64, &commit.value).unwrap();
        source.push("fixture", &commit.key, value);
    }

    let consumer = build_consumer(fixture);
    let mut checkpoints = MemoryCheckpointStore::new();
    let mut mirror = MemoryMirror::new();
    let config = MaterializerConfig {
        chunk_size: fixture.chunk_size,
        retry: RetryPolicy::none(),
    };

    let report = Materializer::new(&source, &mut checkpoints, &mut mirror, config)
        .sync(&consumer)
        .unwrap();
    assert_eq!(report.to, fixture.commits.len() as u64);

    mirror
}

fn compare_rows(mirror: &MemoryMirror, fixture: &Fixture) {
    let consumer = build_consumer(fixture);

    for table in consumer.decomposer.tables() {
        let actual = mirror.query(table, &Predicate::True).unwrap();
        let expected = fixture.expected.get(&table.name).cloned().unwrap_or_default();

        assert_eq!(
            actual.len(),
            expected.len(),
            "Row count mismatch in '{}': got {:?}",
            table.name,
            actual
        );

        for (i, (row, exp)) in actual.iter().zip(expected.iter()).enumerate() {
            for (column, value) in exp {
                assert_eq!(
                    row.get(column),
                    Some(value),
                    "Row {} of '{}' column '{}' mismatch",
                    i,
                    table.name,
                    column
                );
            }
        }
    }
}

fn load_and_run_fixture(path: &Path) {
    let content = fs::read_to_string(path).expect("Failed to read fixture file");
    let fixture: Fixture = serde_json::from_str(&content).expect("Failed to parse fixture");

    println!("Running fixture: {} - {}", fixture.name, fixture.description);

    let mirror = run_fixture(&fixture);
    compare_rows(&mirror, &fixture);

    println!("  PASSED");
}

#[test]
fn test_all_fixtures() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");

    let mut fixture_count = 0;

    for entry in fs::read_dir(&fixtures_dir).expect("Failed to read fixtures directory") {
        let entry = entry.expect("Failed to read directory entry");
        let path = entry.path();

        if path.extension().is_some_and(|ext| ext == "json") {
            load_and_run_fixture(&path);
            fixture_count += 1;
        }
    }

    assert!(
        fixture_count > 0,
        "No fixture files found in {:?}",
        fixtures_dir
    );
    println!("Ran {} fixture(s) successfully", fixture_count);
}

#[test]
fn test_auction_bids_fixture() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    load_and_run_fixture(&fixtures_dir.join("auction_bids.json"));
}
