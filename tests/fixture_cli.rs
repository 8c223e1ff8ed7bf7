use crossbeam::channel::bounded;
use std::process::Command;
use std::time::Duration;
use tablestats::fixture::{Fixture, FixtureReport};
use tablestats::StatsConfig;
use tempfile::TempDir;

// Two L0 flushes and an ingested L6 table; table 2 deletes most of table 1's keys.
const FIXTURE: &str = r#"{
    "tables": [
        {
            "file_num": 1,
            "level": 6,
            "size": 600,
            "points": [
                {"key": "a", "seq": 1, "kind": "set", "value_len": 99},
                {"key": "b", "seq": 2, "kind": "set", "value_len": 99},
                {"key": "c", "seq": 3, "kind": "set", "value_len": 99},
                {"key": "d", "seq": 4, "kind": "set", "value_len": 99},
                {"key": "e", "seq": 5, "kind": "set", "value_len": 99},
                {"key": "f", "seq": 6, "kind": "set", "value_len": 99}
            ]
        },
        {
            "file_num": 2,
            "level": 0,
            "points": [
                {"key": "b", "seq": 7, "kind": "set", "value_len": 9},
                {"key": "c", "seq": 3, "kind": "set", "value_len": 9}
            ],
            "range_dels": [
                {"start": "a", "end": "e", "seq": 8}
            ]
        },
        {
            "file_num": 3,
            "level": 0,
            "points": [
                {"key": "x", "seq": 10, "kind": "del"},
                {"key": "y", "seq": 11, "kind": "set", "value_len": 4}
            ]
        }
    ]
}"#;

fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("fixture.json");
    std::fs::write(&path, FIXTURE).unwrap();
    path
}

#[test]
fn fixture_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir);

    let report = Fixture::load(&path)
        .unwrap()
        .run(StatsConfig::for_testing())
        .unwrap();
    assert_eq!(report.tables.len(), 3);
    assert_eq!(report.event.as_ref().unwrap().tables.len(), 3);

    let by_file = |file_num: u64| {
        report
            .tables
            .iter()
            .find(|t| t.file_num == file_num)
            .and_then(|t| t.stats)
            .unwrap()
    };

    // Stats only describe a table's own content.
    let bottom = by_file(1);
    assert_eq!(bottom.num_range_deletions, 0);
    assert_eq!(bottom.range_deletions_bytes_estimate, 0);

    let flush = by_file(2);
    assert_eq!(flush.num_range_deletions, 1);
    // "b"#7 and "c"#3 both predate the deletion at #8.
    assert_eq!(flush.range_deletions_bytes_estimate, 20);

    let other = by_file(3);
    assert_eq!(other.num_point_deletions, 1);
    assert_eq!(other.num_range_deletions, 0);
    assert!(other.point_deletions_bytes_estimate > 0);

    let l6: Vec<_> = report.tables.iter().filter(|t| t.level == 6).collect();
    assert_eq!(l6.len(), 1);
    assert_eq!(l6[0].size, 600);
}

#[test]
fn missing_fixture_is_io_error() {
    let dir = TempDir::new().unwrap();
    let res = Fixture::load(dir.path().join("nope.json"));
    assert!(matches!(res, Err(tablestats::StorageError::Io(_))));
}

#[test]
fn cli_prints_json_report() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_tablestats-cli"))
        .arg(&path)
        .arg("--pretty")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: FixtureReport = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report.tables.len(), 3);
    assert!(report.tables.iter().all(|t| t.stats.is_some()));
}

#[test]
fn cli_fails_on_bad_fixture() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{\"tables\": 3}").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tablestats-cli"))
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
}

// Two entries with the same key and seqnum cannot come from a valid table.
const CORRUPT_FIXTURE: &str = r#"{
    "tables": [
        {
            "file_num": 7,
            "level": 0,
            "points": [
                {"key": "a", "seq": 1, "kind": "set", "value_len": 3},
                {"key": "a", "seq": 1, "kind": "set", "value_len": 3}
            ]
        },
        {
            "file_num": 8,
            "level": 0,
            "points": [
                {"key": "k", "seq": 2, "kind": "set", "value_len": 3}
            ]
        }
    ]
}"#;

#[test]
fn corrupt_table_fails_the_run() {
    let fixture = Fixture::from_json(CORRUPT_FIXTURE).unwrap();
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let _ = tx.send(fixture.run(StatsConfig::default()));
    });

    let res = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("fixture run did not return");
    match res {
        Err(tablestats::StorageError::InvalidData(msg)) => assert!(msg.contains("000007")),
        other => panic!("expected InvalidData, got {:?}", other),
    }
}

#[test]
fn cli_exits_on_corrupt_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, CORRUPT_FIXTURE).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_tablestats-cli"))
        .arg(&path)
        .spawn()
        .unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if std::time::Instant::now() > deadline {
            let _ = child.kill();
            panic!("tablestats-cli did not exit");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(!status.success());
}
