use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn replay(dir: &Path, scenario: &str, extra: &[&str]) -> Vec<Value> {
    let path = dir.join("scenario.json");
    fs::write(&path, scenario).unwrap();

    let output = Command::cargo_bin("epubview")
        .unwrap()
        .arg(&path)
        .arg("--log-dir")
        .arg(dir.join("logs"))
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "replay failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn events(records: &[Value]) -> Vec<Value> {
    records
        .iter()
        .flat_map(|record| record["events"].as_array().unwrap().clone())
        .collect()
}

const SCRIPT: &str = r#"{
    "pages": [
        {"page": 1, "cfi": "epubcfi(/6/2!/4/2/1:0)"},
        {"page": 2, "cfi": "epubcfi(/6/2!/4/4/1:0)"},
        {"page": 3, "cfi": "epubcfi(/6/4!/4/2/1:0)"}
    ],
    "metadata": {"title": "Moby-Dick", "creator": "Herman Melville"},
    "toc": [{"href": "ch1.xhtml", "label": "Loomings"}],
    "chapters": [{"href": "ch1.xhtml", "label": "Loomings"}],
    "location": "epubcfi(/6/2!/4/2/1:0)"
}"#;

#[test]
fn opened_file_reaches_the_engine_as_bytes() {
    let dir = tempdir().unwrap();
    let book = dir.path().join("moby-dick.epub");
    fs::write(&book, b"PK\x03\x04 not really a zip").unwrap();

    let scenario = format!(
        r#"{{
            "config": {{"auto-pagination": true, "auto-metadata": true, "auto-toc": true}},
            "renderer": {SCRIPT},
            "steps": [
                {{"attach": "viewer"}},
                {{"open-file": {book:?}}},
                {{"callback": "document-ready"}},
                {{"go-to": "ch1.xhtml"}},
                "settle",
                "next-page",
                "teardown"
            ]
        }}"#
    );
    let records = replay(dir.path(), &scenario, &[]);

    assert_eq!(records[1]["calls"][0]["call"], "create");
    assert_eq!(records[1]["calls"][0]["source"], "bytes:21");

    let events = events(&records);
    let names: Vec<_> = events
        .iter()
        .map(|event| event["event"].as_str().unwrap())
        .collect();
    for expected in [
        "document-ready",
        "metadata-loaded",
        "toc-loaded",
        "chapter-displayed",
        "pagination-computed",
    ] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    assert!(events.iter().all(|event| event["event"] != "error-occurred"));

    let metadata = events
        .iter()
        .find(|event| event["event"] == "metadata-loaded")
        .unwrap();
    assert_eq!(metadata["payload"]["title"], "Moby-Dick");

    let pages: Vec<_> = events
        .iter()
        .filter(|event| event["event"] == "location-found")
        .map(|event| event["payload"]["page"].clone())
        .collect();
    assert_eq!(pages.last(), Some(&Value::from(2)));

    let last = records.last().unwrap();
    assert_eq!(last["command"], "teardown");
    assert_eq!(last["calls"][0]["call"], "destroy");
}

#[test]
fn failures_are_printed_as_error_events() {
    let dir = tempdir().unwrap();
    let scenario = r#"{
        "renderer": {"failures": {"pagination": "layout engine crashed"}},
        "steps": [
            {"attach": "viewer"},
            "compute-pagination",
            {"open-link": "https://example.org/moby-dick/"},
            {"callback": "document-ready"},
            {"callback": {"chapter-displayed": {"href": "ch1.xhtml"}}},
            "compute-pagination",
            "settle"
        ]
    }"#;
    let records = replay(dir.path(), scenario, &[]);

    let errors: Vec<_> = events(&records)
        .into_iter()
        .filter(|event| event["event"] == "error-occurred")
        .map(|event| event["payload"].clone())
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["kind"], "NOT_LOADED_DOCUMENT");
    assert_eq!(errors[1]["kind"], "COMPUTE_PAGINATION");
    assert!(errors[1]["detail"]
        .as_str()
        .unwrap()
        .contains("layout engine crashed"));
}

#[test]
fn config_flag_overrides_the_scenario() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("session.toml");
    fs::write(&config, "padding = \"0 24px\"\n").unwrap();
    let scenario = r#"{
        "config": {"padding": "8px"},
        "steps": [
            {"open-link": "moby-dick.epub"},
            {"attach": "viewer"}
        ]
    }"#;

    let records = replay(dir.path(), scenario, &["--config", config.to_str().unwrap()]);

    assert_eq!(records[1]["calls"][1]["call"], "attach");
    assert_eq!(records[1]["calls"][1]["padding"], "0 24px");
}

#[test]
fn unknown_steps_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.json");
    fs::write(&path, r#"{"steps": ["turn-the-page"]}"#).unwrap();

    Command::cargo_bin("epubview")
        .unwrap()
        .arg(&path)
        .arg("--log-dir")
        .arg(dir.path().join("logs"))
        .assert()
        .failure();
}

#[test]
fn bundled_demo_replays_cleanly() {
    let dir = tempdir().unwrap();
    let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/moby-dick.json");

    let output = Command::cargo_bin("epubview")
        .unwrap()
        .arg(&demo)
        .arg("--log-dir")
        .arg(dir.path().join("logs"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let records: Vec<Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let events = events(&records);
    assert!(events.iter().all(|event| event["event"] != "error-occurred"));
    assert!(events
        .iter()
        .any(|event| event["event"] == "search-finished"
            && event["payload"][0]["excerpt"] == "Call me Ishmael."));
}
