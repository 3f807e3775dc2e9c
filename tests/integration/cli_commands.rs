#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn index_args(&self) -> [String; 4] {
        [
            "--words".to_string(),
            self.path("words.dat").display().to_string(),
            "--docs".to_string(),
            self.path("docs.dat").display().to_string(),
        ]
    }
}

fn write_csv(path: &Path) {
    let rows = [
        "doc_id,term_id,metadata",
        "1,5,1",
        "2,5,1",
        "2,9,0",
        "4,9,3",
        "7,5,2",
        "8,12,1",
    ];
    fs::write(path, rows.join("\n")).expect("write csv");
}

fn build_index(ws: &Workspace) {
    write_csv(&ws.path("rows.csv"));
    cargo_bin_cmd!("rindex")
        .arg("import-journal")
        .arg(ws.path("rows.csv"))
        .arg("--out")
        .arg(ws.path("journal"))
        .args(["--shards", "2"])
        .assert()
        .success();
    assert!(ws.path("journal").join("index-journal-0.dat").exists());
    assert!(ws.path("journal").join("index-journal-1.dat").exists());

    fs::create_dir_all(ws.path("work")).expect("work dir");
    cargo_bin_cmd!("rindex")
        .args(["--quiet", "build"])
        .arg(ws.path("journal"))
        .arg("--work-dir")
        .arg(ws.path("work"))
        .args(["--threads", "2"])
        .args(ws.index_args())
        .assert()
        .success();
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn build_then_query_returns_postings() {
    let ws = Workspace::new();
    build_index(&ws);

    let assert = cargo_bin_cmd!("rindex")
        .args(["--format", "json", "query", "5", "9", "12", "40"])
        .args(ws.index_args())
        .assert()
        .success();
    let json = json_stdout(assert.get_output());
    let rows = json.as_array().expect("array");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["documents"], serde_json::json!([1, 2, 7]));
    assert_eq!(rows[1]["documents"], serde_json::json!([4]));
    assert_eq!(rows[2]["documents"], serde_json::json!([8]));
    assert!(rows[3]["documents"].is_null());
}

#[test]
fn verify_and_stats_report_on_a_clean_index() {
    let ws = Workspace::new();
    build_index(&ws);

    let verify = cargo_bin_cmd!("rindex")
        .args(["--format", "json", "verify", "--level", "full"])
        .args(ws.index_args())
        .assert()
        .success();
    let report = json_stdout(verify.get_output());
    assert_eq!(report["success"], Value::Bool(true));
    assert_eq!(report["level"], "full");
    assert_eq!(report["counts"]["runs"], 3);

    let stats = cargo_bin_cmd!("rindex")
        .args(["--format", "json", "stats"])
        .args(ws.index_args())
        .assert()
        .success();
    let report = json_stdout(stats.get_output());
    assert_eq!(report["words"]["entries"], 3);
    assert_eq!(report["postings"]["total"], 5);
    assert_eq!(report["postings"]["longest_run_word"], 5);
}

#[test]
fn verify_exits_with_two_on_corruption() {
    let ws = Workspace::new();
    build_index(&ws);
    let docs = ws.path("docs.dat");
    let mut bytes = fs::read(&docs).expect("docs");
    // second posting of word 5: 2 becomes 9, breaking the sort order
    bytes[16..24].copy_from_slice(&9u64.to_le_bytes());
    fs::write(&docs, bytes).expect("rewrite docs");

    cargo_bin_cmd!("rindex")
        .args(["verify", "--level", "full"])
        .args(ws.index_args())
        .assert()
        .code(2);
}

#[test]
fn config_file_supplies_index_paths() {
    let ws = Workspace::new();
    build_index(&ws);
    let config = ws.path("cli.toml");
    fs::write(
        &config,
        format!(
            "[index]\nwords = {:?}\ndocs = {:?}\n",
            ws.path("words.dat").display().to_string(),
            ws.path("docs.dat").display().to_string()
        ),
    )
    .expect("config");

    let assert = cargo_bin_cmd!("rindex")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "query", "9"])
        .assert()
        .success();
    let json = json_stdout(assert.get_output());
    assert_eq!(json[0]["documents"], serde_json::json!([4]));
}

#[test]
fn missing_index_is_an_error() {
    let ws = Workspace::new();
    let assert = cargo_bin_cmd!("rindex")
        .arg("stats")
        .args(ws.index_args())
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("error: index file not found"), "{stderr}");
}

#[test]
fn build_without_shards_reports_nothing_written() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.path("empty")).expect("journal dir");

    let assert = cargo_bin_cmd!("rindex")
        .args(["--format", "json", "build"])
        .arg(ws.path("empty"))
        .arg("--work-dir")
        .arg(ws.path("empty"))
        .args(ws.index_args())
        .assert()
        .success();
    let json = json_stdout(assert.get_output());
    assert_eq!(json["built"], Value::Bool(false));
    assert!(!ws.path("words.dat").exists());

    let assert = cargo_bin_cmd!("rindex")
        .arg("build")
        .arg(ws.path("empty"))
        .args(ws.index_args())
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("nothing written"), "{stdout}");
    assert!(!stdout.contains("Built"), "{stdout}");
}
