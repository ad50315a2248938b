//! CLI Integration Tests
//!
//! These tests run the `walklog` binary against a temporary database,
//! configuration file and directory remote.
//!
//! ```
//! cargo test --package walklog-cli --test cli_integration
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

/// A scratch environment: empty config, fresh database, local remote.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        std::fs::create_dir(dir.path().join("remote")).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_walklog"))
            .arg("--no-color")
            .arg("--config")
            .arg(self.path("config.toml"))
            .arg("--database")
            .arg(self.path("data.db"))
            .arg("--remote")
            .arg(self.path("remote"))
            .args(args)
            .env_remove("WALKLOG_CONFIG")
            .env_remove("WALKLOG_DB")
            .env_remove("WALKLOG_REMOTE")
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .output()
            .expect("Failed to run walklog binary")
    }

    fn run_ok(&self, args: &[&str]) -> Output {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "walklog {:?} failed:\n{}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.run_ok(args);
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
    }

    /// Two fixes 70 s apart are kept, the third 2 s later is skipped.
    fn write_walk(&self) -> PathBuf {
        std::fs::write(self.path("photo.jpg"), [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        let replay = self.path("walk.jsonl");
        std::fs::write(
            &replay,
            r#"# morning walk
{"type":"fix","lat":34.85000,"lng":135.47000,"accuracy":5,"timestamp":"2025-03-01T09:00:00Z"}
{"type":"compass","absolute_heading":90}
{"type":"photo","path":"photo.jpg","direction":"left","text":"gate","width":640,"height":480}
{"type":"fix","lat":34.85100,"lng":135.47000,"accuracy":5,"timestamp":"2025-03-01T09:01:10Z"}
{"type":"error","error":{"kind":"timeout"}}
{"type":"fix","lat":34.85110,"lng":135.47000,"accuracy":5,"timestamp":"2025-03-01T09:01:12Z"}
"#,
        )
        .unwrap();
        replay
    }

    fn record(&self, replay: &Path, extra: &[&str]) -> Output {
        let replay = replay.to_string_lossy().to_string();
        let mut args = vec!["record", "--replay", replay.as_str()];
        args.extend_from_slice(extra);
        self.run(&args)
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_walklog"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in [
        "record",
        "stats",
        "photos",
        "export",
        "import",
        "list-remote",
        "official-points",
        "clear",
    ] {
        assert!(stdout.contains(command), "Help should list {}", command);
    }
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_walklog"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("walklog"));
}

#[test]
fn test_subcommand_help() {
    for cmd in [
        "record",
        "stats",
        "last-position",
        "photos",
        "clear",
        "export",
        "import",
        "list-remote",
        "official-points",
    ] {
        let output = Command::new(env!("CARGO_BIN_EXE_walklog"))
            .args([cmd, "--help"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(!output.stdout.is_empty(), "{} --help should produce output", cmd);
    }
}

#[test]
fn test_completions() {
    let output = Command::new(env!("CARGO_BIN_EXE_walklog"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("walklog"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    let sandbox = Sandbox::new();
    let output = Command::new(env!("CARGO_BIN_EXE_walklog"))
        .arg("--config")
        .arg(sandbox.path("nope.toml"))
        .arg("stats")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load configuration"));
}

#[test]
fn test_invalid_config_lists_fields() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.path("config.toml"),
        "[sampler]\nmin_interval_secs = 120.0\n",
    )
    .unwrap();

    let output = sandbox.run(&["stats"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Configuration validation failed"), "{}", err);
    assert!(err.contains("sampler.min_interval_secs"), "{}", err);
}

// =============================================================================
// Recording and local data
// =============================================================================

#[test]
fn test_record_then_stats() {
    let sandbox = Sandbox::new();
    let replay = sandbox.write_walk();

    let output = sandbox.record(&replay, &[]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("Recorded 2 point(s) and 1 photo(s)"));

    let stats = sandbox.json(&["stats", "--format", "json"]);
    assert_eq!(stats["track_count"], 1);
    assert_eq!(stats["total_points"], 2);
    assert_eq!(stats["photo_count"], 1);
    assert_eq!(stats["photo_bytes"], 5);

    let position = sandbox.json(&["last-position", "--format", "json"]);
    assert_eq!(position["saved"], true);
    assert_eq!(position["lat"], 34.851);
    assert_eq!(position["zoom"], 13);
}

#[test]
fn test_record_over_existing_data_needs_mode() {
    let sandbox = Sandbox::new();
    let replay = sandbox.write_walk();
    sandbox.record(&replay, &[]);

    let output = sandbox.record(&replay, &[]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("Recording not started"));
    assert_eq!(sandbox.json(&["stats", "--format", "json"])["track_count"], 1);

    let output = sandbox.record(&replay, &["--mode", "append"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(sandbox.json(&["stats", "--format", "json"])["track_count"], 2);

    let output = sandbox.record(&replay, &["--mode", "discard"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let stats = sandbox.json(&["stats", "--format", "json"]);
    assert_eq!(stats["track_count"], 1);
    assert_eq!(stats["photo_count"], 1);
}

#[test]
fn test_bad_replay_line_is_reported() {
    let sandbox = Sandbox::new();
    let replay = sandbox.path("bad.jsonl");
    std::fs::write(&replay, "{\"type\":\"fix\",\"lat\":1,\"lng\":2}\nnot json\n").unwrap();

    let output = sandbox.record(&replay, &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("line 2"));
}

#[test]
fn test_photos_listing() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_ok(&["photos"]);
    assert!(stderr(&output).contains("No photos stored"));

    let replay = sandbox.write_walk();
    sandbox.record(&replay, &[]);

    let photos = sandbox.json(&["photos", "--format", "json"]);
    let photos = photos.as_array().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0]["direction"], "left");
    assert_eq!(photos[0]["text"], "gate");
    assert_eq!(photos[0]["bytes"], 5);
    assert_eq!(photos[0]["uploaded"], false);
    assert_eq!(photos[0]["location"]["lat"], 34.85);

    let output = sandbox.run_ok(&["photos"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Direction"), "{}", stdout);
    assert!(stdout.contains("gate"), "{}", stdout);

    // uploaded photos drop out of the pending list
    sandbox.run_ok(&["export", "--name", "walk"]);
    let pending = sandbox.json(&["photos", "--format", "json", "--pending"]);
    assert!(pending.as_array().unwrap().is_empty());
    let all = sandbox.json(&["photos", "--format", "json", "--limit", "1"]);
    assert_eq!(all[0]["uploaded"], true);
}

#[test]
fn test_clear_keeps_last_position() {
    let sandbox = Sandbox::new();
    let replay = sandbox.write_walk();
    sandbox.record(&replay, &[]);

    let output = sandbox.run(&["clear"]);
    assert!(output.status.success());
    assert_eq!(sandbox.json(&["stats", "--format", "json"])["track_count"], 1);

    sandbox.run_ok(&["clear", "--yes"]);
    let stats = sandbox.json(&["stats", "--format", "json"]);
    assert_eq!(stats["track_count"], 0);
    assert_eq!(stats["photo_count"], 0);

    let position = sandbox.json(&["last-position", "--format", "json"]);
    assert_eq!(position["saved"], true);
    assert_eq!(position["lat"], 34.851);
}

// =============================================================================
// Export and import through a directory remote
// =============================================================================

#[test]
fn test_export_without_data_fails() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["export", "--name", "walk"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No tracking data"));
}

#[test]
fn test_export_list_import_round_trip() {
    let sandbox = Sandbox::new();
    let replay = sandbox.write_walk();
    sandbox.record(&replay, &[]);

    let output = sandbox.run_ok(&["export", "--name", "walk"]);
    assert!(stderr(&output).contains("Exported \"walk\""));

    // the name is taken now
    let output = sandbox.run_ok(&["export", "--name", "walk"]);
    assert!(stderr(&output).contains("Exported \"walk_2\""));

    let listed = sandbox.json(&["list-remote", "--format", "json"]);
    let names: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"walk") && names.contains(&"walk_2"));

    sandbox.run_ok(&["clear", "--yes"]);
    let output = sandbox.run_ok(&["import", "--name", "walk"]);
    assert!(stderr(&output).contains("Imported \"walk\""));

    let stats = sandbox.json(&["stats", "--format", "json"]);
    assert_eq!(stats["track_count"], 1);
    assert_eq!(stats["total_points"], 2);
    assert_eq!(stats["photo_count"], 1);

    // imported data is not exported again
    let output = sandbox.run(&["export", "--name", "copy"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Export is disabled"));

    // a new recording re-enables export
    let output = sandbox.record(&replay, &["--mode", "discard", "--export", "fresh"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("Exported \"fresh\""));
}

#[test]
fn test_import_without_name_is_cancelled_when_not_interactive() {
    let sandbox = Sandbox::new();
    let replay = sandbox.write_walk();
    sandbox.record(&replay, &["--export", "walk"]);

    let output = sandbox.run_ok(&["import"]);
    assert!(stderr(&output).contains("Import cancelled"));
    assert_eq!(sandbox.json(&["stats", "--format", "json"])["track_count"], 1);
}

// =============================================================================
// Reference points
// =============================================================================

#[test]
fn test_official_points_absent() {
    let sandbox = Sandbox::new();
    let output = sandbox.run_ok(&["official-points"]);
    assert!(stderr(&output).contains("No reference points published"));
    assert_eq!(sandbox.json(&["official-points", "--format", "json"]), serde_json::json!([]));
}

#[test]
fn test_official_points_both_shapes() {
    let sandbox = Sandbox::new();
    let dir = sandbox.path("remote/documents/projects");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("OfficialPoints.json"),
        r#"{
  "points": [
    ["P01", "Summit", 34.85, "135.47", 120.5],
    {"pointID": "P02", "name": "Gate", "latitude": "34.86", "longitude": 135.48},
    {"id": "P03", "lat": 34.87, "lng": 135.49},
    ["P04", "No coordinates"]
  ]
}"#,
    )
    .unwrap();

    let points = sandbox.json(&["official-points", "--format", "json"]);
    let points = points.as_array().unwrap();
    let ids: Vec<&str> = points.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["P01", "P02", "P03"]);
    assert_eq!(points[0]["lng"], 135.47);
    assert_eq!(points[0]["elevation"], 120.5);
    assert_eq!(points[1]["lat"], 34.86);
    assert!(points[2]["name"].is_null());

    let output = sandbox.run_ok(&["official-points"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summit"), "{}", stdout);
    assert!(stdout.contains("120.5 m"), "{}", stdout);

    // the reference list is not offered as a session
    let listed = sandbox.json(&["list-remote", "--format", "json"]);
    assert!(listed.as_array().unwrap().is_empty());
}
