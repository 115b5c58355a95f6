// Integration tests enforcing the --json stdout contract and exit codes.
//
// These tests guarantee that stdout from --json commands is:
//   1. Valid JSON
//   2. Exactly one JSON value (no extra lines, no banners, no colors)
//   3. The correct shape for its command type
//
// Run with: cargo test -p voxcheck-cli --test json_contract_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};

/// Isolated from the user's config dir and VCHECK_CONFIG.
fn vcheck(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vcheck"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("VCHECK_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd.env("XDG_CONFIG_HOME", home);
    cmd.env("HOME", home);
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../verify/tests/fixtures")
        .join(name)
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");

    // Must parse as exactly one JSON value
    let val: Value = serde_json::from_str(trimmed).unwrap_or_else(|e| {
        panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, trimmed)
    });

    let re_serialized = serde_json::to_string(&val).unwrap();
    let re_parsed: Value = serde_json::from_str(&re_serialized).unwrap();
    assert_eq!(val, re_parsed, "JSON round-trip should be stable");

    val
}

fn code(output: &Output) -> i32 {
    output.status.code().expect("process exited by signal")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn json_of(output: &Output) -> Value {
    assert_single_json(&String::from_utf8_lossy(&output.stdout))
}

// ===========================================================================
// vcheck reconcile --json
// ===========================================================================

#[test]
fn reconcile_exact_claims_pass() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"epsg": 23031, "datum": "ED50"}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "--metadata", arg(&fixture("f3_metadata.json"))])
        .args(["--claims", arg(&claims), "--json"])
        .output()
        .expect("vcheck reconcile --json");

    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["overall_status"], json!("PASS"));
    assert_eq!(val["validation_score"], json!(1.0));
    assert_eq!(val["details"]["epsg"]["status"], json!("PASS"));
    assert!(val["details"]["epsg"]["source_path"]
        .as_str()
        .unwrap()
        .starts_with("crs_info.crsWkt (parsed"));
    assert_eq!(val["counts"]["passed"], json!(2));
}

#[test]
fn reconcile_within_tolerance_is_mostly_valid() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"max": 2500}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json"))])
        .args(["-c", arg(&claims), "-s", arg(&fixture("amplitude_window.json")), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["overall_status"], json!("MOSTLY_VALID"));
    let max = &val["details"]["max"];
    assert_eq!(max["match_type"], json!("numeric_tolerance"));
    assert_eq!(max["source_path"], json!("samples.max"));
}

#[test]
fn reconcile_failed_claims_exit_4_with_json() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"mean": 145}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json"))])
        .args(["-c", arg(&claims), "-s", arg(&fixture("amplitude_window.json")), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 4);
    let val = json_of(&output);
    assert_eq!(val["overall_status"], json!("FAIL"));
    assert_eq!(val["details"]["mean"]["status"], json!("FAIL"));
    // The verdict is not an error: nothing on stderr starts with "error:"
    assert!(!stderr(&output).contains("error:"));
}

#[test]
fn reconcile_partially_valid_exit_3() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(
        dir.path(),
        "claims.json",
        r#"{"location": {"inline": 425, "crossline": 1300}}"#,
    );

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json"))])
        .args(["-c", arg(&claims), "-r", arg(&fixture("f3_ranges.json")), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 3, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["overall_status"], json!("PARTIALLY_VALID"));
    let crossline = &val["details"]["location.crossline"];
    assert_eq!(crossline["match_type"], json!("out_of_range"));
    assert_eq!(crossline["alternatives"]["nearest_valid"], json!(1250.0));
}

#[test]
fn reconcile_human_summary_on_stderr_only() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"Datum": "ed50", "survey_year": 2020}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json")), "-c", arg(&claims)])
        .output()
        .unwrap();

    assert!(output.stdout.is_empty(), "human mode keeps stdout empty");
    let err = stderr(&output);
    assert!(err.contains("NOT_FOUND"), "{err}");
    assert!(err.contains("case_insensitive") || err.contains("ED50"), "{err}");
    assert!(err.contains("score:"), "{err}");
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn empty_claims_is_a_precondition_error() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", "{}");

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json")), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 7);
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("error: no claims supplied"), "{err}");
    assert!(err.contains("hint:  run `vcheck discover`"), "{err}");
}

#[test]
fn coordinate_claims_without_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"location.inline": 425}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&fixture("f3_metadata.json")), "-c", arg(&claims)])
        .output()
        .unwrap();

    assert_eq!(code(&output), 7);
    assert!(stderr(&output).contains("--ranges"));
}

#[test]
fn malformed_metadata_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = write(dir.path(), "meta.json", "{\"datum\": ");
    let claims = write(dir.path(), "claims.json", r#"{"datum": "ED50"}"#);

    let output = vcheck(dir.path())
        .args(["reconcile", "-m", arg(&metadata), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 5);
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_input_file_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = vcheck(dir.path())
        .args(["discover", "-m", arg(&dir.path().join("nope.json"))])
        .output()
        .unwrap();

    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("cannot read"));
}

// ===========================================================================
// vcheck discover / resolve --json
// ===========================================================================

#[test]
fn discover_json_shape() {
    let dir = tempfile::tempdir().unwrap();
    let output = vcheck(dir.path())
        .args(["discover", "-m", arg(&fixture("broken_crs.json")), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    let obj = val.as_object().expect("should be JSON object");
    for key in ["fields", "parsed", "resolved", "unparseable"] {
        assert!(obj.contains_key(key), "must have '{key}' key");
    }
    assert_eq!(val["unparseable"], json!(["crs.wkt"]));
    assert_eq!(val["fields"]["Datum Name"], json!("WGS84"));
}

#[test]
fn discover_lists_parsed_crs_fields() {
    let dir = tempfile::tempdir().unwrap();
    let output = vcheck(dir.path())
        .args(["discover", "-m", arg(&fixture("f3_metadata.json")), "--json"])
        .output()
        .unwrap();

    let val = json_of(&output);
    let parsed = val["parsed"].as_object().unwrap();
    assert!(parsed.keys().any(|k| k.ends_with("(parsed: epsg_code)")), "{parsed:?}");
    assert_eq!(val["resolved"]["epsg_code"]["found"], json!(true));
}

#[test]
fn resolve_found_and_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = fixture("f3_metadata.json");

    let output = vcheck(dir.path())
        .args(["resolve", "epsg", "-m", arg(&metadata), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0);
    let val = json_of(&output);
    assert_eq!(val["field"], json!("epsg"));
    assert_eq!(val["found"], json!(true));
    assert_eq!(val["value"], json!("23031"));
    assert_eq!(val["strategy"], json!("parsed_text"));

    let output = vcheck(dir.path())
        .args(["resolve", "survey_year", "-m", arg(&metadata), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0);
    let val = json_of(&output);
    assert_eq!(val["found"], json!(false));
    assert!(val.get("source_path").is_none());
}

// ===========================================================================
// vcheck stats / coords --json
// ===========================================================================

#[test]
fn stats_snapshot_from_json_samples() {
    let dir = tempfile::tempdir().unwrap();
    let output = vcheck(dir.path())
        .args(["stats", "-s", arg(&fixture("amplitude_window.json")), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["count"], json!(40));
    assert_eq!(val["non_finite"], json!(0));
    assert_eq!(val["max"], json!(2487.3));
    assert_eq!(val["min"], json!(-1468.1));
}

#[test]
fn stats_audit_from_csv_column() {
    let dir = tempfile::tempdir().unwrap();
    let samples = write(dir.path(), "window.csv", "trace,amplitude\n1,1\n2,2\n3,\n4,4\n");
    let claims = write(dir.path(), "claims.json", r#"{"maximum": 4, "mean": 10}"#);

    let output = vcheck(dir.path())
        .args(["stats", "-s", arg(&samples), "--column", "amplitude"])
        .args(["-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    let val = json_of(&output);
    assert_eq!(val["details"]["maximum"]["status"], json!("PASS"));
    assert_eq!(val["details"]["mean"]["status"], json!("FAIL"));
    // mean 10 above max 4 contradicts itself as well
    assert_eq!(val["details"]["_consistency"]["status"], json!("FAIL"));
    assert_eq!(code(&output), 4);
}

#[test]
fn stats_all_nan_samples() {
    let dir = tempfile::tempdir().unwrap();
    let samples = write(dir.path(), "window.json", "[null, null]");

    let output = vcheck(dir.path())
        .args(["stats", "-s", arg(&samples), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 7);
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("no finite values"));
}

#[test]
fn coords_out_of_range_fails() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "location.json", r#"{"crossline": 1300}"#);

    let output = vcheck(dir.path())
        .args(["coords", "-r", arg(&fixture("f3_ranges.json")), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 4);
    let val = json_of(&output);
    let r = &val["details"]["crossline"];
    assert_eq!(r["status"], json!("FAIL"));
    assert_eq!(r["alternatives"]["valid_max"], json!(1250.0));
}

#[test]
fn coords_location_prefix_ignores_case() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(
        dir.path(),
        "location.json",
        r#"{"Location": {"inline": 425}, "LOCATION.crossline": 800}"#,
    );

    let output = vcheck(dir.path())
        .args(["coords", "-r", arg(&fixture("f3_ranges.json")), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["overall_status"], json!("PASS"));
    assert_eq!(val["details"]["inline"]["status"], json!("PASS"));
    assert_eq!(val["details"]["crossline"]["status"], json!("PASS"));
}

#[test]
fn inverted_range_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ranges = write(dir.path(), "ranges.json", r#"{"inline": [750, 100]}"#);
    let claims = write(dir.path(), "location.json", r#"{"inline": 425}"#);

    let output = vcheck(dir.path())
        .args(["coords", "-r", arg(&ranges), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();

    assert_eq!(code(&output), 7);
    assert!(stderr(&output).contains("invalid range"));
}

// ===========================================================================
// vcheck provenance
// ===========================================================================

#[test]
fn provenance_record_then_verify() {
    let dir = tempfile::tempdir().unwrap();
    let samples = write(dir.path(), "window.json", "[1.0, 2.0, 3.5]");
    let record = dir.path().join("window.provenance.json");

    let output = vcheck(dir.path())
        .args(["provenance", "record", "-s", arg(&samples)])
        .args(["--param", "inline=425", "--param", "volume=f3"])
        .args(["-o", arg(&record)])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
    assert_eq!(stored["subject"], json!({"kind": "samples", "count": 3}));
    assert_eq!(stored["extraction_params"]["inline"], json!(425));
    assert_eq!(stored["statistics"]["max"], json!(3.5));
    assert_eq!(stored["content_hash"].as_str().unwrap().len(), 64);

    let output = vcheck(dir.path())
        .args(["provenance", "verify", "--record", arg(&record), "-s", arg(&samples), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0);
    assert_eq!(json_of(&output)["matches"], json!(true));

    // One changed sample
    let changed = write(dir.path(), "changed.json", "[1.0, 2.0, 3.6]");
    let output = vcheck(dir.path())
        .args(["provenance", "verify", "--record", arg(&record), "-s", arg(&changed), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 8);
    let val = json_of(&output);
    assert_eq!(val["matches"], json!(false));
    assert_ne!(val["expected_hash"], val["actual_hash"]);
}

#[test]
fn provenance_document_ignores_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.json", r#"{"datum": "ED50", "shape": [1, 2]}"#);
    let b = write(dir.path(), "b.json", r#"{"shape": [1, 2], "datum": "ED50"}"#);

    let output = vcheck(dir.path())
        .args(["provenance", "record", "-m", arg(&a)])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0);
    json_of(&output);
    let record = write(dir.path(), "record.json", &String::from_utf8_lossy(&output.stdout));

    let output = vcheck(dir.path())
        .args(["provenance", "verify", "--record", arg(&record), "-m", arg(&b)])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    // Wrong kind of input for the record
    let output = vcheck(dir.path())
        .args(["provenance", "verify", "--record", arg(&record), "-s", arg(&a)])
        .output()
        .unwrap();
    assert_eq!(code(&output), 2);
}

// ===========================================================================
// vcheck config
// ===========================================================================

#[test]
fn config_validate_and_show() {
    let dir = tempfile::tempdir().unwrap();

    let output = vcheck(dir.path())
        .args(["config", "validate", arg(&fixture("custom.verify.toml")), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0);
    let val = json_of(&output);
    assert_eq!(val["valid"], json!(true));
    assert_eq!(val["name"], json!("strict-stats"));

    let bad = write(dir.path(), "bad.toml", "[matching]\ntolerance = 0\n");
    let output = vcheck(dir.path())
        .args(["config", "validate", arg(&bad), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 6);
    assert_eq!(json_of(&output)["valid"], json!(false));

    let output = vcheck(dir.path()).args(["config", "show", "--json"]).output().unwrap();
    assert_eq!(code(&output), 0);
    let val = json_of(&output);
    assert_eq!(val["source"], json!("builtin"));
    assert_eq!(val["config"]["matching"]["tolerance"], json!(0.05));
}

#[test]
#[cfg(target_os = "linux")]
fn config_from_env_and_user_dir() {
    let dir = tempfile::tempdir().unwrap();

    let output = vcheck(dir.path())
        .env("VCHECK_CONFIG", fixture("custom.verify.toml"))
        .args(["config", "show", "--json"])
        .output()
        .unwrap();
    assert_eq!(json_of(&output)["config"]["name"], json!("strict-stats"));

    let user_dir = dir.path().join("voxcheck");
    std::fs::create_dir_all(&user_dir).unwrap();
    std::fs::write(user_dir.join("verify.toml"), "name = \"site\"\n").unwrap();
    let output = vcheck(dir.path()).args(["config", "show", "--json"]).output().unwrap();
    let val = json_of(&output);
    assert_eq!(val["config"]["name"], json!("site"));
    assert!(val["source"].as_str().unwrap().ends_with("verify.toml"));
}

#[test]
fn invalid_active_config_blocks_commands() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write(dir.path(), "bad.toml", "[matching]\nfuzzy_threshold = 2.0\n");

    let output = vcheck(dir.path())
        .args(["--config", arg(&bad)])
        .args(["discover", "-m", arg(&fixture("f3_metadata.json")), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 6);
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("hint:  check"));
}

#[test]
fn reconcile_with_custom_tables() {
    let dir = tempfile::tempdir().unwrap();
    let claims = write(dir.path(), "claims.json", r#"{"datum": "WGS84"}"#);

    let output = vcheck(dir.path())
        .args(["--config", arg(&fixture("custom.verify.toml"))])
        .args(["reconcile", "-m", arg(&fixture("broken_crs.json")), "-c", arg(&claims), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = json_of(&output);
    assert_eq!(val["details"]["datum"]["source_path"], json!("Datum Name"));
}
