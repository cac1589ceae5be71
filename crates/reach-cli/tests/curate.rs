use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

#[test]
fn export_converts_pixels_and_keeps_every_row() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = stage_recording(dir.path())?;

    let mut cmd = cargo_bin_cmd!("reach");
    cmd.args(["export", "--input", path_str(&input), "--setting"])
        .arg(setting_path("pixels"));
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["rows"], 18);
    let exported = PathBuf::from(report["output"].as_str().expect("output path"));
    assert_eq!(exported, dir.path().join("s01_selected.csv"));

    let table = read_csv(&exported)?;
    assert_eq!(
        &table.headers[..13],
        &[
            "trial_no",
            "time_ms",
            "cursorx_cm",
            "cursory_cm",
            "handx_cm",
            "handy_cm",
            "targetx_cm",
            "targety_cm",
            "accept",
            "max_velocity",
            "selected",
            "interpolated",
            "unsure"
        ]
    );
    assert_eq!(table.headers.last().map(String::as_str), Some("step"));
    assert_eq!(table.rows.len(), 18);

    // (raw - origin) * ratio with origin (500, 400) px and 0.05 cm/px, on every row
    let raw = read_tsv(&workspace_root().join("test_data/reach_pixels.txt"))?;
    assert_eq!(raw.rows.len(), table.rows.len());
    let coordinates = [
        ("cursorx_px", "cursorx_cm", 500.0),
        ("cursory_px", "cursory_cm", 400.0),
        ("handx_px", "handx_cm", 500.0),
        ("handy_px", "handy_cm", 400.0),
        ("targetx_px", "targetx_cm", 500.0),
        ("targety_px", "targety_cm", 400.0),
    ];
    for (raw_row, out_row) in raw.rows.iter().zip(&table.rows) {
        assert_eq!(raw.get(raw_row, "trial_no"), table.get(out_row, "trial_no"));
        assert_close(table.num(out_row, "time_ms"), raw.num(raw_row, "time_ms"));
        for (raw_column, column, origin) in coordinates {
            assert_close(
                table.num(out_row, column),
                (raw.num(raw_row, raw_column) - origin) * 0.05,
            );
        }
    }

    // segments [2, 5] are matched against the step column
    let selected: Vec<&str> = table.column("selected").into_iter().take(6).collect();
    assert_eq!(selected, vec!["0", "1", "1", "1", "1", "0"]);
    assert!(table.column("accept").iter().all(|v| *v == "0"));
    Ok(())
}

#[test]
fn curate_script_exports_and_reloads() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = stage_recording(dir.path())?;
    let script = dir.path().join("commands.jsonl");
    fs::write(
        &script,
        [
            r#"{"op":"set_window","p1":10,"p2":30}"#,
            r#"{"op":"accept"}"#,
            r#"{"op":"next"}"#,
            r#"{"op":"reject"}"#,
            r#"{"op":"unsure","value":true}"#,
            r#"{"op":"next"}"#,
            r#"{"op":"next"}"#,
            r#"{"op":"bogus"}"#,
            r#"{"op":"set_max_velocity","t":20}"#,
            r#"{"op":"accept"}"#,
            r#"{"op":"status"}"#,
        ]
        .join("\n"),
    )?;

    let mut cmd = cargo_bin_cmd!("reach");
    cmd.args([
        "curate",
        "--input",
        path_str(&input),
        "--commands",
        path_str(&script),
        "--save",
    ])
    .arg("--setting")
    .arg(setting_path("pixels"));
    let output = cmd.assert().success().get_output().stdout.clone();
    let responses = json_lines(&output)?;
    assert_eq!(responses.len(), 12);

    assert_eq!(responses[0]["result"]["window"], serde_json::json!([10.0, 30.0]));
    assert_eq!(responses[0]["result"]["max_velocity"], 30.0);
    assert_eq!(responses[2]["result"]["trial"], 2);
    assert!(responses[6]["error"]
        .as_str()
        .is_some_and(|e| e.contains("trial 3")));
    assert!(responses[7]["error"].is_string());
    let status = &responses[10]["result"];
    assert_eq!(status["trial"], 3);
    assert_eq!(status["position"], 3);
    assert_eq!(status["mode"], "Accepted");
    assert_eq!(status["max_velocity"], 20.0);
    assert_eq!(status["peak_source"], "UserPick");
    assert_eq!(responses[11]["result"]["dirty_trials"], serde_json::json!([]));

    let exported = dir.path().join("s01_selected.csv");
    let table = read_csv(&exported)?;
    assert_eq!(table.rows.len(), 18);
    let trial = |n: &str, column: &str| -> Vec<String> {
        table
            .rows
            .iter()
            .filter(|row| table.get(row, "trial_no") == n)
            .map(|row| table.get(row, column).to_string())
            .collect()
    };
    assert_eq!(trial("1", "selected"), ["0", "1", "1", "1", "0", "0"]);
    assert_eq!(trial("1", "max_velocity"), ["0", "0", "0", "1", "0", "0"]);
    assert!(trial("1", "accept").iter().all(|v| v == "1"));
    assert!(trial("2", "accept").iter().all(|v| v == "-1"));
    assert!(trial("2", "unsure").iter().all(|v| v == "1"));
    assert_eq!(trial("3", "max_velocity"), ["0", "0", "1", "0", "0", "0"]);

    let mut summary = cargo_bin_cmd!("reach");
    summary.args(["summary", "--input", path_str(&exported)]);
    let output = summary.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["rows"], 18);
    assert_eq!(summary["trials"], 3);
    assert_eq!(summary["accepted"], 2);
    assert_eq!(summary["rejected"], 1);
    assert_eq!(summary["unresolved"], 0);
    assert_eq!(summary["unsure"], 1);

    let mut reopen = cargo_bin_cmd!("reach");
    reopen
        .args(["curate", "--input", path_str(&exported)])
        .write_stdin("{\"op\":\"status\"}\n");
    let output = reopen.assert().success().get_output().stdout.clone();
    let responses = json_lines(&output)?;
    let status = &responses[0]["result"];
    assert_eq!(status["trial"], 1);
    assert_eq!(status["mode"], "Accepted");
    assert_eq!(status["window"], serde_json::json!([10.0, 30.0]));
    assert_eq!(status["max_velocity"], 30.0);
    assert_eq!(status["peak_source"], "Saved");
    Ok(())
}

#[test]
fn settings_folder_lists_and_loads_by_name() -> Result<(), Box<dyn Error>> {
    let settings_dir = workspace_root().join("test_data/settings");

    let mut cmd = cargo_bin_cmd!("reach");
    cmd.args(["settings", "--dir", path_str(&settings_dir)]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let names: Vec<String> = serde_json::from_slice(&output)?;
    assert_eq!(names, vec!["centimetres", "pixels"]);

    let dir = tempfile::tempdir()?;
    let input = stage_recording(dir.path())?;
    let mut cmd = cargo_bin_cmd!("reach");
    cmd.args([
        "summary",
        "--input",
        path_str(&input),
        "--settings-dir",
        path_str(&settings_dir),
        "--setting-name",
        "pixels",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["trials"], 3);
    assert_eq!(summary["unresolved"], 3);
    assert_eq!(summary["extra_columns"], serde_json::json!(["step"]));
    Ok(())
}

#[test]
fn pixel_columns_without_ratio_fail_with_config_error() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = stage_recording(dir.path())?;

    let mut cmd = cargo_bin_cmd!("reach");
    cmd.args(["summary", "--input", path_str(&input)]);
    let assert = cmd.assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("PX_CM_Ratio"), "stderr was: {}", stderr);
    Ok(())
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn index(&self, column: &str) -> usize {
        self.headers
            .iter()
            .position(|h| h == column)
            .unwrap_or_else(|| panic!("missing column {}", column))
    }

    fn get<'a>(&self, row: &'a [String], column: &str) -> &'a str {
        &row[self.index(column)]
    }

    fn num(&self, row: &[String], column: &str) -> f64 {
        self.get(row, column).parse().expect("numeric cell")
    }

    fn column(&self, column: &str) -> Vec<&str> {
        let idx = self.index(column);
        self.rows.iter().map(|row| row[idx].as_str()).collect()
    }
}

fn read_csv(path: &Path) -> Result<Table, Box<dyn Error>> {
    read_delimited(path, b',')
}

fn read_tsv(path: &Path) -> Result<Table, Box<dyn Error>> {
    read_delimited(path, b'\t')
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table, Box<dyn Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

fn json_lines(output: &[u8]) -> Result<Vec<Value>, Box<dyn Error>> {
    let text = std::str::from_utf8(output)?;
    let mut values = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        values.push(serde_json::from_str(line)?);
    }
    Ok(values)
}

/// Copy the raw recording into `dir` so exports land next to it.
fn stage_recording(dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let target = dir.join("s01.txt");
    fs::copy(workspace_root().join("test_data/reach_pixels.txt"), &target)?;
    Ok(target)
}

fn setting_path(name: &str) -> PathBuf {
    workspace_root()
        .join("test_data/settings")
        .join(format!("{}.json", name))
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}
