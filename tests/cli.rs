use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/input").join(name)
}

#[test]
fn renders_svg_from_topology_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output_path = tmp.path().join("canvas.svg");

    let mut cmd = Command::cargo_bin("opscanvas")?;
    cmd.arg("render")
        .arg("--input")
        .arg(fixture("topology.json"))
        .arg("--output")
        .arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Rendered canvas"));

    let svg_contents = fs::read_to_string(&output_path)?;
    assert!(svg_contents.contains("<svg"));
    assert!(svg_contents.contains("Orders API"));
    Ok(())
}

#[test]
fn inspect_reports_offsets_and_dangling_links() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("opscanvas")?
        .arg("inspect")
        .arg("-i")
        .arg(fixture("topology.json"))
        .output()?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["danglingConnections"], serde_json::json!(["c4"]));

    let connections = report["frame"]["connections"].as_array().ok_or("missing connections")?;
    assert_eq!(connections.len(), 3);
    assert_eq!(connections[0]["path"]["offset"], serde_json::json!(-15.0));
    assert_eq!(connections[1]["path"]["offset"], serde_json::json!(15.0));
    assert_eq!(report["frame"]["bounds"]["minX"], serde_json::json!(-400.0));
    Ok(())
}

#[test]
fn replay_drags_a_node() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output_path = tmp.path().join("after.json");

    Command::cargo_bin("opscanvas")?
        .arg("replay")
        .arg("-i")
        .arg(fixture("topology.json"))
        .arg("--events")
        .arg(fixture("drag_node.json"))
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Replayed 5 events (2 edits, 0 pans)"));

    let topology: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output_path)?)?;
    let moved = &topology["nodes"][1];
    assert_eq!(moved["id"], "b");
    assert_eq!(moved["position"]["x"], serde_json::json!(360.0));
    assert_eq!(moved["position"]["y"], serde_json::json!(280.0));
    Ok(())
}

#[test]
fn new_writes_the_sample_without_overwriting() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let first = tmp.path().join("topology.json");

    Command::cargo_bin("opscanvas")?
        .arg("new")
        .arg(&first)
        .assert()
        .success();
    Command::cargo_bin("opscanvas")?
        .arg("new")
        .arg(&first)
        .assert()
        .success()
        .stdout(predicate::str::contains("topology1.json"));

    assert!(first.exists());
    assert!(tmp.path().join("topology1.json").exists());
    Ok(())
}

#[test]
fn missing_input_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("opscanvas")?
        .arg("render")
        .arg("-i")
        .arg("does-not-exist.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}

#[test]
fn analyze_requires_an_api_key() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("opscanvas")?
        .env_remove("GEMINI_API_KEY")
        .arg("analyze")
        .arg("-i")
        .arg(fixture("topology.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key provided"));
    Ok(())
}
