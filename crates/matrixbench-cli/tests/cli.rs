use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Runs the binary inside `dir` with a config path that does not exist there
/// unless a test writes it.
fn matrixbench(dir: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_matrixbench"))
        .arg("--config")
        .arg(dir.join("matrixbench.yml"))
        .args(args)
        .current_dir(dir)
        .output()?)
}

#[test]
fn test_dry_run_lists_task_matrix_without_side_effects() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();

    let output = matrixbench(
        temp_path,
        &["run", "echo", "-p", "a", "-p", "b", "-r", "2", "-o", "out", "--dry-run"],
    )?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tasks: 4"), "stdout: {stdout}");
    assert!(stdout.contains("rep 1: echo a"));
    assert!(stdout.contains("rep 0: echo b"));
    assert!(!temp_path.join("out").exists());

    Ok(())
}

#[test]
fn test_dry_run_range_sweep() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = matrixbench(
        temp_dir.path(),
        &["run", "seq", "--min", "0", "--max", "10", "--step", "5", "--dry-run"],
    )?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tasks: 2"), "stdout: {stdout}");
    assert!(stdout.contains("seq 0"));
    assert!(stdout.contains("seq 5"));

    Ok(())
}

#[test]
fn test_conflicting_sweep_in_config_file_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();

    let config_content = r#"
command: "sort"
params: ["a.txt", "b.txt"]
range:
  min: 0
  max: 3
output_dir: "out"
"#;
    fs::write(temp_path.join("matrixbench.yml"), config_content)?;

    let output = matrixbench(temp_path, &["run"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mutually exclusive"), "stderr: {stderr}");
    assert!(!temp_path.join("out").exists());

    Ok(())
}

#[test]
fn test_conflicting_sweep_flags_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = matrixbench(
        temp_dir.path(),
        &["run", "ls", "-p", "x", "--min", "0", "--max", "2"],
    )?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot be used with"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_missing_command_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = matrixbench(temp_dir.path(), &["run", "-o", "out"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("A command is required"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_reconcile_requires_existing_store() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = matrixbench(temp_dir.path(), &["reconcile", "-o", "missing"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No result store found"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_reconcile_attaches_existing_timing_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("out");
    fs::create_dir_all(out.join(".timing_outputs"))?;

    let store = serde_json::json!({
        "version": 1,
        "tasks": [{
            "group_id": "g-1",
            "id": "abc",
            "created_at": "2024-05-01T12:00:00Z",
            "filename": "abc.txt",
            "command": "echo",
            "param": "hi",
            "command_with_param": "echo hi",
            "repetition_id": 0
        }]
    });
    fs::write(out.join("matrixbench.json"), serde_json::to_string_pretty(&store)?)?;
    fs::write(out.join(".timing_outputs").join("abc.txt"), "0.30;0.20;0.05;2048\n")?;

    let output = matrixbench(temp_dir.path(), &["reconcile", "-o", "out"])?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 tasks: 1 succeeded, 0 failed"), "stdout: {stdout}");

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("matrixbench.json"))?)?;
    assert_eq!(
        saved["tasks"][0]["timing_result"]["resident_set_memory_kb"],
        2048
    );

    Ok(())
}

#[test]
fn test_reconcile_reports_malformed_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("out");
    fs::create_dir_all(out.join(".timing_outputs"))?;

    let store = serde_json::json!({
        "version": 1,
        "tasks": [{
            "group_id": "g-1",
            "id": "bad",
            "created_at": "2024-05-01T12:00:00Z",
            "filename": "bad.txt",
            "command": "true",
            "param": null,
            "command_with_param": "true",
            "repetition_id": 0
        }]
    });
    fs::write(out.join("matrixbench.json"), serde_json::to_string(&store)?)?;
    fs::write(out.join(".timing_outputs").join("bad.txt"), "1.2;3.4\n")?;

    let output = matrixbench(temp_dir.path(), &["reconcile", "-o", "out"])?;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAILED [bad] rep 0: true"), "stdout: {stdout}");

    Ok(())
}

#[test]
fn test_reconcile_rejects_failed_command_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("out");
    fs::create_dir_all(out.join(".timing_outputs"))?;

    let store = serde_json::json!({
        "version": 1,
        "tasks": [{
            "group_id": "g-1",
            "id": "exit4",
            "created_at": "2024-05-01T12:00:00Z",
            "filename": "exit4.txt",
            "command": "exit 4",
            "param": null,
            "command_with_param": "exit 4",
            "repetition_id": 0
        }]
    });
    fs::write(out.join("matrixbench.json"), serde_json::to_string(&store)?)?;
    fs::write(
        out.join(".timing_outputs").join("exit4.txt"),
        "Command exited with non-zero status 4\n0.01;0.00;0.00;1024\n",
    )?;

    let output = matrixbench(temp_dir.path(), &["reconcile", "-o", "out"])?;
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 tasks: 0 succeeded, 1 failed"), "stdout: {stdout}");

    let output = matrixbench(
        temp_dir.path(),
        &["reconcile", "-o", "out", "--allow-nonzero-exit"],
    )?;
    assert!(output.status.success());
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("matrixbench.json"))?)?;
    assert_eq!(
        saved["tasks"][0]["timing_result"]["resident_set_memory_kb"],
        1024
    );

    Ok(())
}
