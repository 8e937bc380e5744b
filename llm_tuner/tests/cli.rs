use predicates::prelude::*;
use serial_test::serial;
use std::path::{Path, PathBuf};

const REGISTRY: &str = r#"healthCheckTimeout: 60
logLevel: info
models:
  "llama-8b":
    cmd: >
      /opt/llama.cpp-cpu/llama-server
      -m /models/missing/Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf
      --port ${PORT} --ctx-size 2048 --main-gpu 0
    ttl: 300
  "no-model-path":
    cmd: /opt/llama.cpp-cpu/llama-server --port ${PORT}
groups:
  "chat":
    swap: true
    members: ["llama-8b"]
"#;

fn write_registry(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join("llama-swap.yaml");
    std::fs::write(&path, REGISTRY)?;
    Ok(path)
}

/// Keeps the rolling log files inside the test's temp dir.
fn tuner(dir: &Path) -> anyhow::Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("llm-tuner")?;
    cmd.env("XDG_DATA_HOME", dir).env("HOME", dir);
    Ok(cmd)
}

fn backups_in(dir: &Path) -> anyhow::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy().contains(".backup_") {
            count += 1;
        }
    }
    Ok(count)
}

#[test]
fn help_shows_usage() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("llm-tuner")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Usage: llm-tuner"))
        .stdout(predicates::str::contains("--preset"));
    Ok(())
}

#[test]
fn unknown_backend_is_rejected_by_clap() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("llm-tuner")?
        .args(["--backend", "opencl"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicates::str::contains("unknown compute backend"));
    Ok(())
}

#[test]
fn single_model_prints_its_command() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .args(["--model", "llama-8b", "--backend", "cpu", "--preset", "speed"])
        .assert()
        .success()
        .stdout(predicates::str::starts_with(
            "\"/opt/llama.cpp-cpu/llama-server\" -m \"/models/missing/Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf\" --port ${PORT}",
        ))
        .stdout(predicates::str::contains("--n-gpu-layers 0"))
        .stdout(predicates::str::contains("--main-gpu 0"))
        .stdout(predicates::str::contains("--cache-type-k").not())
        .stdout(predicates::str::contains("--jinja"));

    // Printing a single command never touches the file.
    assert_eq!(std::fs::read_to_string(&config)?, REGISTRY);
    assert_eq!(backups_in(dir.path())?, 0);
    Ok(())
}

#[test]
fn estimate_prints_a_footprint_table() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .args(["--model", "llama-8b", "--backend", "cpu", "--estimate"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Context Size"))
        .stdout(predicates::str::contains("8192"));
    Ok(())
}

#[test]
fn unknown_model_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .args(["--model", "gpt-5", "--backend", "cpu"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("ModelNotFound"));
    Ok(())
}

#[test]
#[serial]
fn rewrite_keeps_a_backup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .args(["--backend", "cpu", "--preset", "safe"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Optimized 1 models"))
        .stdout(predicates::str::contains("llama-8b: preset=system-safe"));

    assert_eq!(backups_in(dir.path())?, 1);
    let rewritten = llm_tuner::Registry::load(&config)?;
    let cmd = &rewritten.models["llama-8b"].cmd;
    assert!(cmd.contains("--n-gpu-layers 0"));
    assert!(cmd.contains("--port ${PORT}"));
    assert!(cmd.starts_with("\"/opt/llama.cpp-cpu/llama-server\" -m "));
    assert!(!cmd.contains("--ctx-size 2048"));
    // The model that failed keeps its original command.
    assert_eq!(
        rewritten.models["no-model-path"].cmd,
        "/opt/llama.cpp-cpu/llama-server --port ${PORT}"
    );
    assert_eq!(rewritten.models["llama-8b"].ttl, Some(300));
    assert_eq!(rewritten.groups["chat"].members, vec!["llama-8b"]);
    Ok(())
}

#[test]
#[serial]
fn output_path_without_backup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    let output = dir.path().join("tuned.yaml");
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&output)
        .args(["--backup", "false", "--backend", "cpu"])
        .assert()
        .success();

    assert_eq!(backups_in(dir.path())?, 0);
    assert_eq!(std::fs::read_to_string(&config)?, REGISTRY);
    assert!(std::fs::read_to_string(&output)?.contains("--jinja"));
    Ok(())
}

#[test]
fn missing_config_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tuner(dir.path())?
        .arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .assert()
        .failure()
        .stderr(predicates::str::contains("read registry"));
    Ok(())
}

#[test]
fn tuning_file_is_created_with_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_registry(dir.path())?;
    let tuning = dir.path().join("tuning.toml");
    tuner(dir.path())?
        .arg("--config")
        .arg(&config)
        .arg("--tuning")
        .arg(&tuning)
        .args(["--model", "llama-8b", "--backend", "cpu"])
        .assert()
        .success();
    assert!(std::fs::read_to_string(&tuning)?.contains("context_safety_margin"));
    Ok(())
}
