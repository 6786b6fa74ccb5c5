//! Binary tests for the gg CLI

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn presets_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("presets")
}

/// Offline config rooted in `temp`, returned as its path
fn write_config(temp: &Path) -> PathBuf {
    let runtime = temp.join("phaser.min.js");
    fs::write(&runtime, "/* engine */").unwrap();
    let config = format!(
        r#"
generation:
  backend: deterministic
  syntax-check: false
storage:
  games-dir: {games}
  presets-dir: {presets}
  runtime-paths:
    - {runtime}
"#,
        games = temp.join("games").display(),
        presets = presets_dir().display(),
        runtime = runtime.display(),
    );
    let path = temp.join("gamegen.yml");
    fs::write(&path, config).unwrap();
    path
}

fn gg(temp: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gg").unwrap();
    cmd.env("HOME", temp)
        .env("XDG_DATA_HOME", temp.join("data"))
        .env("XDG_CONFIG_HOME", temp.join("config"))
        .current_dir(temp);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    gg(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("edit"));
}

#[test]
fn test_edit_rewrites_file_source() {
    let temp = TempDir::new().unwrap();
    let scene = temp.path().join("scene.js");
    fs::write(&scene, "class S { constructor() { this.shotCooldownMs = 400; } }\n").unwrap();

    gg(temp.path())
        .args(["edit", scene.to_str().unwrap(), "--prompt", "shooting 2x faster"])
        .assert()
        .success()
        .stdout(predicate::str::contains("this.shotCooldownMs = 200;"))
        .stderr(predicate::str::contains("400 -> 200"));
}

#[test]
fn test_generate_preset_then_list_and_show() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "generate", "a shooter", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "ready");
    let id = record["id"].as_str().unwrap().to_string();

    gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "games"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("[2dShooter]"));

    gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"preset\": \"2dShooter\""));
}

#[test]
fn test_generate_new_game_text_output() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "generate", "a meteor dodging game"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ready"))
        .stdout(predicate::str::contains("/index.html"));
}

#[test]
fn test_modify_without_base_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "generate", "faster", "--mode", "modify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a base game id"));
}

#[test]
fn test_show_unknown_game_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    gg(temp.path())
        .args(["-c", config.to_str().unwrap(), "show", "nosuchgame"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Game not found"));
}
