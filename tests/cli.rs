use assert_cmd::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const DOCUMENT: &str = r#"
body:
  - tag: form
    id: checkout
    children:
      - tag: button
        id: save-btn
        text: Save
        attributes:
          data-testid: save
mutations:
  - after_ms: 100
    op: append
    parent: body
    element:
      tag: div
      class: toast
      text: Saved
"#;

const STABLE_SET: &str = r#"
primary: { kind: test-id, value: save }
fallbacks:
  - { kind: identifier, value: save-btn }
textMatch: { exactText: Save }
"#;

const POSITIONAL_SET: &str = r#"
primary: { kind: path-query, value: "div > div:nth-child(3) > span" }
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    /// A config path that does not exist, so defaults apply.
    fn config(&self) -> PathBuf {
        self.dir.path().join("config.yaml")
    }

    fn command(&self) -> Command {
        let bin = assert_cmd::cargo::cargo_bin!("waypoint");
        let mut cmd = Command::new(bin);
        cmd.env_remove("RUST_LOG")
            .env_remove("WAYPOINT_MAX_RETRIES")
            .env_remove("WAYPOINT_RETRY_INTERVAL_MS")
            .env_remove("WAYPOINT_MUTATION_TIMEOUT_MS")
            .env_remove("WAYPOINT_PUBLISH_THRESHOLD")
            .arg("--config")
            .arg(self.config());
        cmd
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(&stdout).expect("valid json on stdout")
}

#[test]
fn resolve_reports_the_primary_match_as_json() {
    let ws = Workspace::new();
    let document = ws.file("document.yaml", DOCUMENT);
    let selectors = ws.file("set.yaml", STABLE_SET);

    let assert = ws
        .command()
        .args(["--output", "json", "resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors)])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["succeeded"], Value::Bool(true));
    assert_eq!(value["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(value["attempts"][0]["strategy"], "primary");
    assert_eq!(value["selectorUsed"]["layer"], "descriptor");
    assert_eq!(value["selectorUsed"]["selector"]["kind"], "test-id");
}

#[test]
fn resolve_waits_for_a_scripted_insertion() {
    let ws = Workspace::new();
    let document = ws.file("document.yaml", DOCUMENT);
    let selectors = ws.file("set.yaml", "primary: { kind: class, value: toast }\n");

    let assert = ws
        .command()
        .args(["-o", "json", "resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors), "--timeout-ms", "2000"])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["succeeded"], Value::Bool(true));
    assert_eq!(value["settledBy"], "mutation");
    let attempts = value["attempts"].as_array().unwrap();
    assert_eq!(attempts.last().unwrap()["strategy"], "wait-retry");
}

#[test]
fn resolve_exits_non_zero_when_nothing_matches() {
    let ws = Workspace::new();
    let document = ws.file("document.yaml", DOCUMENT);
    let selectors = ws.file("set.yaml", "primary: { kind: identifier, value: missing }\n");

    let assert = ws
        .command()
        .args(["-o", "json", "resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors)])
        .args(["--timeout-ms", "150", "--retry-interval-ms", "50"])
        .assert()
        .failure();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["succeeded"], Value::Bool(false));
    assert_eq!(value["settledBy"], "timeout");
    assert_eq!(value["timedOut"], Value::Bool(true));
    assert!(!value["suggestions"].as_array().unwrap().is_empty());
}

#[test]
fn resolve_honours_the_scope_flag() {
    let ws = Workspace::new();
    let document = ws.file(
        "document.yaml",
        "body:\n  - tag: button\n    text: Save\n  - tag: section\n    id: dialog\n",
    );
    let selectors = ws.file(
        "set.yaml",
        "primary: { kind: identifier, value: absent }\ntextMatch: { exactText: Save }\n",
    );

    ws.command()
        .args(["-o", "json", "resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors), "--scope", "#dialog"])
        .args(["--timeout-ms", "100", "--retry-interval-ms", "50"])
        .assert()
        .failure();

    ws.command()
        .args(["-o", "json", "resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors)])
        .assert()
        .success();

    let assert = ws
        .command()
        .args(["resolve", "--document", arg(&document)])
        .args(["--selectors", arg(&selectors), "--scope", "#ghost"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("scope '#ghost' matched nothing"), "{stderr}");
}

#[test]
fn validate_blocks_positional_paths() {
    let ws = Workspace::new();
    let selectors = ws.file("set.yaml", POSITIONAL_SET);

    let assert = ws
        .command()
        .args(["-o", "json", "validate", "--selectors", arg(&selectors)])
        .assert()
        .failure();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["publishable"], Value::Bool(false));
    let codes: Vec<&str> = value["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["code"].as_str())
        .collect();
    assert!(codes.contains(&"positional-path"), "codes: {:?}", codes);
}

#[test]
fn validate_publishes_layered_sets() {
    let ws = Workspace::new();
    let selectors = ws.file("set.yaml", STABLE_SET);

    ws.command()
        .args(["validate", "--selectors", arg(&selectors), "--threshold", "0.9"])
        .assert()
        .success();
}

#[test]
fn score_prints_layers_and_tier() {
    let ws = Workspace::new();
    let selectors = ws.file("set.yaml", STABLE_SET);

    let assert = ws
        .command()
        .args(["score", "--selectors", arg(&selectors)])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("primary"));
    assert!(stdout.contains("fallback[0]"));
    assert!(stdout.contains("text-match"));
    assert!(stdout.contains("(excellent)"), "{}", stdout);
}

#[test]
fn config_show_applies_environment_overrides() {
    let ws = Workspace::new();
    ws.file("config.yaml", "wait:\n  retryIntervalMs: 250\n");

    let assert = ws
        .command()
        .env("WAYPOINT_MAX_RETRIES", "3")
        .args(["-o", "json", "config", "show"])
        .assert()
        .success();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["wait"]["maxRetries"], 3);
    assert_eq!(value["wait"]["retryIntervalMs"], 250);
    assert_eq!(value["wait"]["mutationTimeoutMs"], 5000);
}

#[test]
fn invalid_configuration_is_rejected() {
    let ws = Workspace::new();
    ws.file("config.yaml", "publish_threshold: 2.0\n");

    ws.command().args(["config", "validate"]).assert().failure();
}

#[test]
fn diagnose_reports_each_step() {
    let ws = Workspace::new();
    let document = ws.file("document.yaml", DOCUMENT);
    let steps = ws.file(
        "steps.yaml",
        r#"
- name: save button
  selectors:
    primary: { kind: test-id, value: save }
- name: missing banner
  selectors:
    primary: { kind: identifier, value: banner }
  wait: { mutationTimeoutMs: 100, retryIntervalMs: 20 }
"#,
    );

    let assert = ws
        .command()
        .args(["-o", "json", "diagnose", "--document", arg(&document)])
        .args(["--steps", arg(&steps)])
        .assert()
        .failure();

    let value = stdout_json(assert.get_output());
    assert_eq!(value["passed"], 1);
    assert_eq!(value["failed"], 1);
    assert_eq!(value["steps"][0]["strategy"], "primary");
    assert_eq!(value["steps"][1]["passed"], Value::Bool(false));
}
