//! CLI integration tests.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn cardex_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cardex"));
    cmd.env_remove("CARDEX_LOG");
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    cardex_cmd()
        .args(["--registry", dir.to_str().unwrap()])
        .args(args)
        .output()
        .expect("run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn setup_registry() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let output = run(&dir.path().join("registry"), &["init"]);
    assert!(output.status.success(), "{}", stderr(&output));
    dir
}

fn registry_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("registry")
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write");
    path.display().to_string()
}

/// Register a data card and return its uid.
fn register_data(dir: &TempDir, extra: &[&str]) -> String {
    let artifact = write_file(dir, "transactions.csv", b"a,b\n1,2\n");
    let mut args = vec![
        "card",
        "register",
        "data",
        "transactions",
        "-r",
        "risk",
        "-c",
        "ml@example.com",
        "-a",
        artifact.as_str(),
    ];
    args.extend_from_slice(extra);
    let output = run(&registry_path(dir), &args);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    out.trim_end()
        .rsplit('(')
        .next()
        .and_then(|s| s.strip_suffix(')'))
        .expect("uid in output")
        .to_string()
}

#[test]
fn test_cli_init() {
    let dir = TempDir::new().expect("temp dir");
    let output = run(dir.path(), &["init"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Registry initialized"));
    assert!(dir.path().join("registry.db").exists());
}

#[test]
fn test_cli_requires_init() {
    let dir = TempDir::new().expect("temp dir");
    let output = run(&dir.path().join("missing"), &["stats"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("registry not initialized"));
}

#[test]
fn test_cli_stats_empty() {
    let dir = setup_registry();
    let output = run(&registry_path(&dir), &["stats"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("data:     0"));
    assert!(out.contains("model:    0"));
}

#[test]
fn test_cli_register_and_get() {
    let dir = setup_registry();
    let uid = register_data(&dir, &["-t", "team=fraud"]);
    assert_eq!(uid.len(), 32);

    let output = run(&registry_path(&dir), &["card", "get", "data", "--uid", &uid]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Card: data/risk/transactions:1.0.0"));
    assert!(out.contains("team: fraud"));

    let output = run(
        &registry_path(&dir),
        &["card", "get", "data", "-n", "transactions", "-r", "risk", "--json"],
    );
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json");
    assert_eq!(json["uid"], uid.as_str());
    assert_eq!(json["version"], "1.0.0");
}

#[test]
fn test_cli_versions_and_list() {
    let dir = setup_registry();
    register_data(&dir, &[]);
    register_data(&dir, &[]);
    register_data(&dir, &["-i", "patch", "--build-tag", "git.abc123"]);

    let output = run(
        &registry_path(&dir),
        &["card", "versions", "data", "transactions", "-r", "risk"],
    );
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("  1.1.1+git.abc123\n  1.1.0\n  1.0.0\n"), "{out}");

    let output = run(&registry_path(&dir), &["card", "list", "data", "-v", "~1.1.0"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).lines().count(), 2);

    let output = run(&registry_path(&dir), &["card", "list", "data", "-v", "^~1"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("validation error"));
}

#[test]
fn test_cli_prerelease_flow() {
    let dir = setup_registry();
    register_data(&dir, &["-v", "1.0.0", "-i", "pre"]);
    register_data(&dir, &["-v", "1.0.0", "-i", "pre"]);
    register_data(&dir, &[]);

    let output = run(
        &registry_path(&dir),
        &["card", "versions", "data", "transactions", "-r", "risk"],
    );
    let out = stdout(&output);
    assert!(out.contains("  1.0.0\n  1.0.0-rc.2\n  1.0.0-rc.1\n"), "{out}");

    let artifact = write_file(&dir, "again.csv", b"x");
    let output = run(
        &registry_path(&dir),
        &[
            "card", "register", "data", "transactions", "-r", "risk", "-c", "ml@example.com",
            "-v", "1.0.0", "-a", &artifact,
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Version combination already exists"));
}

#[test]
fn test_cli_update_download_delete() {
    let dir = setup_registry();
    let uid = register_data(&dir, &[]);

    let schema = write_file(&dir, "schema.json", b"{}");
    let output = run(
        &registry_path(&dir),
        &["card", "update", "data", &uid, "-c", "new@example.com", "-a", &schema],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let out_dir = dir.path().join("out");
    let output = run(
        &registry_path(&dir),
        &["card", "download", "data", "--uid", &uid, "-o", out_dir.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(std::fs::read(out_dir.join("transactions.csv")).unwrap(), b"a,b\n1,2\n");
    assert_eq!(std::fs::read(out_dir.join("schema.json")).unwrap(), b"{}");

    let output = run(&registry_path(&dir), &["card", "delete", "data", &uid]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Deleted data/risk/transactions:1.0.0"));

    let output = run(&registry_path(&dir), &["card", "get", "data", "--uid", &uid]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
}

#[test]
fn test_cli_model_requires_known_datacard() {
    let dir = setup_registry();
    let output = run(
        &registry_path(&dir),
        &[
            "card",
            "register",
            "model",
            "fraud",
            "-r",
            "risk",
            "-c",
            "ml@example.com",
            "--details",
            r#"{"datacard_uid": "does-not-exist"}"#,
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown data card"));
}
