use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use assert_cmd::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("steer.toml");
    fs::write(&path, body).unwrap();
    path
}

fn steer() -> Command {
    Command::cargo_bin("steer").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["-b", "sim", "self-check"], 0, "ok: state=switch on disabled", "stdout")]
#[case(&["-b", "sim", "state"], 0, "status word: 0x", "stdout")]
#[case(&["-b", "sim", "store-config"], 0, "drive parameters stored", "stdout")]
#[case(&["-b", "sim", "restore-config"], 0, "drive defaults restored", "stdout")]
#[case(&["-b", "sim"], 2, "Usage:", "stderr")]
#[case(&["-b", "sim", "--node-id", "0", "state"], 1, "node_id", "stderr")]
#[case(&["self-check"], 6, "could not be reached", "stderr")]
#[case(&["-b", "socketcan", "-c", "can1", "state"], 6, "can1", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let assert = steer().args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn calibrate_reports_range_after_enter() {
    steer()
        .args(["-b", "sim", "calibrate"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrated: min="))
        .stdout(predicate::str::contains("failures=0"));
}

#[test]
fn calibrate_json_is_one_object() {
    let out = steer()
        .args(["--json", "-b", "sim", "calibrate"])
        .write_stdin("\n")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(v["event"], "calibrated");
    assert!(v["min"].as_i64().unwrap() <= v["max"].as_i64().unwrap());
    assert!(v["samples"].as_u64().unwrap() >= 1);
}

#[test]
fn steer_rejects_out_of_range_angle_and_keeps_going() {
    steer()
        .args(["-b", "sim", "steer", "--angles"])
        .write_stdin("\n90\nleft\n\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("outside the allowed"))
        .stderr(predicate::str::contains("not a number: 'left'"));
}

#[test]
fn steer_ends_on_eof() {
    steer()
        .args(["-b", "sim", "steer"])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrated:"));
}

#[test]
fn state_json_reports_state_name() {
    let out = steer()
        .args(["--json", "-b", "sim", "state"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_str(String::from_utf8(out.stdout).unwrap().trim()).unwrap();
    assert_eq!(v["state"], "switch on disabled");
    assert_eq!(v["op_mode"], "profile position");
}

#[test]
fn unreachable_drive_in_json_mode() {
    let out = steer().args(["--json", "state"]).output().unwrap();
    assert_eq!(out.status.code(), Some(6));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with('{') && l.contains("\"reason\""))
        .expect("json error line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "DeviceUnavailable");
}

#[test]
fn config_file_selects_sim_bus() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        r#"
[bus]
bustype = "sim"
node_id = 3

[state_machine]
table = "uniform"
"#,
    );
    steer()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok:"));
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[motion]\nmax_following_error = 0\n");
    steer()
        .arg("--config")
        .arg(&cfg)
        .args(["-b", "sim", "state"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_following_error"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempdir().unwrap();
    steer()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("state")
        .assert()
        .failure();
}

#[test]
fn log_file_is_written_when_configured() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("steer.log");
    let cfg = write_config(
        &dir,
        &format!(
            "[bus]\nbustype = \"sim\"\n\n[logging]\nfile = {:?}\nlevel = \"info\"\n",
            log.display().to_string()
        ),
    );
    steer()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success();
    assert!(log.exists());
}
