//! Integration tests for the Patchlang CLI.
//!
//! These tests build throwaway projects in temporary directories, invoke
//! the `patchlang` binary as a subprocess, and check exit codes, stdout,
//! and stderr.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[allow(deprecated)]
fn patchlang() -> Command {
    Command::cargo_bin("patchlang").unwrap()
}

/// A project directory holding `scripts/<name>.patch` for each entry.
fn project(scripts: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("scripts")).unwrap();
    for (name, text) in scripts {
        fs::write(dir.path().join("scripts").join(format!("{name}.patch")), text).unwrap();
    }
    dir
}

fn path(dir: &TempDir) -> &str {
    dir.path().to_str().unwrap()
}

// ---- No-args / help ----

#[test]
fn no_args_prints_usage_and_exits_1() {
    patchlang()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage: patchlang"));
}

#[test]
fn help_flag_exits_0() {
    patchlang()
        .arg("--help")
        .assert()
        .success()
        .stderr(predicate::str::contains("Commands:"));
}

#[test]
fn unknown_command_exits_1() {
    patchlang()
        .arg("frobnicate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown command"));
}

// ---- Run ----

#[test]
fn run_prints_log_output() {
    let dir = project(&[("_root", "start\nlog (2 + 3 * 4)\nlog \"Hello World\"\nend\n")]);
    patchlang()
        .args(["run", path(&dir), "--frames", "1"])
        .assert()
        .success()
        .stdout("14\nHello World\n")
        .stderr(predicate::str::contains("ran 1 frame(s)"));
}

#[test]
fn run_uses_config_root_and_globals() {
    let dir = project(&[("title", "start\nlog lives _music\nend\n")]);
    fs::write(
        dir.path().join("patch.toml"),
        "root = \"title\"\nframes = 2\n[globals]\nlives = 3\n",
    )
    .unwrap();
    patchlang()
        .args(["run", path(&dir)])
        .assert()
        .success()
        .stdout("3 silence\n")
        .stderr(predicate::str::contains("ran 2 frame(s)"));
}

#[test]
fn config_globals_ignore_case() {
    let dir = project(&[("_root", "start\nlog lives\nend\n")]);
    fs::write(dir.path().join("patch.toml"), "[globals]\nLives = 3\n").unwrap();
    patchlang()
        .args(["run", path(&dir), "--frames", "1"])
        .assert()
        .success()
        .stdout("3\n")
        .stderr(predicate::str::contains("0 error(s)"));
}

#[test]
fn run_stops_at_stopall() {
    let dir = project(&[("_root", "start\nwait 2\nstopall\nend\n")]);
    patchlang()
        .args(["run", path(&dir), "--frames", "50"])
        .assert()
        .success()
        .stderr(predicate::str::contains("ran 3 frame(s)"))
        .stderr(predicate::str::contains("stopped"));
}

#[test]
fn runtime_errors_do_not_fail_the_run() {
    let dir = project(&[("_root", "start\nlog (1 / 0)\nend\nstart\nlog fine\nend\n")]);
    patchlang()
        .args(["run", path(&dir), "--frames", "1"])
        .assert()
        .success()
        .stdout("fine\n")
        .stderr(predicate::str::contains("division_by_zero"))
        .stderr(predicate::str::contains("1 error(s)"));
}

#[test]
fn load_error_exits_2() {
    let dir = project(&[("_root", "start\nif x\nlog x\nend\n")]);
    patchlang()
        .args(["run", path(&dir)])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn missing_root_script_exits_2() {
    let dir = project(&[]);
    patchlang()
        .args(["run", path(&dir)])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_instance_script_exits_2() {
    let dir = project(&[("_root", "start\nwait 1\ninstance ghost _self\nend\n")]);
    patchlang()
        .args(["run", path(&dir), "--frames", "5"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn missing_project_exits_1() {
    patchlang()
        .args(["run", "definitely/not/a/project"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn bad_frames_flag_exits_1() {
    let dir = project(&[("_root", "start\nend\n")]);
    patchlang()
        .args(["run", path(&dir), "--frames", "lots"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--frames"));
}

#[test]
fn bad_config_exits_1() {
    let dir = project(&[("_root", "start\nend\n")]);
    fs::write(dir.path().join("patch.toml"), "[globals.bad]\nx = 1\n").unwrap();
    patchlang()
        .args(["run", path(&dir)])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unsupported type"));
}

// ---- Compile ----

#[test]
fn compile_prints_transcript_and_statics() {
    let dir = project(&[("hello", "start\nsetvar x (a + 1)\nlog \"Hi There\"\nend\n")]);
    patchlang()
        .args(["compile", path(&dir), "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("script hello (5 instructions)"))
        .stdout(predicate::str::contains("eval _t0_ a 1 +"))
        .stdout(predicate::str::contains("'0 = \"Hi There\""));
}

#[test]
fn compile_shows_include_provenance() {
    let dir = project(&[
        ("lib", "log 1\n"),
        ("main", "start\ninclude lib\nend\n"),
    ]);
    patchlang()
        .args(["compile", path(&dir), "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains(">> include lib"));
}

#[test]
fn compile_load_error_exits_2() {
    let dir = project(&[("broken", "loop\nlog 1\nendloop\n")]);
    patchlang()
        .args(["compile", path(&dir), "broken"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn compile_requires_two_arguments() {
    patchlang()
        .args(["compile", "."])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage: patchlang compile"));
}
