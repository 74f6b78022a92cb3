//! Integration tests for patchwire-cli.
//!
//! Each test runs the `patchwire` binary built by cargo.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn patchwire_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_patchwire"))
}

fn stdout_of(args: &[&str]) -> String {
    let output = patchwire_bin()
        .args(args)
        .output()
        .expect("failed to run patchwire");
    assert!(
        output.status.success(),
        "patchwire {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// `patchwire units`
// ---------------------------------------------------------------------------

#[test]
fn cli_units_lists_every_kind() {
    let stdout = stdout_of(&["units"]);
    assert!(stdout.contains("Unit Kinds"));
    for kind in ["envelope", "scanner", "follower"] {
        assert!(stdout.contains(kind), "listing should contain '{kind}'");
    }
}

#[test]
fn cli_units_detail_shows_targets() {
    let stdout = stdout_of(&["units", "scanner"]);
    assert!(stdout.contains("Parameters"));
    assert!(stdout.contains("rate"));
    assert!(stdout.contains("Virtual targets: position"));
}

// ---------------------------------------------------------------------------
// `patchwire init` / `check` / `routes`
// ---------------------------------------------------------------------------

#[test]
fn cli_init_then_check() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("decls").join("lead.toml");
    let path_str = path.to_str().unwrap();

    stdout_of(&["init", "envelope", "--name", "lead", "--output", path_str]);
    assert!(path.exists());

    let stdout = stdout_of(&["check", path_str]);
    assert!(stdout.contains("lead: ok"));
    assert!(stdout.contains("kind:        envelope"));

    // refuses to overwrite without --force
    let output = patchwire_bin()
        .args(["init", "envelope", "--output", path_str])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn cli_check_reports_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
name = "bad"
kind = "envelope"

[[inputs]]
name = "main"
channels = ["gate", "volts"]

[[bindings]]
param = "cutoff"
bus = 0
channel = 1
"#,
    )
    .unwrap();

    let output = patchwire_bin()
        .args(["check", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown channel 'volts'"), "{stderr}");
    assert!(stderr.contains("unknown parameter 'cutoff'"), "{stderr}");
}

#[test]
fn cli_routes_shows_virtual_target() {
    let stdout = stdout_of(&["routes", "scanner"]);
    assert!(stdout.contains("Routes"));
    assert!(stdout.contains("position"));
    assert!(stdout.contains("virtual"));
    assert!(stdout.contains("mod:0"));
}

// ---------------------------------------------------------------------------
// `patchwire render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_envelope() {
    let stdout = stdout_of(&["render", "envelope", "--blocks", "20", "--every", "0"]);
    assert!(stdout.contains("Rendered 20 blocks of 256 frames"));
    assert!(stdout.contains("out[0]"));
}

#[test]
fn cli_render_scanner_with_drag_and_state() {
    let temp_dir = TempDir::new().unwrap();
    let state = temp_dir.path().join("state").join("patch.toml");
    let state_str = state.to_str().unwrap();

    let stdout = stdout_of(&[
        "render", "scanner", "--blocks", "30", "--drag", "0.5", "--sync", "eighth", "--state",
        state_str,
    ]);
    assert!(stdout.contains("Rendered 30 blocks"));
    assert!(stdout.contains("State saved"));

    let saved = fs::read_to_string(&state).unwrap();
    assert!(saved.contains("[scanner]"), "{saved}");
    assert!(saved.contains("sync = \"eighth\""), "{saved}");

    // second run restores and re-saves
    stdout_of(&["render", "scanner", "--blocks", "5", "--state", state_str]);
    let saved = fs::read_to_string(&state).unwrap();
    assert!(saved.contains("sync = \"eighth\""), "{saved}");
}

#[test]
fn cli_render_follower() {
    let stdout = stdout_of(&[
        "render",
        "follower",
        "--blocks",
        "20",
        "--block-size",
        "64",
        "--every",
        "0",
    ]);
    assert!(stdout.contains("Rendered 20 blocks of 64 frames"));
    assert!(stdout.contains("telemetry"));
}

#[test]
fn cli_render_rejects_bad_input_channel() {
    let output = patchwire_bin()
        .args(["render", "envelope", "--cv", "9=0.5"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
