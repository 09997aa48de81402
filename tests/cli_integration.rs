// CLI integration tests for the serve/completion commands.
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_uast-gateway");
    Command::new(exe)
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn serve_with_tls_backend_exits_with_usage_error() {
    let output = cmd()
        .args(["serve", "--backend", "https://backend:9432"])
        .output()
        .expect("serve");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .starts_with("invalid --backend")
    );
    assert!(err["error"]["hint"].is_string());
}

#[test]
fn serve_with_invalid_bind_exits_with_usage_error() {
    let output = cmd()
        .args(["serve", "--bind", "not-an-address"])
        .output()
        .expect("serve");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["message"], "invalid bind address");
}

#[test]
fn unknown_flag_is_reported_as_json() {
    let output = cmd()
        .args(["serve", "--no-such-flag"])
        .output()
        .expect("serve");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}

#[test]
fn completion_script_mentions_binary() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("uast-gateway"));
}

#[test]
fn no_arguments_prints_help_and_exits_two() {
    let output = cmd().output().expect("help");
    assert_eq!(output.status.code(), Some(2));
}
