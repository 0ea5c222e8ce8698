//! Command-line tests for the `stockchat` binary.
//!
//! Only offline commands are exercised here; anything that needs a chat
//! server lives in `chat_session_integration.rs`.

use assert_cmd::Command;
use predicates::prelude::*;

mod common;

const ENV_VARS: &[&str] = &[
    "STOCKCHAT_PAGE_URL",
    "STOCKCHAT_WS_PATH",
    "STOCKCHAT_MAX_RECONNECT_ATTEMPTS",
    "STOCKCHAT_RECONNECT_DELAY_MS",
    "STOCKCHAT_HISTORY_LIMIT",
    "STOCKCHAT_SHOW_THOUGHTS",
    "STOCKCHAT_SYMBOL",
    "STOCKCHAT_MODEL",
];

fn stockchat() -> Command {
    let mut cmd = Command::cargo_bin("stockchat").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    stockchat()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("endpoint"));
}

#[test]
fn test_endpoint_for_tunnel_page_resumes_session() {
    let (_temp_dir, config_path) = common::temp_config_file("{}\n");
    stockchat()
        .arg("--config")
        .arg(config_path)
        .args([
            "endpoint",
            "--page-url",
            "https://demo.ngrok-free.app",
            "--session",
            "abc",
        ])
        .assert()
        .success()
        .stdout("wss://demo.ngrok-free.app/ws/stock-chat/abc/\n");
}

#[test]
fn test_endpoint_fresh_session_carries_symbol_and_model() {
    let config = r#"
server:
  page_url: "http://localhost:8000/dashboard"
chat:
  symbol: "NVDA"
"#;
    let (_temp_dir, config_path) = common::temp_config_file(config);
    stockchat()
        .arg("--config")
        .arg(config_path)
        .args(["endpoint", "--model", "gpt-4o"])
        .assert()
        .success()
        .stdout("ws://localhost:8000/ws/stock-chat/?symbol=NVDA&model=gpt-4o\n");
}

#[test]
fn test_env_overrides_file_and_flag_overrides_env() {
    let config = r#"
server:
  page_url: "http://from-file:8000"
"#;
    let (_temp_dir, config_path) = common::temp_config_file(config);

    stockchat()
        .env("STOCKCHAT_PAGE_URL", "https://from-env.example.com")
        .arg("--config")
        .arg(&config_path)
        .arg("endpoint")
        .assert()
        .success()
        .stdout("wss://from-env.example.com/ws/stock-chat/\n");

    stockchat()
        .env("STOCKCHAT_PAGE_URL", "https://from-env.example.com")
        .arg("--config")
        .arg(&config_path)
        .args(["endpoint", "--page-url", "http://from-flag:9000"])
        .assert()
        .success()
        .stdout("ws://from-flag:9000/ws/stock-chat/\n");
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = r#"
server:
  page_url: "ftp://files.example.com"
"#;
    let (_temp_dir, config_path) = common::temp_config_file(config);
    stockchat()
        .arg("--config")
        .arg(config_path)
        .arg("endpoint")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ftp"));
}

#[test]
fn test_malformed_yaml_is_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file("server: [unclosed\n");
    stockchat()
        .arg("--config")
        .arg(config_path)
        .arg("endpoint")
        .assert()
        .failure();
}

#[test]
fn test_history_requires_session() {
    stockchat()
        .arg("history")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--session"));
}

#[test]
fn test_ask_reports_unreachable_server() {
    let (_temp_dir, config_path) = common::temp_config_file("{}\n");
    stockchat()
        .arg("--config")
        .arg(config_path)
        .args(["ask", "Is AAPL overbought?", "--page-url", "http://127.0.0.1:9"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure();
}
