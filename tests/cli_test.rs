//! CLI and daemon integration tests.
//!
//! Run the built `cadence` binary: help and version output, delivery of
//! stdin records to stdout, and shutdown on SIGTERM.

use std::process::{Command, Stdio};
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_cadence");

#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for option in ["--backend", "--redis-url", "--key-prefix", "--log-level", "--poll-interval-ms"] {
        assert!(stdout.contains(option), "help should mention {option}: {stdout}");
    }
}

#[test]
fn test_cli_version_output() {
    let output = Command::new(BIN)
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {}",
        stdout
    );
}

#[test]
fn test_cli_rejects_unknown_backend() {
    let output = Command::new(BIN)
        .args(["--backend", "sqs"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sqs"), "error should name the bad value: {stderr}");
}

#[tokio::test]
async fn test_delivers_stdin_records_to_stdout() {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command as TokioCommand;

    let mut child = TokioCommand::new(BIN)
        .args(["--backend", "memory", "--log-level", "warn"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn daemon");

    let mut stdin = child.stdin.take().expect("no stdin");
    stdin
        .write_all(
            b"{\"notifier\":\"ops\",\"channel\":\"mail\",\"min_interval_ms\":20,\"payload\":{\"n\":1}}\n\
              this line is not json\n\
              {\"notifier\":\"ops\",\"channel\":\"mail\",\"payload\":{\"n\":2}}\n",
        )
        .await
        .expect("failed to write input");
    drop(stdin);

    let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("daemon did not exit after stdin closed")
        .expect("failed to wait for daemon");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is not json"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["notifier"], "ops");
    assert_eq!(lines[0]["payload"]["n"], 1);
    assert_eq!(lines[1]["payload"]["n"], 2);
}

#[tokio::test]
async fn test_drains_spaced_channel_before_exit() {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command as TokioCommand;

    let mut child = TokioCommand::new(BIN)
        .args(["--backend", "memory", "--log-level", "warn"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn daemon");

    let mut input = String::new();
    for n in 1..=6 {
        input.push_str(&format!(
            "{{\"notifier\":\"billing\",\"channel\":\"sms\",\"min_interval_ms\":30,\"max_concurrent\":2,\"payload\":{{\"n\":{n}}}}}\n"
        ));
    }
    let mut stdin = child.stdin.take().expect("no stdin");
    stdin.write_all(input.as_bytes()).await.expect("failed to write input");
    drop(stdin);

    let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("daemon did not exit after stdin closed")
        .expect("failed to wait for daemon");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut delivered: Vec<u64> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("stdout line is not json");
            value["payload"]["n"].as_u64().expect("payload without n")
        })
        .collect();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![1, 2, 3, 4, 5, 6]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_graceful_shutdown_on_sigterm() {
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    // stdin stays open, so only the signal can stop the daemon
    let mut child = TokioCommand::new(BIN)
        .args(["--backend", "memory"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn daemon");

    tokio::time::sleep(Duration::from_millis(500)).await;

    let pid = child.id().expect("no pid");
    let _ = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    match timeout(Duration::from_secs(5), child.wait()).await {
        Ok(Ok(status)) => assert!(status.success(), "daemon exited with {status}"),
        Ok(Err(e)) => panic!("failed to wait for child: {}", e),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("daemon did not respond to SIGTERM within timeout");
        }
    }
}
