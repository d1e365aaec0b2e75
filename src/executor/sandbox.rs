// Runs scripts inside the sandboxed desktop through its command API.
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::errors::GroundResult;
use crate::executor::safety::verify_script;
use crate::executor::{ExecutionOutcome, ScriptExecutor};
use crate::sandbox::client::SandboxClient;

/// Exit status of coreutils `timeout` when the limit was hit.
const TIMEOUT_EXIT_CODE: i32 = 124;

static RC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__RC__(-?\d+)").expect("rc marker pattern is valid"));

pub struct SandboxExecutor {
    client: SandboxClient,
    interpreter: String,
    timeout: Duration,
    remote_dir: String,
}

impl SandboxExecutor {
    pub fn new(client: SandboxClient, interpreter: impl Into<String>, timeout: Duration, remote_dir: impl Into<String>) -> Self {
        Self {
            client,
            interpreter: interpreter.into(),
            timeout,
            remote_dir: remote_dir.into(),
        }
    }

    fn run_line(&self, path: &str) -> String {
        format!(
            "bash -lc 'timeout {}s {} {path}; rc=$?; pkill -f xclip || true; pkill -f xsel || true; rm -f {path}; echo __RC__$rc'",
            self.timeout.as_secs().max(1),
            self.interpreter,
        )
    }
}

/// Split the `__RC__<n>` marker off the command output.
fn take_exit_code(stdout: &str) -> (Option<i32>, String) {
    let code = RC_MARKER
        .captures_iter(stdout)
        .last()
        .and_then(|c| c[1].parse().ok());
    let cleaned = RC_MARKER.replace_all(stdout, "").trim_end().to_string();
    (code, cleaned)
}

#[async_trait]
impl ScriptExecutor for SandboxExecutor {
    async fn execute(&self, script: &str) -> GroundResult<ExecutionOutcome> {
        verify_script(script)?;
        let path = format!(
            "{}/groundloop_{}.py",
            self.remote_dir.trim_end_matches('/'),
            uuid::Uuid::new_v4().simple()
        );
        self.client.write_text(&path, script).await?;

        let output = match self.client.run_command(&self.run_line(&path)).await {
            Ok(o) => o,
            Err(e) => {
                if let Err(cleanup) = self.client.run_command(&format!("rm -f {path}")).await {
                    tracing::warn!(path = %path, error = %cleanup, "failed to remove remote script");
                }
                return Err(e);
            }
        };

        let (exit_code, stdout) = take_exit_code(&output.stdout);
        if exit_code.is_none() {
            tracing::warn!(return_code = output.return_code, "sandbox output has no exit marker");
        }
        Ok(ExecutionOutcome {
            exit_code: exit_code.or(Some(output.return_code)),
            stdout,
            stderr: output.stderr,
            timed_out: exit_code == Some(TIMEOUT_EXIT_CODE),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sandbox::client::fake::FakeTransport;

    #[test]
    fn marker_is_extracted() {
        assert_eq!(take_exit_code("hi\n__RC__0\n"), (Some(0), "hi".to_string()));
        assert_eq!(take_exit_code("__RC__124"), (Some(124), String::new()));
        assert_eq!(take_exit_code("nothing").0, None);
    }

    #[tokio::test]
    async fn writes_runs_and_cleans_up() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply("write_text", serde_json::json!({ "success": true }))
                .reply(
                    "run_command",
                    serde_json::json!({ "stdout": "__RC__124\n", "stderr": "", "return_code": 0 }),
                ),
        );
        let exec = SandboxExecutor::new(
            SandboxClient::new(transport.clone()),
            "python3",
            Duration::from_secs(15),
            "/tmp/",
        );

        let out = exec.execute("import pyautogui\npyautogui.press('enter')").await.unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, Some(124));

        let sent = transport.sent();
        assert_eq!(sent[0].0, "write_text");
        let path = sent[0].1["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("/tmp/groundloop_") && path.ends_with(".py"));
        let command = sent[1].1["command"].as_str().unwrap();
        assert!(command.contains(&format!("timeout 15s python3 {path}")));
        assert!(command.contains("pkill -f xclip"));
        assert!(command.contains(&format!("rm -f {path}")));
    }

    #[tokio::test]
    async fn done_sentinel_is_refused_before_upload() {
        let transport = Arc::new(FakeTransport::default());
        let exec = SandboxExecutor::new(SandboxClient::new(transport.clone()), "python3", Duration::from_secs(15), "/tmp");
        assert!(exec.execute("DONE").await.is_err());
        assert!(transport.sent().is_empty());
    }
}
