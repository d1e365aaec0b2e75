// Runs scripts with a local interpreter against the machine's own display.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{GroundError, GroundResult};
use crate::executor::safety::verify_script;
use crate::executor::{ExecutionOutcome, ScriptExecutor};

pub struct LocalExecutor {
    interpreter: String,
    timeout: Duration,
    script_dir: PathBuf,
}

impl LocalExecutor {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
            script_dir: std::env::temp_dir(),
        }
    }

    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }
}

/// Transient script file, removed when dropped.
struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    fn create(dir: &Path, content: &str) -> GroundResult<Self> {
        let path = dir.join(format!("groundloop_{}.py", uuid::Uuid::new_v4().simple()));
        std::fs::write(&path, content)?;
        Ok(Self { path })
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove script file");
        }
    }
}

#[async_trait]
impl ScriptExecutor for LocalExecutor {
    async fn execute(&self, script: &str) -> GroundResult<ExecutionOutcome> {
        verify_script(script)?;
        let file = ScriptFile::create(&self.script_dir, script)?;

        tracing::debug!(
            interpreter = %self.interpreter,
            path = %file.path.display(),
            timeout_secs = self.timeout.as_secs_f64(),
            "running script"
        );

        let child = tokio::process::Command::new(&self.interpreter)
            .arg(&file.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GroundError::Execution(format!("spawn {}: {e}", self.interpreter)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecutionOutcome {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(GroundError::Execution(format!("wait for script: {e}"))),
            // Dropping the future kills the child.
            Err(_) => Ok(ExecutionOutcome {
                exit_code: None,
                timed_out: true,
                ..ExecutionOutcome::default()
            }),
        }
    }
}
