pub mod artifacts;
pub mod local;
pub mod replay;
pub mod safety;
pub mod sandbox;
pub mod text_input;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GroundResult;

/// What happened when a script ran on the destination surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` when the process was killed before reporting one.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (self.timed_out, self.exit_code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("exit code {code}"),
            (false, None) => "terminated without exit code".to_string(),
        }
    }
}

/// Runs compiled scripts against the destination surface.
///
/// Implementations must pass every script through [`safety::verify_script`]
/// before running it and must bound each run by a wall-clock timeout.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &str) -> GroundResult<ExecutionOutcome>;
}
