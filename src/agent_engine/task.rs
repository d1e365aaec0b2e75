/// Runs the steps of a task in order, verifying and retrying where an
/// expected end-state image is available.
use serde::Serialize;

use crate::agent_engine::engine::StepRunner;
use crate::agent_engine::state::StepReport;
use crate::agent_engine::verifier::{ResultVerifier, VerificationResult};
use crate::config::{StepConfig, TaskConfig};
use crate::errors::GroundError;
use crate::perception::screenshot::capture;
use crate::perception::types::EncodedImage;

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Report of the last attempt.
    pub report: StepReport,
    pub attempts: u32,
    /// `None` when the step had nothing to verify against.
    pub verification: Option<VerificationResult>,
}

impl StepResult {
    pub fn verified(&self) -> Option<bool> {
        self.verification.as_ref().map(|v| v.finished)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskReport {
    pub steps: Vec<StepResult>,
}

impl TaskReport {
    /// Steps whose verification came back negative.
    pub fn unverified(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.verified() == Some(false))
    }
}

pub struct TaskDriver {
    runner: StepRunner,
    verifier: Option<ResultVerifier>,
    verify_retries: u32,
}

impl TaskDriver {
    pub fn new(runner: StepRunner, verifier: Option<ResultVerifier>, verify_retries: u32) -> Self {
        Self {
            runner,
            verifier,
            verify_retries,
        }
    }

    /// Every step gets a fresh Step State. A step that fails verification is re-run
    /// up to `verify_retries` times; the task then moves on regardless.
    pub async fn run(&self, task: &TaskConfig) -> TaskReport {
        let mut report = TaskReport::default();
        let total = task.steps.len();

        for (idx, step) in task.steps.iter().enumerate() {
            let number = idx + 1;
            let expected = self.load_expected(step);
            let description = describe(task, step, number == total);

            let mut attempts = 0;
            let (last, verification) = loop {
                attempts += 1;
                let last = self.runner.run_step(number, &step.instruction).await;

                let Some(expected) = expected.as_ref() else {
                    break (last, None);
                };
                let verdict = self.verify(&description, expected).await;
                let finished = verdict.finished;
                if finished || attempts > self.verify_retries {
                    if !finished {
                        tracing::warn!(step = number, attempts, "step still unverified, moving on");
                    }
                    break (last, Some(verdict));
                }
                tracing::info!(step = number, attempt = attempts, rationale = %verdict.rationale, "verification failed, retrying step");
                // The rejected attempt's scripts must not reach replay or integration.
                if let Err(e) = self.runner.artifacts().clear_step(number) {
                    tracing::warn!(step = number, error = %e, "failed to clear artifacts of rejected attempt");
                }
            };

            report.steps.push(StepResult {
                report: last,
                attempts,
                verification,
            });
        }
        report
    }

    fn load_expected(&self, step: &StepConfig) -> Option<EncodedImage> {
        let path = step.expected_image.as_ref()?;
        self.verifier.as_ref()?;
        let loaded = std::fs::read(path)
            .map_err(GroundError::from)
            .and_then(EncodedImage::from_bytes);
        match loaded {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot load expected image, step will not be verified");
                None
            }
        }
    }

    /// Fails closed: any error during verification counts as "not finished".
    async fn verify(&self, description: &str, expected: &EncodedImage) -> VerificationResult {
        let Some(verifier) = &self.verifier else {
            return VerificationResult {
                rationale: "no verifier configured".into(),
                finished: false,
            };
        };
        let current = match capture(self.runner.surface(), &self.runner.settings().capture).await {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(error = %e, "capture for verification failed");
                return VerificationResult {
                    rationale: e.to_string(),
                    finished: false,
                };
            }
        };
        match verifier.verify(description, expected, &current).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "verification call failed");
                VerificationResult {
                    rationale: e.to_string(),
                    finished: false,
                }
            }
        }
    }
}

/// Verification text: the step's own, the task's for the last step, else the instruction.
fn describe(task: &TaskConfig, step: &StepConfig, is_last: bool) -> String {
    if let Some(d) = &step.expected_description {
        return d.clone();
    }
    if is_last && !task.description.is_empty() {
        return task.description.clone();
    }
    step.instruction.clone()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent_engine::engine::RunnerSettings;
    use crate::agent_engine::mock::{MemorySurface, RecordingExecutor, ScriptedModel};
    use crate::agent_engine::state::StepOutcome;
    use crate::executor::artifacts::ArtifactStore;
    use crate::perception::types::solid_png;

    fn step(instruction: &str, expected: Option<std::path::PathBuf>) -> StepConfig {
        StepConfig {
            instruction: instruction.into(),
            expected_image: expected,
            expected_description: None,
        }
    }

    fn driver(grounding: &Arc<ScriptedModel>, verifier: Option<&Arc<ScriptedModel>>, retries: u32) -> TaskDriver {
        let runner = StepRunner::new(
            grounding.client(),
            Arc::new(MemorySurface::new(280, 280)),
            Arc::new(RecordingExecutor::default()),
            ArtifactStore::disabled(),
            RunnerSettings {
                settle_delay: Duration::ZERO,
                wait_delay: Duration::ZERO,
                ..RunnerSettings::default()
            },
        );
        TaskDriver::new(runner, verifier.map(|v| ResultVerifier::new(v.client())), retries)
    }

    #[tokio::test]
    async fn failed_verification_reruns_the_step_once() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, solid_png(16, 16)).unwrap();

        let grounding = ScriptedModel::new([
            "Action: finished(content='typed')",
            "Action: finished(content='typed again')",
            "Action: finished(content='clicked')",
        ]);
        let verifier = ScriptedModel::new([
            "Thought: field is empty\nAction: finished(content='false')",
            "Thought: value present\nAction: finished(content='true')",
        ]);
        let task = TaskConfig {
            description: "Search the member".into(),
            steps: vec![step("type the id", Some(expected)), step("click search", None)],
        };

        let report = driver(&grounding, Some(&verifier), 1).run(&task).await;
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[0].attempts, 2);
        assert_eq!(report.steps[0].verified(), Some(true));
        assert_eq!(
            report.steps[0].report.outcome,
            StepOutcome::Finished { content: "typed again".into() }
        );
        assert_eq!(report.steps[1].attempts, 1);
        assert_eq!(report.steps[1].verified(), None);
        assert_eq!(report.unverified().count(), 0);
        assert_eq!(verifier.requests().len(), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded_and_task_moves_on() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, solid_png(16, 16)).unwrap();

        let grounding = ScriptedModel::new([
            "Action: finished(content='1')",
            "Action: finished(content='2')",
            "Action: finished(content='3')",
        ]);
        // Ambiguous replies fail closed.
        let verifier = ScriptedModel::new(["looks fine to me", "probably"]);
        let task = TaskConfig {
            description: String::new(),
            steps: vec![step("one", Some(expected)), step("two", None)],
        };

        let report = driver(&grounding, Some(&verifier), 1).run(&task).await;
        assert_eq!(report.steps[0].attempts, 2);
        assert_eq!(report.steps[0].verified(), Some(false));
        assert_eq!(report.unverified().count(), 1);
        assert!(matches!(report.steps[1].report.outcome, StepOutcome::Finished { ref content } if content == "3"));
    }

    #[tokio::test]
    async fn retried_step_leaves_only_the_accepted_attempt_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("expected.png");
        std::fs::write(&expected, solid_png(16, 16)).unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));

        let grounding = ScriptedModel::new([
            "Thought: next field\nAction: hotkey(key='tab')",
            "Thought: close popup\nAction: hotkey(key='esc')",
            "Action: finished(content='tried')",
            "Thought: submit\nAction: hotkey(key='enter')",
            "Action: finished(content='submitted')",
        ]);
        let verifier = ScriptedModel::new([
            "Thought: form not sent\nAction: finished(content='false')",
            "Thought: results shown\nAction: finished(content='true')",
        ]);
        let runner = StepRunner::new(
            grounding.client(),
            Arc::new(MemorySurface::new(280, 280)),
            Arc::new(RecordingExecutor::default()),
            store.clone(),
            RunnerSettings {
                settle_delay: Duration::ZERO,
                wait_delay: Duration::ZERO,
                ..RunnerSettings::default()
            },
        );
        let driver = TaskDriver::new(runner, Some(ResultVerifier::new(verifier.client())), 1);
        let task = TaskConfig {
            description: String::new(),
            steps: vec![step("submit the form", Some(expected))],
        };

        let report = driver.run(&task).await;
        assert_eq!(report.steps[0].attempts, 2);
        assert_eq!(report.steps[0].verified(), Some(true));

        let scripts = store.list_scripts().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].ends_with("automation_step_1_1.py"));
        let text = std::fs::read_to_string(&scripts[0]).unwrap();
        assert!(text.contains("pyautogui.press('enter')"));
        assert!(!store.screenshot_dir().join("automation_step_1_2.png").exists());
    }

    #[test]
    fn last_step_uses_task_description() {
        let task = TaskConfig {
            description: "whole task".into(),
            steps: vec![step("a", None), step("b", None)],
        };
        assert_eq!(describe(&task, &task.steps[0], false), "a");
        assert_eq!(describe(&task, &task.steps[1], true), "whole task");
    }
}
