// Re-executes saved step scripts in order, e.g. to reproduce a finished task.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::artifacts::ArtifactStore;
use crate::executor::{ExecutionOutcome, ScriptExecutor};
use crate::grounding::compiler::DONE_SENTINEL;
use crate::perception::traits::Surface;

#[derive(Debug, Clone, PartialEq)]
pub enum SnippetStatus {
    Executed(ExecutionOutcome),
    /// Holds the `DONE` sentinel rather than a script.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SnippetReport {
    pub path: PathBuf,
    pub status: SnippetStatus,
    pub screenshot: Option<PathBuf>,
}

pub struct Replayer<'a> {
    executor: &'a dyn ScriptExecutor,
    surface: Option<&'a dyn Surface>,
    store: &'a ArtifactStore,
    pause: Duration,
}

impl<'a> Replayer<'a> {
    pub fn new(executor: &'a dyn ScriptExecutor, store: &'a ArtifactStore) -> Self {
        Self {
            executor,
            surface: None,
            store,
            pause: Duration::from_millis(500),
        }
    }

    /// Save a screenshot of `surface` after every snippet.
    pub fn capture_with(mut self, surface: &'a dyn Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Run every file in order. A failing snippet is reported and the next one still runs.
    pub async fn run(&self, files: &[PathBuf]) -> Vec<SnippetReport> {
        let mut reports = Vec::with_capacity(files.len());
        for (idx, path) in files.iter().enumerate() {
            tracing::info!(snippet = idx + 1, total = files.len(), path = %path.display(), "replaying snippet");
            let status = self.run_one(path).await;
            match &status {
                SnippetStatus::Executed(out) if out.succeeded() => {
                    tracing::info!(path = %path.display(), "snippet completed")
                }
                SnippetStatus::Executed(out) => {
                    tracing::warn!(path = %path.display(), status = %out.describe(), stderr = %out.stderr, "snippet did not succeed")
                }
                SnippetStatus::Skipped => tracing::info!(path = %path.display(), "snippet holds DONE, skipped"),
                SnippetStatus::Failed(e) => tracing::warn!(path = %path.display(), error = %e, "snippet failed"),
            }

            let screenshot = match self.surface {
                Some(surface) if status != SnippetStatus::Skipped => self.snapshot(surface, path).await,
                _ => None,
            };
            reports.push(SnippetReport {
                path: path.clone(),
                status,
                screenshot,
            });

            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }
        reports
    }

    async fn run_one(&self, path: &Path) -> SnippetStatus {
        let code = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => return SnippetStatus::Failed(format!("read: {e}")),
        };
        if code.trim() == DONE_SENTINEL {
            return SnippetStatus::Skipped;
        }
        match self.executor.execute(&code).await {
            Ok(out) => SnippetStatus::Executed(out),
            Err(e) => SnippetStatus::Failed(e.to_string()),
        }
    }

    async fn snapshot(&self, surface: &dyn Surface, path: &Path) -> Option<PathBuf> {
        let saved = match surface.screenshot().await {
            Ok(shot) => self.store.save_replay_screenshot(path, &shot.bytes),
            Err(e) => Err(e),
        };
        match saved {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "post-replay screenshot failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::mock::{MemorySurface, RecordingExecutor};

    #[tokio::test]
    async fn continues_past_failures_and_skips_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save_script(1, 1, "import pyautogui\npyautogui.press('tab')\n").unwrap();
        store.save_script(1, 2, "print('no gate')\n").unwrap();
        store.save_script(1, 3, "DONE").unwrap();
        store.save_script(2, 1, "import pyautogui\npyautogui.press('enter')\n").unwrap();

        let executor = RecordingExecutor::default();
        let surface = MemorySurface::new(64, 40);
        let files = store.list_scripts().unwrap();
        let reports = Replayer::new(&executor, &store)
            .capture_with(&surface)
            .pause(Duration::ZERO)
            .run(&files)
            .await;

        assert_eq!(reports.len(), 4);
        assert!(matches!(reports[0].status, SnippetStatus::Executed(ref o) if o.succeeded()));
        assert!(matches!(reports[1].status, SnippetStatus::Failed(_)));
        assert_eq!(reports[2].status, SnippetStatus::Skipped);
        assert!(reports[2].screenshot.is_none());
        assert!(matches!(reports[3].status, SnippetStatus::Executed(_)));
        assert!(reports[3].screenshot.as_ref().is_some_and(|p| p.exists()));
        assert_eq!(executor.scripts().len(), 2);
    }
}
