use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

use crate::agent_engine::state::LoopPhase;
use crate::errors::GroundResult;
use crate::executor::artifacts::ArtifactStore;
use crate::executor::ExecutionOutcome;
use crate::grounding::action::StructuredAction;

/// One line of the iteration journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: i64,
    pub step: usize,
    pub iteration: u32,
    /// Last phase the iteration reached.
    pub phase: LoopPhase,
    pub raw_response: Option<String>,
    #[serde(default)]
    pub actions: Vec<StructuredAction>,
    /// Rejected calls and other non-fatal problems.
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub execution: Option<ExecutionOutcome>,
    /// Terminal state label when the iteration ended the step.
    pub outcome: Option<String>,
}

impl JournalEntry {
    pub fn new(step: usize, iteration: u32) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            step,
            iteration,
            phase: LoopPhase::Capture,
            raw_response: None,
            actions: Vec::new(),
            warnings: Vec::new(),
            error: None,
            execution: None,
            outcome: None,
        }
    }
}

/// Append-only JSONL record of every iteration of a session.
pub struct Journal {
    pub session_id: String,
    file_path: Option<PathBuf>,
}

impl Journal {
    pub fn new(store: &ArtifactStore) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = store.journal_path(&session_id);
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.file_path.as_deref()
    }

    pub fn append(&self, entry: &JournalEntry) -> GroundResult<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(
            path = %path.display(),
            step = entry.step,
            iteration = entry.iteration,
            "journal entry flushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(&ArtifactStore::new(dir.path()));

        let mut entry = JournalEntry::new(1, 1);
        entry.raw_response = Some("Thought: x\nAction: wait()".into());
        journal.append(&entry).unwrap();
        entry.iteration = 2;
        entry.error = Some("Grounding call failed: timeout".into());
        journal.append(&entry).unwrap();

        let path = journal.path().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("journal_"));
        let lines: Vec<serde_json::Value> = std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["phase"], "capture");
        assert_eq!(lines[1]["iteration"], 2);
        assert_eq!(lines[1]["error"], "Grounding call failed: timeout");
    }

    #[test]
    fn disabled_store_means_no_file() {
        let journal = Journal::new(&ArtifactStore::disabled());
        assert!(journal.path().is_none());
        journal.append(&JournalEntry::new(1, 1)).unwrap();
    }
}
