/// Merges the saved per-iteration scripts of a task into a single script.
use std::path::PathBuf;

use crate::agent_engine::prompt::integration_messages;
use crate::errors::GroundResult;
use crate::executor::artifacts::ArtifactStore;
use crate::executor::safety::verify_script;
use crate::grounding::compiler::DONE_SENTINEL;
use crate::llm::registry::ModelClient;

/// Read scripts in the given order. Unreadable files and `DONE` markers are skipped.
pub fn load_snippets(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|path| match std::fs::read_to_string(path) {
            Ok(code) if code.trim() == DONE_SENTINEL => None,
            Ok(code) => Some(code),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable snippet");
                None
            }
        })
        .collect()
}

/// Body of the first fenced block, or the whole reply when there is none.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after = &trimmed[start + 3..];
    // Skip the info string (e.g. `python`).
    let body = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => after,
    };
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

pub struct CodeIntegrator {
    client: ModelClient,
}

impl CodeIntegrator {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    /// Returns `None` when there is nothing to integrate.
    pub async fn integrate(&self, snippets: &[String]) -> GroundResult<Option<String>> {
        if snippets.is_empty() {
            return Ok(None);
        }
        tracing::info!(snippets = snippets.len(), model = %self.client.call_config().model, "integrating step scripts");
        let raw = self.client.complete(&integration_messages(snippets)).await?;
        let script = strip_code_fences(&raw);
        verify_script(&script)?;
        Ok(Some(script))
    }

    /// Integrate everything saved under the store and write the result next to it.
    pub async fn integrate_store(&self, store: &ArtifactStore) -> GroundResult<Option<(String, Option<PathBuf>)>> {
        let snippets = load_snippets(&store.list_scripts()?);
        let Some(script) = self.integrate(&snippets).await? else {
            return Ok(None);
        };
        let path = store.save_integrated(&script)?;
        Ok(Some((script, path)))
    }
}
