/// Single-shot check of whether a step reached its expected end state.
///
/// The verdict grammar is `Action: finished(content='true'|'false')`. It is
/// parsed here on its own terms and never through the grounding parser:
/// during grounding `finished` ends a step, here it carries a boolean.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent_engine::prompt::verification_messages;
use crate::errors::GroundResult;
use crate::llm::registry::ModelClient;
use crate::perception::types::EncodedImage;

static RATIONALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Thought:\s*(.*?)(?:\n\s*Action:|\z)").expect("rationale pattern is valid")
});

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)finished\(content=['"]?(true|false)['"]?\)"#).expect("verdict pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub rationale: String,
    pub finished: bool,
}

/// Extract rationale and verdict. Anything but an explicit `true` is `false`.
pub fn extract_verdict(raw: &str) -> VerificationResult {
    let rationale = RATIONALE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| raw.trim().to_string());

    let finished = match VERDICT.captures(raw).and_then(|c| c.get(1)) {
        Some(v) => v.as_str().eq_ignore_ascii_case("true"),
        None => {
            tracing::warn!(response = %raw, "verification verdict is ambiguous, treating as not finished");
            false
        }
    };

    VerificationResult { rationale, finished }
}

pub struct ResultVerifier {
    client: ModelClient,
}

impl ResultVerifier {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    pub async fn verify(
        &self,
        task_description: &str,
        expected: &EncodedImage,
        current: &EncodedImage,
    ) -> GroundResult<VerificationResult> {
        let messages = verification_messages(task_description, expected, current);
        let raw = self.client.complete(&messages).await?;
        let result = extract_verdict(&raw);
        tracing::info!(finished = result.finished, rationale = %result.rationale, "verification result");
        Ok(result)
    }
}
