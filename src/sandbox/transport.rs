// Command transport to a sandboxed desktop (a computer-server style HTTP API).
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{GroundError, GroundResult};

#[async_trait]
pub trait SandboxTransport: Send + Sync {
    /// Run one named command with JSON params; returns the response payload.
    async fn send(&self, command: &str, params: serde_json::Value) -> GroundResult<serde_json::Value>;
}

/// `POST {base_url}/cmd` with `{"command": …, "params": …}`.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> GroundResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}/cmd", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl SandboxTransport for HttpTransport {
    async fn send(&self, command: &str, params: serde_json::Value) -> GroundResult<serde_json::Value> {
        tracing::debug!(endpoint = %self.endpoint, command, "sandbox command");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "command": command, "params": params }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(GroundError::Surface(format!("{command}: {status}: {err_body}")));
        }

        let body = response.text().await?;
        decode_response(command, &body)
    }
}

/// Accepts a plain JSON body or an SSE body (`data: {...}` lines; the last one wins).
pub fn decode_response(command: &str, body: &str) -> GroundResult<serde_json::Value> {
    let payload = body
        .lines()
        .filter_map(|l| l.trim().strip_prefix("data:"))
        .last()
        .unwrap_or(body)
        .trim();

    let value: serde_json::Value = serde_json::from_str(payload)?;
    if value.get("success").and_then(|s| s.as_bool()) == Some(false) {
        let reason = value
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        return Err(GroundError::Surface(format!("{command}: {reason}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_sse_bodies() {
        let v = decode_response("get_screen_size", r#"{"success":true,"size":{"width":1024,"height":768}}"#).unwrap();
        assert_eq!(v["size"]["width"], 1024);

        let sse = "data: {\"success\": true, \"stdout\": \"a\"}\n\ndata: {\"success\": true, \"stdout\": \"b\"}\n";
        assert_eq!(decode_response("run_command", sse).unwrap()["stdout"], "b");
    }

    #[test]
    fn reported_failure_is_a_surface_error() {
        let err = decode_response("screenshot", r#"{"success":false,"error":"no display"}"#).unwrap_err();
        assert!(matches!(err, GroundError::Surface(ref m) if m.contains("no display")));
    }
}
