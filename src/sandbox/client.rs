use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{GroundError, GroundResult};
use crate::perception::traits::Surface;
use crate::perception::types::{EncodedImage, SurfaceSize};
use crate::sandbox::transport::SandboxTransport;

/// Result of a shell command run inside the sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub return_code: i32,
}

/// Typed operations of a remote desktop.
#[derive(Clone)]
pub struct SandboxClient {
    transport: Arc<dyn SandboxTransport>,
}

impl SandboxClient {
    pub fn new(transport: Arc<dyn SandboxTransport>) -> Self {
        Self { transport }
    }

    pub async fn write_text(&self, path: &str, content: &str) -> GroundResult<()> {
        self.transport
            .send("write_text", serde_json::json!({ "path": path, "content": content }))
            .await?;
        Ok(())
    }

    pub async fn run_command(&self, command: &str) -> GroundResult<CommandOutput> {
        let value = self
            .transport
            .send("run_command", serde_json::json!({ "command": command }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl Surface for SandboxClient {
    async fn screenshot(&self) -> GroundResult<EncodedImage> {
        let value = self.transport.send("screenshot", serde_json::json!({})).await?;
        let data = value
            .get("image_data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| GroundError::Surface("screenshot response has no image_data".into()))?;
        EncodedImage::from_base64(data)
    }

    async fn size(&self) -> GroundResult<SurfaceSize> {
        let value = self.transport.send("get_screen_size", serde_json::json!({})).await?;
        let size = value.get("size").unwrap_or(&value);
        let dim = |k: &str| size.get(k).and_then(|v| v.as_u64()).map(|v| v as u32);
        match (dim("width"), dim("height")) {
            (Some(w), Some(h)) => Ok(SurfaceSize::new(w, h)),
            _ => Err(GroundError::Surface(format!("unexpected screen size response: {value}"))),
        }
    }
}
