// Test doubles for the loop's collaborators.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{GroundError, GroundResult};
use crate::executor::safety::verify_script;
use crate::executor::{ExecutionOutcome, ScriptExecutor};
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ModelClient;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::traits::Surface;
use crate::perception::types::{solid_png, EncodedImage, SurfaceSize};

/// Replies with queued responses in order and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<GroundResult<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn with_results(replies: Vec<GroundResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn client(self: &Arc<Self>) -> ModelClient {
        ModelClient::new(
            self.clone(),
            CallConfig {
                model: "scripted".into(),
                temperature: 0.0,
                max_tokens: 400,
            },
        )
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[ChatMessage], _cfg: &CallConfig) -> GroundResult<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GroundError::LlmProvider("no scripted reply left".into())))
    }
}

/// Serves generated PNGs of a fixed size.
pub struct MemorySurface {
    png: Vec<u8>,
    image: SurfaceSize,
    screen: SurfaceSize,
    shots: AtomicUsize,
    fail: AtomicBool,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            png: solid_png(width, height),
            image: SurfaceSize::new(width, height),
            screen: SurfaceSize::new(width, height),
            shots: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = SurfaceSize::new(width, height);
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn shots(&self) -> usize {
        self.shots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Surface for MemorySurface {
    async fn screenshot(&self) -> GroundResult<EncodedImage> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GroundError::Surface("display unavailable".into()));
        }
        self.shots.fetch_add(1, Ordering::SeqCst);
        Ok(EncodedImage {
            bytes: self.png.clone(),
            size: self.image,
        })
    }

    async fn size(&self) -> GroundResult<SurfaceSize> {
        Ok(self.screen)
    }
}

/// Gates scripts like a real executor, records them and returns a fixed outcome.
pub struct RecordingExecutor {
    scripts: Mutex<Vec<String>>,
    outcome: ExecutionOutcome,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::returning(ExecutionOutcome {
            exit_code: Some(0),
            ..ExecutionOutcome::default()
        })
    }
}

impl RecordingExecutor {
    pub fn returning(outcome: ExecutionOutcome) -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            outcome,
        }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for RecordingExecutor {
    async fn execute(&self, script: &str) -> GroundResult<ExecutionOutcome> {
        verify_script(script)?;
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(self.outcome.clone())
    }
}
