use serde::{Deserialize, Serialize};

use crate::perception::types::EncodedImage;

/// Number of prior (thought, action) turns replayed to the model.
pub const HISTORY_CAPACITY: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub thought: String,
    pub action_text: String,
}

/// Bounded memory of one task step. Owned by a single loop and discarded when the step ends.
#[derive(Debug, Clone)]
pub struct StepState {
    pub instruction: String,
    pub language: String,
    previous_image: Option<EncodedImage>,
    history: Vec<HistoryTurn>,
}

impl StepState {
    pub fn new(instruction: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            language: language.into(),
            previous_image: None,
            history: Vec::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Record a finished iteration: the image the model saw replaces the previous
    /// one, and the turn is appended before the history is cut back to its capacity.
    pub fn add_step(&mut self, before_image: EncodedImage, thought: impl Into<String>, action_text: impl Into<String>) {
        self.previous_image = Some(before_image);
        self.history.push(HistoryTurn {
            thought: thought.into(),
            action_text: action_text.into(),
        });
        if self.history.len() > HISTORY_CAPACITY {
            let excess = self.history.len() - HISTORY_CAPACITY;
            self.history.drain(..excess);
        }
    }

    pub fn previous_image(&self) -> Option<&EncodedImage> {
        self.previous_image.as_ref()
    }

    /// Oldest first.
    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }
}

/// Where the control loop is within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Capture,
    Prompt,
    Ground,
    Parse,
    Execute,
    Visualize,
    UpdateState,
    Delay,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Capture => "capture",
            LoopPhase::Prompt => "prompt",
            LoopPhase::Ground => "ground",
            LoopPhase::Parse => "parse",
            LoopPhase::Execute => "execute",
            LoopPhase::Visualize => "visualize",
            LoopPhase::UpdateState => "update_state",
            LoopPhase::Delay => "delay",
        }
    }
}

/// Terminal state of a step loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The model emitted `finished`.
    Finished { content: String },
    /// The compiler returned the `DONE` sentinel.
    Done,
    /// `max_iterations` ran out without completion.
    Exhausted,
    /// An unrecoverable failure ended the step.
    Error { message: String },
}

impl StepOutcome {
    /// Whether the loop itself believes the step completed.
    pub fn is_complete(&self) -> bool {
        matches!(self, StepOutcome::Finished { .. } | StepOutcome::Done)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Finished { .. } => "STOP_FINISHED",
            StepOutcome::Done => "STOP_DONE",
            StepOutcome::Exhausted => "STOP_EXHAUSTED",
            StepOutcome::Error { .. } => "STOP_ERROR",
        }
    }
}

/// Summary of one run of the step loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub instruction: String,
    pub outcome: StepOutcome,
    /// Iterations started, including the terminal one.
    pub iterations: u32,
    /// Iteration-level failures that did not end the step.
    pub failures: u32,
    pub last_thought: Option<String>,
}
