//! The perception-action loop for one task step.
//!
//! Each iteration walks `Capture → Prompt → Ground → Parse → Execute →
//! Visualize → UpdateState → Delay`, strictly in order. Iteration-level
//! failures (nothing parseable, a failed script run, a broken visualization)
//! are journaled and the loop moves on; a failed capture or grounding call
//! ends the step with `StepOutcome::Error`.
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::history::{Journal, JournalEntry};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::prompt::grounding_messages;
use crate::agent_engine::state::{LoopPhase, StepOutcome, StepReport, StepState};
use crate::config::{AppConfig, CaptureConfig};
use crate::errors::{GroundError, GroundResult};
use crate::executor::artifacts::ArtifactStore;
use crate::executor::ScriptExecutor;
use crate::grounding::action::ActionType;
use crate::grounding::compiler::{compile, CompileOptions, CompiledCommand};
use crate::grounding::coords::{CoordinateSpace, PerceivedFrame, ResizeSpec};
use crate::grounding::parser::parse_response;
use crate::llm::registry::ModelClient;
use crate::perception::annotator::annotate_actions;
use crate::perception::screenshot::{capture, destination_size};
use crate::perception::traits::Surface;
use crate::perception::types::SurfaceSize;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub max_iterations: u32,
    pub language: String,
    pub settle_delay: Duration,
    /// Used instead of the settle delay after a `wait()` action.
    pub wait_delay: Duration,
    pub resize: ResizeSpec,
    pub coordinate_space: CoordinateSpace,
    pub capture: CaptureConfig,
    pub compile: CompileOptions,
}

impl RunnerSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            language: cfg.agent.language.clone(),
            settle_delay: Duration::from_millis(cfg.agent.settle_delay_ms),
            wait_delay: Duration::from_millis(cfg.agent.wait_action_delay_ms),
            resize: cfg.grounding.resize_spec(),
            coordinate_space: cfg.grounding.coordinate_space,
            capture: cfg.capture.clone(),
            compile: CompileOptions {
                statement_delay_secs: cfg.executor.statement_delay_secs,
                clipboard_text_entry: cfg.executor.clipboard_text_entry,
                ..CompileOptions::default()
            },
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// How one iteration ended.
enum Iteration {
    Continue { delay: Duration, failed: bool },
    Stop(StepOutcome),
}

pub struct StepRunner {
    grounding: ModelClient,
    surface: Arc<dyn Surface>,
    executor: Arc<dyn ScriptExecutor>,
    artifacts: ArtifactStore,
    journal: Journal,
    settings: RunnerSettings,
}

impl StepRunner {
    pub fn new(
        grounding: ModelClient,
        surface: Arc<dyn Surface>,
        executor: Arc<dyn ScriptExecutor>,
        artifacts: ArtifactStore,
        settings: RunnerSettings,
    ) -> Self {
        let journal = Journal::new(&artifacts);
        Self {
            grounding,
            surface,
            executor,
            artifacts,
            journal,
            settings,
        }
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Drive one step to a terminal state. `step` is 1-based and names the artifacts.
    pub async fn run_step(&self, step: usize, instruction: &str) -> StepReport {
        tracing::info!(step, instruction = %instruction, max_iterations = self.settings.max_iterations, "step started");

        let mut state = StepState::new(instruction, self.settings.language.clone());
        let mut ctl = LoopController::new(self.settings.max_iterations);
        let mut report = StepReport {
            step,
            instruction: instruction.to_string(),
            outcome: StepOutcome::Exhausted,
            iterations: 0,
            failures: 0,
            last_thought: None,
        };

        let dest = match destination_size(self.surface.as_ref(), &self.settings.capture).await {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(step, error = %e, "cannot determine destination surface size");
                report.outcome = StepOutcome::Error { message: e.to_string() };
                return report;
            }
        };

        while let Some(iteration) = ctl.next_iteration() {
            report.iterations = iteration;
            let mut entry = JournalEntry::new(step, iteration);

            let result = self.iterate(&mut state, dest, &mut entry).await;
            if let Some(first) = entry.actions.first() {
                report.last_thought = Some(first.thought.clone());
            }

            let next = match result {
                Ok(Iteration::Stop(outcome)) => {
                    entry.outcome = Some(outcome.label().to_string());
                    Some(outcome)
                }
                Ok(Iteration::Continue { delay, failed }) => {
                    if failed {
                        ctl.record_failure();
                    }
                    self.record(&entry);
                    if !ctl.should_stop() {
                        tracing::debug!(step, iteration, delay_ms = delay.as_millis() as u64, "settling");
                        tokio::time::sleep(delay).await;
                    }
                    None
                }
                Err(e) => {
                    tracing::error!(step, iteration, phase = entry.phase.as_str(), error = %e, "iteration failed, ending step");
                    entry.error = Some(e.to_string());
                    let outcome = StepOutcome::Error { message: e.to_string() };
                    entry.outcome = Some(outcome.label().to_string());
                    Some(outcome)
                }
            };

            if let Some(outcome) = next {
                self.record(&entry);
                report.outcome = outcome;
                break;
            }
        }

        report.failures = ctl.failure_count();
        tracing::info!(
            step,
            outcome = report.outcome.label(),
            iterations = report.iterations,
            failures = report.failures,
            "step ended"
        );
        report
    }

    async fn iterate(
        &self,
        state: &mut StepState,
        dest: SurfaceSize,
        entry: &mut JournalEntry,
    ) -> GroundResult<Iteration> {
        let (step, iteration) = (entry.step, entry.iteration);

        entry.phase = LoopPhase::Capture;
        let shot = capture(self.surface.as_ref(), &self.settings.capture).await?;
        let frame = PerceivedFrame::from_image(
            shot.size.width,
            shot.size.height,
            &self.settings.resize,
            self.settings.coordinate_space,
        )?;
        tracing::debug!(step, iteration, image = %shot.size, frame_w = frame.width, frame_h = frame.height, "captured");

        entry.phase = LoopPhase::Prompt;
        let messages = grounding_messages(state, &shot);

        entry.phase = LoopPhase::Ground;
        let raw = self
            .grounding
            .complete(&messages)
            .await
            .map_err(|e| GroundError::GroundingCall(e.to_string()))?;
        entry.raw_response = Some(raw.clone());

        entry.phase = LoopPhase::Parse;
        let parsed = parse_response(&raw, &frame);
        entry.actions = parsed.actions.clone();
        entry.warnings = parsed.rejected.iter().map(|e| e.to_string()).collect();
        if parsed.actions.is_empty() {
            tracing::warn!(step, iteration, response = %raw, "no actions in grounding response");
            entry.error = Some("no actions could be parsed from the response".into());
            return Ok(Iteration::Continue {
                delay: self.settings.settle_delay,
                failed: true,
            });
        }

        if let Some(finished) = parsed.actions.iter().find(|a| a.is_finished()) {
            let content = finished.text("content").unwrap_or_default().to_string();
            tracing::info!(step, iteration, content = %content, "model reported the step finished");
            return Ok(Iteration::Stop(StepOutcome::Finished { content }));
        }

        entry.phase = LoopPhase::Execute;
        let compiled = compile(&parsed.actions, dest, &self.settings.compile);
        if let Err(e) = self.artifacts.save_script(step, iteration, compiled.as_text()) {
            tracing::warn!(step, iteration, error = %e, "failed to save script");
        }
        let script = match compiled {
            CompiledCommand::Done => {
                tracing::info!(step, iteration, "compiler signalled DONE");
                return Ok(Iteration::Stop(StepOutcome::Done));
            }
            CompiledCommand::Script(script) => script,
        };
        entry
            .warnings
            .extend(script.skipped.iter().map(|e| e.to_string()));

        let mut failed = false;
        if script.statements == 0 {
            tracing::debug!(step, iteration, "nothing to execute");
        } else {
            tracing::info!(step, iteration, statements = script.statements, dest = %dest, "executing script");
            match self.executor.execute(&script.text).await {
                Ok(outcome) => {
                    if !outcome.succeeded() {
                        failed = true;
                        tracing::warn!(
                            step,
                            iteration,
                            status = %outcome.describe(),
                            stderr = %outcome.stderr,
                            "script did not succeed, continuing"
                        );
                        entry.error = Some(GroundError::Execution(outcome.describe()).to_string());
                    }
                    entry.execution = Some(outcome);
                }
                Err(e) => {
                    failed = true;
                    tracing::warn!(step, iteration, error = %e, "execution failed, continuing");
                    entry.error = Some(e.to_string());
                }
            }
        }

        entry.phase = LoopPhase::Visualize;
        if self.artifacts.is_enabled() {
            let saved = annotate_actions(&shot, &parsed.actions)
                .and_then(|png| self.artifacts.save_visualization(step, iteration, &png));
            if let Err(e) = saved {
                tracing::warn!(step, iteration, error = %e, "visualization failed");
            }
        }

        entry.phase = LoopPhase::UpdateState;
        let primary = &parsed.actions[0];
        state.add_step(shot, primary.thought.clone(), primary.raw.clone());

        entry.phase = LoopPhase::Delay;
        let waits = parsed.actions.iter().any(|a| a.action_type == ActionType::Wait);
        Ok(Iteration::Continue {
            delay: if waits { self.settings.wait_delay } else { self.settings.settle_delay },
            failed,
        })
    }

    fn record(&self, entry: &JournalEntry) {
        if let Err(e) = self.journal.append(entry) {
            tracing::warn!(error = %e, "failed to write journal entry");
        }
    }
}
