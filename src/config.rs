use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{GroundError, GroundResult};
use crate::grounding::coords::{CoordinateSpace, ResizeSpec};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub task: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. Every role used at runtime must be present.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used when a role does not override it).
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Optional API key stored in config.toml (falls back to env var GROUNDLOOP_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_max_tokens() -> u32 {
    400
}

fn default_request_timeout() -> u64 {
    120
}

/// Maps model roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Vision-grounding model that proposes the next action.
    pub grounding: Option<RoleEntry>,
    /// Model that judges whether a step reached its expected end state.
    pub verification: Option<RoleEntry>,
    /// Model that merges saved step scripts into one script.
    pub integration: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API. Falls back to the provider default when absent.
    pub model: Option<String>,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    /// Overrides the provider-level output cap for this role.
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    #[serde(default = "default_factor")]
    pub factor: u32,
    #[serde(default = "default_min_pixels")]
    pub min_pixels: u64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    #[serde(default = "default_max_aspect_ratio")]
    pub max_aspect_ratio: f64,
    #[serde(default)]
    pub coordinate_space: CoordinateSpace,
}

fn default_factor() -> u32 {
    28
}

fn default_min_pixels() -> u64 {
    100 * 28 * 28
}

fn default_max_pixels() -> u64 {
    16384 * 28 * 28
}

fn default_max_aspect_ratio() -> f64 {
    200.0
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            min_pixels: default_min_pixels(),
            max_pixels: default_max_pixels(),
            max_aspect_ratio: default_max_aspect_ratio(),
            coordinate_space: CoordinateSpace::default(),
        }
    }
}

impl GroundingConfig {
    pub fn resize_spec(&self) -> ResizeSpec {
        ResizeSpec {
            factor: self.factor,
            min_pixels: self.min_pixels,
            max_pixels: self.max_pixels,
            max_aspect_ratio: self.max_aspect_ratio,
        }
    }
}

/// Resolution agreements between the captured screenshot and the real screen.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    /// Resize screenshots to this width before sending them to the model.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Destination surface override. When absent the surface reports its own size.
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_wait_action_delay_ms")]
    pub wait_action_delay_ms: u64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_verify_retries")]
    pub verify_retries: u32,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_wait_action_delay_ms() -> u64 {
    5000
}

fn default_language() -> String {
    "English".into()
}

fn default_verify_retries() -> u32 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            settle_delay_ms: default_settle_delay_ms(),
            wait_action_delay_ms: default_wait_action_delay_ms(),
            language: default_language(),
            verify_retries: default_verify_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    #[default]
    Local,
    Sandbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub kind: ExecutorKind,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Wall-clock bound for one script run. Defaults to 30s locally, 15s in the sandbox.
    pub timeout_secs: Option<u64>,
    /// Settle pause emitted after every compiled statement.
    #[serde(default = "default_statement_delay")]
    pub statement_delay_secs: f64,
    /// Always type text through the clipboard instead of key simulation.
    #[serde(default)]
    pub clipboard_text_entry: bool,
    /// Directory on the sandbox that receives transient scripts.
    #[serde(default = "default_remote_script_dir")]
    pub remote_script_dir: String,
}

fn default_interpreter() -> String {
    "python3".into()
}

fn default_statement_delay() -> f64 {
    0.5
}

fn default_remote_script_dir() -> String {
    "/tmp".into()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::default(),
            interpreter: default_interpreter(),
            timeout_secs: None,
            statement_delay_secs: default_statement_delay(),
            clipboard_text_entry: false,
            remote_script_dir: default_remote_script_dir(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> std::time::Duration {
        let secs = self.timeout_secs.unwrap_or(match self.kind {
            ExecutorKind::Local => 30,
            ExecutorKind::Sandbox => 15,
        });
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Shell line run once before the first step, e.g. opening the target page.
    pub startup_command: Option<String>,
    #[serde(default = "default_startup_wait")]
    pub startup_wait_secs: u64,
}

fn default_startup_wait() -> u64 {
    5
}

fn default_sandbox_url() -> String {
    "http://localhost:8000".into()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_sandbox_url(),
            request_timeout_secs: default_request_timeout(),
            startup_command: None,
            startup_wait_secs: default_startup_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root for scripts, visualizations and journals.
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskConfig {
    /// Overall description, used when verifying the final step.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub instruction: String,
    /// PNG of the state the screen should be in once the step is done.
    pub expected_image: Option<PathBuf>,
    /// Verification text; defaults to the instruction.
    pub expected_description: Option<String>,
}

fn resolve_config_path() -> GroundResult<PathBuf> {
    if let Ok(explicit) = std::env::var("GROUNDLOOP_CONFIG") {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config taken from GROUNDLOOP_CONFIG");
            return Ok(candidate);
        }
        return Err(GroundError::Config(format!(
            "GROUNDLOOP_CONFIG points to missing file {}",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(GroundError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> GroundResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> GroundResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        steps = config.task.steps.len(),
        executor = ?config.executor.kind,
        "config loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.agent.max_iterations, 5);
        assert_eq!(cfg.grounding.factor, 28);
        assert_eq!(cfg.grounding.max_pixels, 16384 * 28 * 28);
        assert_eq!(cfg.executor.kind, ExecutorKind::Local);
        assert_eq!(cfg.executor.timeout(), std::time::Duration::from_secs(30));
        assert!(cfg.artifacts.enabled);
    }

    #[test]
    fn parses_roles_and_steps() {
        let cfg = parse_config(
            r#"
            [llm.providers.tgi]
            api_base = "http://localhost:8080/v1/chat/completions"
            model = "tgi"

            [llm.roles.grounding]
            provider = "tgi"
            max_tokens = 400

            [executor]
            kind = "sandbox"

            [[task.steps]]
            instruction = "Click the search button"
            expected_image = "expected/search.png"
            "#,
        )
        .unwrap();

        let role = cfg.llm.roles.grounding.as_ref().unwrap();
        assert_eq!(role.provider, "tgi");
        assert_eq!(role.max_tokens, Some(400));
        assert_eq!(cfg.llm.providers["tgi"].temperature, 0.0);
        assert_eq!(cfg.executor.timeout(), std::time::Duration::from_secs(15));
        assert_eq!(cfg.task.steps.len(), 1);
        assert!(cfg.task.steps[0].expected_image.is_some());
    }
}
