pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod grounding;
pub mod llm;
pub mod perception;
pub mod sandbox;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::engine::{RunnerSettings, StepRunner};
use crate::agent_engine::integration::CodeIntegrator;
use crate::agent_engine::task::{TaskDriver, TaskReport};
use crate::agent_engine::verifier::ResultVerifier;
use crate::config::{AppConfig, ExecutorKind};
use crate::errors::{GroundError, GroundResult};
use crate::executor::artifacts::ArtifactStore;
use crate::executor::local::LocalExecutor;
use crate::executor::replay::{Replayer, SnippetReport};
use crate::executor::sandbox::SandboxExecutor;
use crate::executor::ScriptExecutor;
use crate::llm::registry::{ModelRole, ProviderRegistry};
use crate::perception::screenshot::LocalScreen;
use crate::perception::traits::Surface;
use crate::sandbox::client::SandboxClient;
use crate::sandbox::transport::HttpTransport;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Surface and executor for the configured destination.
pub struct Target {
    pub surface: Arc<dyn Surface>,
    pub executor: Arc<dyn ScriptExecutor>,
    sandbox: Option<SandboxClient>,
}

impl Target {
    pub fn from_config(cfg: &AppConfig) -> GroundResult<Self> {
        let timeout = cfg.executor.timeout();
        match cfg.executor.kind {
            ExecutorKind::Local => Ok(Self {
                surface: Arc::new(LocalScreen),
                executor: Arc::new(LocalExecutor::new(cfg.executor.interpreter.clone(), timeout)),
                sandbox: None,
            }),
            ExecutorKind::Sandbox => {
                let transport = HttpTransport::new(
                    &cfg.sandbox.base_url,
                    Duration::from_secs(cfg.sandbox.request_timeout_secs),
                )?;
                let client = SandboxClient::new(Arc::new(transport));
                let executor = SandboxExecutor::new(
                    client.clone(),
                    cfg.executor.interpreter.clone(),
                    timeout,
                    cfg.executor.remote_script_dir.clone(),
                );
                tracing::info!(base_url = %cfg.sandbox.base_url, "using sandbox target");
                Ok(Self {
                    surface: Arc::new(client.clone()),
                    executor: Arc::new(executor),
                    sandbox: Some(client),
                })
            }
        }
    }

    /// Run the configured sandbox startup command, then give the desktop time to settle.
    pub async fn prepare(&self, cfg: &AppConfig) -> GroundResult<()> {
        let (Some(client), Some(command)) = (&self.sandbox, &cfg.sandbox.startup_command) else {
            return Ok(());
        };
        tracing::info!(command = %command, "running sandbox startup command");
        let out = client.run_command(command).await?;
        if out.return_code != 0 {
            tracing::warn!(return_code = out.return_code, stderr = %out.stderr, "startup command failed");
        }
        tokio::time::sleep(Duration::from_secs(cfg.sandbox.startup_wait_secs)).await;
        Ok(())
    }
}

pub async fn run_task(cfg: &AppConfig) -> GroundResult<TaskReport> {
    if cfg.task.steps.is_empty() {
        return Err(GroundError::Config("no [[task.steps]] configured".into()));
    }
    let registry = ProviderRegistry::from_config(&cfg.llm)?;
    let grounding = registry.client_for_role(ModelRole::Grounding)?;
    let needs_verifier = cfg.task.steps.iter().any(|s| s.expected_image.is_some());
    let verifier = if needs_verifier {
        Some(ResultVerifier::new(registry.client_for_role(ModelRole::Verification)?))
    } else {
        None
    };

    let target = Target::from_config(cfg)?;
    target.prepare(cfg).await?;

    let artifacts = ArtifactStore::from_config(&cfg.artifacts);
    let runner = StepRunner::new(
        grounding,
        target.surface.clone(),
        target.executor.clone(),
        artifacts,
        RunnerSettings::from_config(cfg),
    );
    if let Some(path) = runner.journal().path() {
        tracing::info!(session = %runner.journal().session_id, journal = %path.display(), "task started");
    }

    let driver = TaskDriver::new(runner, verifier, cfg.agent.verify_retries);
    Ok(driver.run(&cfg.task).await)
}

pub async fn replay(cfg: &AppConfig, screenshots: bool) -> GroundResult<Vec<SnippetReport>> {
    let artifacts = ArtifactStore::from_config(&cfg.artifacts);
    let files = artifacts.list_scripts()?;
    if files.is_empty() {
        tracing::warn!(dir = %artifacts.code_dir().display(), "no saved step scripts to replay");
        return Ok(Vec::new());
    }

    let target = Target::from_config(cfg)?;
    target.prepare(cfg).await?;

    let replayer = Replayer::new(target.executor.as_ref(), &artifacts);
    let replayer = if screenshots {
        replayer.capture_with(target.surface.as_ref())
    } else {
        replayer
    };
    Ok(replayer.run(&files).await)
}

pub async fn integrate(cfg: &AppConfig) -> GroundResult<Option<(String, Option<PathBuf>)>> {
    let registry = ProviderRegistry::from_config(&cfg.llm)?;
    let integrator = CodeIntegrator::new(registry.client_for_role(ModelRole::Integration)?);
    integrator
        .integrate_store(&ArtifactStore::from_config(&cfg.artifacts))
        .await
}
