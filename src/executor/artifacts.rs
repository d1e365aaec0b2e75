// On-disk artifacts of a run: per-iteration scripts, action visualizations, journals.
use std::path::{Path, PathBuf};

use crate::config::ArtifactsConfig;
use crate::errors::GroundResult;

const CODE_DIR: &str = "automation_code";
const SCREENSHOT_DIR: &str = "screenshots";
const SCRIPT_PREFIX: &str = "automation_step_";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    enabled: bool,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: true,
        }
    }

    /// A store that accepts writes and drops them.
    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn from_config(cfg: &ArtifactsConfig) -> Self {
        if !cfg.enabled {
            return Self::disabled();
        }
        Self::new(cfg.dir.clone().unwrap_or_else(default_root))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join(CODE_DIR)
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOT_DIR)
    }

    pub fn script_name(step: usize, iteration: u32) -> String {
        format!("{SCRIPT_PREFIX}{step}_{iteration}.py")
    }

    /// Persist the compiled text of one iteration (including `DONE`).
    pub fn save_script(&self, step: usize, iteration: u32, text: &str) -> GroundResult<Option<PathBuf>> {
        self.write(&self.code_dir(), &Self::script_name(step, iteration), text.as_bytes())
    }

    pub fn save_visualization(&self, step: usize, iteration: u32, png: &[u8]) -> GroundResult<Option<PathBuf>> {
        let name = format!("{SCRIPT_PREFIX}{step}_{iteration}.png");
        self.write(&self.screenshot_dir(), &name, png)
    }

    /// Screenshot taken after replaying `snippet`, stamped with local time.
    pub fn save_replay_screenshot(&self, snippet: &Path, png: &[u8]) -> GroundResult<Option<PathBuf>> {
        let base = snippet
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snippet".into());
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.write(&self.screenshot_dir(), &format!("{base}_{ts}.png"), png)
    }

    /// Single merged script for the whole task.
    pub fn save_integrated(&self, text: &str) -> GroundResult<Option<PathBuf>> {
        self.write(&self.root, "integrated_task.py", text.as_bytes())
    }

    pub fn journal_path(&self, session_id: &str) -> Option<PathBuf> {
        self.enabled
            .then(|| self.root.join(format!("journal_{session_id}.jsonl")))
    }

    /// Saved step scripts, ordered by (step, iteration); other names sort after, by name.
    pub fn list_scripts(&self) -> GroundResult<Vec<PathBuf>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        list_scripts_in(&self.code_dir())
    }

    /// Remove every saved script and visualization of `step`, e.g. before the step is re-run.
    /// Returns how many files were removed.
    pub fn clear_step(&self, step: usize) -> GroundResult<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let mut removed = 0;
        for (dir, ext) in [(self.code_dir(), ".py"), (self.screenshot_dir(), ".png")] {
            if !dir.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                let owned = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| artifact_index(n, ext))
                    .is_some_and(|(s, _)| s == step);
                if owned {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        tracing::debug!(step, removed, "step artifacts cleared");
        Ok(removed)
    }

    fn write(&self, dir: &Path, name: &str, bytes: &[u8]) -> GroundResult<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(Some(path))
    }
}

pub fn list_scripts_in(dir: &Path) -> GroundResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SCRIPT_PREFIX) && n.ends_with(".py"))
        })
        .collect();
    files.sort_by_key(|p| {
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        (step_index(&name).unwrap_or((usize::MAX, u32::MAX)), name)
    });
    Ok(files)
}

/// `automation_step_3_12.py` → `(3, 12)`.
fn step_index(name: &str) -> Option<(usize, u32)> {
    artifact_index(name, ".py")
}

fn artifact_index(name: &str, ext: &str) -> Option<(usize, u32)> {
    let stem = name.strip_prefix(SCRIPT_PREFIX)?.strip_suffix(ext)?;
    let (step, iteration) = stem.split_once('_')?;
    Some((step.parse().ok()?, iteration.parse().ok()?))
}

/// Platform data directory (`~/.local/share/groundloop` on Linux), falling back to `./data`.
fn default_root() -> PathBuf {
    match dirs::data_dir() {
        Some(d) => d.join("groundloop"),
        None => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data"),
    }
}
