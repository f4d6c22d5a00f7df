//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::aws::ProcessAws;
use crate::config::{CliConfig, CONFIG_FILE};
use crate::output::Output;

const CONFIG_NAMES: [&str; 3] = [CONFIG_FILE, ".discovery.toml", "discovery.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration, with environment overrides applied.
    pub config: CliConfig,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (mut config, config_path) = if let Some(path) = config_path {
            let path = PathBuf::from(path);
            (CliConfig::load(&path)?, Some(path))
        } else {
            match Self::find_config(&cwd) {
                Some((config, path)) => (config, Some(path)),
                None => (CliConfig::default(), None),
            }
        };
        config.apply_env();

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Find config file in directory tree.
    fn find_config(start: &Path) -> Option<(CliConfig, PathBuf)> {
        let mut current = start.to_path_buf();
        loop {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    match CliConfig::load(&path) {
                        Ok(config) => return Some((config, path)),
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable config"),
                    }
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Where config changes are written.
    pub fn config_file(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.cwd.join(CONFIG_FILE))
    }

    /// Apply `change` to the config file on disk.
    ///
    /// The file is re-read so environment overrides are not persisted.
    pub fn update_config(&self, change: impl FnOnce(&mut CliConfig)) -> Result<PathBuf> {
        let path = self.config_file();
        let mut config = if path.exists() {
            CliConfig::load(&path)?
        } else {
            CliConfig::default()
        };
        change(&mut config);
        config.save(&path)?;
        Ok(path)
    }

    /// AWS CLI runner for the configured region and profile.
    pub fn aws(&self) -> ProcessAws {
        ProcessAws::new(
            self.config.stack.region.clone(),
            self.config.stack.profile.clone(),
        )
    }
}
