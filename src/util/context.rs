//! Global context for Stagehand operations.
//!
//! Provides centralized access to configuration, paths, and environment.
//! The project root is the nearest directory, searching upward from the
//! working directory, that holds a `.stagehand/` directory or a
//! `.uproject` descriptor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::config::{load_config, project_config_path, Config};

/// Environment variable overriding the global home directory.
pub const HOME_ENV: &str = "STAGEHAND_HOME";

/// Project descriptor extension.
pub const PROJECT_EXT: &str = "uproject";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Stagehand data (~/.stagehand/)
    home: PathBuf,

    /// Nearest project root, if any
    project_root: Option<PathBuf>,

    /// Merged configuration
    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => super::config::global_config_dir().unwrap_or_else(|| PathBuf::from(".stagehand")),
        };
        Ok(Self::with_home(cwd, home))
    }

    /// Create a GlobalContext with explicit working and home directories.
    pub fn with_home(cwd: PathBuf, home: PathBuf) -> Self {
        let project_root = find_project_root(&cwd);
        let project_path = project_root
            .as_deref()
            .map(project_config_path)
            .unwrap_or_default();
        let config = load_config(&home.join("config.toml"), &project_path);
        tracing::debug!(
            cwd = %cwd.display(),
            project_root = ?project_root,
            "loaded configuration"
        );

        GlobalContext {
            cwd,
            home,
            project_root,
            config,
        }
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Stagehand home directory (~/.stagehand/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the project configuration file path, if inside a project.
    pub fn project_config_path(&self) -> Option<PathBuf> {
        self.project_root.as_deref().map(project_config_path)
    }

    /// Get the nearest project root.
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Get the merged configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration (for CLI overrides).
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Find the project descriptor.
    ///
    /// Uses `[project] file` if configured, otherwise the single
    /// `.uproject` file in the project root.
    pub fn find_project_file(&self) -> Option<PathBuf> {
        if let Some(file) = &self.config.project.file {
            return Some(file.clone());
        }
        let root = self.project_root.as_deref()?;
        let mut found = project_files_in(root);
        if found.len() > 1 {
            tracing::warn!(
                "multiple .{} files in {}; pass --project to choose one",
                PROJECT_EXT,
                root.display()
            );
            return None;
        }
        found.pop()
    }

    /// Directory persisted logs are written to.
    ///
    /// `[log] dir` if configured, otherwise `.stagehand/logs` in the project
    /// root, otherwise `logs` under the home directory.
    pub fn log_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config.log.dir {
            return dir.clone();
        }
        match &self.project_root {
            Some(root) => root.join(".stagehand").join("logs"),
            None => self.home.join("logs"),
        }
    }
}

/// Search upward from `start` for a project root.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".stagehand").is_dir() || !project_files_in(&current).is_empty() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn project_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == PROJECT_EXT))
        .collect();
    files.sort();
    files
}
