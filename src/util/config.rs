//! Configuration file support for Stagehand.
//!
//! Stagehand supports two configuration file locations:
//! - Global: `~/.stagehand/config.toml` - User-wide defaults (engine install)
//! - Project: `.stagehand/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Relative paths in a
//! project config are relative to the directory containing `.stagehand/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::job::JobKind;
use crate::toolchain::CommandTemplate;

/// Stagehand configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine install
    pub engine: EngineConfig,

    /// Project defaults
    pub project: ProjectConfig,

    /// Job defaults
    pub defaults: DefaultsConfig,

    /// Log buffer and persistence
    pub log: LogConfig,

    /// Environment for spawned tools
    pub env: EnvConfig,

    /// Command templates, keyed by job kind
    pub commands: BTreeMap<String, CommandTemplate>,
}

/// Engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine root directory (contains `Engine/` and `GenerateProjectFiles.*`)
    pub root: Option<PathBuf>,
}

/// Project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project descriptor file
    pub file: Option<PathBuf>,

    /// Default build target
    pub target: Option<String>,
}

/// Defaults applied to every job unless overridden on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Target platform (e.g., Linux, Win64)
    pub platform: Option<String>,

    /// Build configuration (e.g., Development, Shipping)
    pub configuration: Option<String>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Log settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Number of log lines kept in memory
    pub capacity: Option<usize>,

    /// Directory persisted logs are written to
    pub dir: Option<PathBuf>,
}

/// Environment overlay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Directories put in front of `PATH`
    pub path_prepend: Vec<PathBuf>,

    /// Variables set for every spawned tool
    #[serde(flatten)]
    pub vars: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.engine.root.is_some() {
            self.engine.root = other.engine.root;
        }

        if other.project.file.is_some() {
            self.project.file = other.project.file;
        }
        if other.project.target.is_some() {
            self.project.target = other.project.target;
        }

        if other.defaults.platform.is_some() {
            self.defaults.platform = other.defaults.platform;
        }
        if other.defaults.configuration.is_some() {
            self.defaults.configuration = other.defaults.configuration;
        }
        if other.defaults.timeout_secs.is_some() {
            self.defaults.timeout_secs = other.defaults.timeout_secs;
        }

        if other.log.capacity.is_some() {
            self.log.capacity = other.log.capacity;
        }
        if other.log.dir.is_some() {
            self.log.dir = other.log.dir;
        }

        // Lists are replaced, variables and commands are overlaid
        if !other.env.path_prepend.is_empty() {
            self.env.path_prepend = other.env.path_prepend;
        }
        self.env.vars.extend(other.env.vars);
        self.commands.extend(other.commands);
    }

    /// Make relative paths absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let absolutize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(root) = self.engine.root.as_mut() {
            absolutize(root);
        }
        if let Some(file) = self.project.file.as_mut() {
            absolutize(file);
        }
        if let Some(dir) = self.log.dir.as_mut() {
            absolutize(dir);
        }
        self.env.path_prepend.iter_mut().for_each(absolutize);
    }

    /// Per-attempt timeout, if configured. Zero means no timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.defaults
            .timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Command templates keyed by job kind. Unknown kinds are skipped with a warning.
    pub fn command_templates(&self) -> BTreeMap<JobKind, CommandTemplate> {
        self.commands
            .iter()
            .filter_map(|(name, template)| match name.parse::<JobKind>() {
                Ok(kind) => Some((kind, template.clone())),
                Err(e) => {
                    tracing::warn!("ignoring [commands.{}]: {}", name, e);
                    None
                }
            })
            .collect()
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.stagehand/config.toml)
/// 2. Global config (~/.stagehand/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    // Load global config first
    if global_path.exists() {
        let mut global = Config::load_or_default(global_path);
        if let Some(home) = global_path.parent() {
            global.resolve_paths(home);
        }
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let mut project = Config::load_or_default(project_path);
        if let Some(root) = project_path.parent().and_then(Path::parent) {
            project.resolve_paths(root);
        }
        config.merge(project);
    }

    config
}

/// Get the global stagehand config directory (~/.stagehand).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stagehand"))
}

/// Get the global config path (~/.stagehand/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.stagehand/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".stagehand").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.engine.root.is_none());
        assert!(config.commands.is_empty());
        assert!(config.env.vars.is_empty());
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[engine]
root = "/opt/UE_5.4"

[project]
file = "MyGame.uproject"
target = "MyGameEditor"

[defaults]
platform = "Linux"
configuration = "DebugGame"
timeout_secs = 3600

[log]
capacity = 5000

[env]
path_prepend = ["/opt/dotnet"]
UE_SDKS_ROOT = "/opt/sdks"

[commands.cook]
program = "{engine}/Engine/Build/BatchFiles/RunUAT.sh"
args = ["BuildCookRun", "-project={project}", "-cook"]
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.engine.root, Some(PathBuf::from("/opt/UE_5.4")));
        assert_eq!(config.project.target.as_deref(), Some("MyGameEditor"));
        assert_eq!(config.defaults.configuration.as_deref(), Some("DebugGame"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.log.capacity, Some(5000));
        assert_eq!(config.env.path_prepend, vec![PathBuf::from("/opt/dotnet")]);
        assert_eq!(config.env.vars["UE_SDKS_ROOT"], "/opt/sdks");
        assert!(!config.env.vars.contains_key("path_prepend"));

        let templates = config.command_templates();
        assert_eq!(templates[&JobKind::Cook].primary.args[0], "BuildCookRun");
    }

    #[test]
    fn test_config_parse_error() {
        assert!(Config::parse("[defaults]\ntimeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config::parse("[defaults]\ntimeout_secs = 0").unwrap();
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.engine.root = Some(PathBuf::from("/opt/UE_5.3"));
        base.defaults.platform = Some("Linux".to_string());
        base.env.vars.insert("A".to_string(), "global".to_string());
        base.env.vars.insert("B".to_string(), "global".to_string());

        let mut override_cfg = Config::default();
        override_cfg.engine.root = Some(PathBuf::from("/opt/UE_5.4"));
        override_cfg.env.vars.insert("A".to_string(), "project".to_string());

        base.merge(override_cfg);

        assert_eq!(base.engine.root, Some(PathBuf::from("/opt/UE_5.4")));
        assert_eq!(base.defaults.platform.as_deref(), Some("Linux")); // Not overridden
        assert_eq!(base.env.vars["A"], "project");
        assert_eq!(base.env.vars["B"], "global");
    }

    #[test]
    fn test_unknown_command_kind_is_skipped() {
        let config = Config::parse(
            r#"
[commands.deploy]
program = "scp"

[commands.build]
program = "make"
"#,
        )
        .unwrap();
        let templates = config.command_templates();
        assert_eq!(templates.len(), 1);
        assert!(templates.contains_key(&JobKind::Build));
    }

    #[test]
    fn test_load_config_precedence_and_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("home").join(".stagehand").join("config.toml");
        let project_root = tmp.path().join("MyGame");
        let project_path = project_config_path(&project_root);
        std::fs::create_dir_all(global_path.parent().unwrap()).unwrap();
        std::fs::create_dir_all(project_path.parent().unwrap()).unwrap();

        std::fs::write(
            &global_path,
            r#"
[engine]
root = "/opt/UE_5.4"

[defaults]
configuration = "Development"
timeout_secs = 60
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[project]
file = "MyGame.uproject"

[defaults]
configuration = "Shipping"

[log]
dir = "Saved/Logs"
"#,
        )
        .unwrap();

        let config = load_config(&global_path, &project_path);

        assert_eq!(config.engine.root, Some(PathBuf::from("/opt/UE_5.4")));
        assert_eq!(config.defaults.configuration.as_deref(), Some("Shipping"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.project.file, Some(project_root.join("MyGame.uproject")));
        assert_eq!(config.log.dir, Some(project_root.join("Saved/Logs")));
    }

    #[test]
    fn test_malformed_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "this is not toml [").unwrap();
        let config = Config::load_or_default(&path);
        assert!(config.engine.root.is_none());
    }
}
