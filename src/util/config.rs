//! Configuration file support for drydock.
//!
//! drydock reads two configuration files:
//! - Global: `~/.drydock/config.toml` - User-wide defaults
//! - Project: `.drydock/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Values left out of
//! both files fall back to [`IncrementalOptions::default`].

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".drydock";

/// File name of the saved build record inside the state directory.
pub const RECORD_FILE: &str = "record.json";

/// drydock configuration, as written in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Incremental compilation settings
    pub incremental: IncrementalConfig,

    /// Where the project's inputs and outputs live
    pub sources: SourceConfig,
}

/// The `[incremental]` table. Every key is optional so that a project file
/// only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IncrementalConfig {
    pub classfile_manager: Option<ClassFileManagerType>,

    /// Share of sources above which an incremental round turns into a full
    /// rebuild.
    pub recompile_all_fraction: Option<f64>,

    /// Abort the round when an external lookup fails.
    pub strict: Option<bool>,
}

/// Which built-in manager handles the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClassFileManagerType {
    /// Back up before changing; restore on failure.
    Transactional {
        /// Defaults to `backup` inside the state directory.
        #[serde(default, rename = "backup-dir", skip_serializing_if = "Option::is_none")]
        backup_dir: Option<PathBuf>,
    },

    /// Delete eagerly; on failure delete whatever the attempt wrote.
    DeleteImmediately,
}

impl Default for ClassFileManagerType {
    fn default() -> Self {
        ClassFileManagerType::Transactional { backup_dir: None }
    }
}

/// Resolved incremental settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalOptions {
    pub classfile_manager: ClassFileManagerType,
    pub recompile_all_fraction: f64,
    pub strict: bool,
}

impl Default for IncrementalOptions {
    fn default() -> Self {
        IncrementalOptions {
            classfile_manager: ClassFileManagerType::default(),
            recompile_all_fraction: 0.5,
            strict: true,
        }
    }
}

impl IncrementalOptions {
    pub fn with_classfile_manager(mut self, manager: ClassFileManagerType) -> Self {
        self.classfile_manager = manager;
        self
    }

    /// `1.0` means "never escalate to a full rebuild".
    pub fn with_recompile_all_fraction(mut self, fraction: f64) -> Self {
        self.recompile_all_fraction = fraction;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// The `[sources]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Glob patterns (relative to the project root) selecting source files
    pub include: Vec<String>,

    /// Glob patterns selecting library binaries the sources compile against
    pub binaries: Vec<String>,

    /// Classpath entries, in order
    pub classpath: Vec<PathBuf>,

    /// Directory the front-end writes artifacts into
    pub output_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            include: vec!["src/**/*.java".to_string(), "src/**/*.scala".to_string()],
            binaries: vec!["lib/**/*.jar".to_string()],
            classpath: Vec::new(),
            output_dir: PathBuf::from("target/classes"),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Incremental settings
        if other.incremental.classfile_manager.is_some() {
            self.incremental.classfile_manager = other.incremental.classfile_manager;
        }
        if other.incremental.recompile_all_fraction.is_some() {
            self.incremental.recompile_all_fraction = other.incremental.recompile_all_fraction;
        }
        if other.incremental.strict.is_some() {
            self.incremental.strict = other.incremental.strict;
        }

        // Source layout: a table that differs from the default replaces it
        let defaults = SourceConfig::default();
        if other.sources.include != defaults.include {
            self.sources.include = other.sources.include;
        }
        if other.sources.binaries != defaults.binaries {
            self.sources.binaries = other.sources.binaries;
        }
        if !other.sources.classpath.is_empty() {
            self.sources.classpath = other.sources.classpath;
        }
        if other.sources.output_dir != defaults.output_dir {
            self.sources.output_dir = other.sources.output_dir;
        }
    }

    /// Resolve the `[incremental]` table against the defaults.
    pub fn incremental_options(&self) -> Result<IncrementalOptions> {
        let defaults = IncrementalOptions::default();
        let fraction = self
            .incremental
            .recompile_all_fraction
            .unwrap_or(defaults.recompile_all_fraction);
        if !(0.0..=1.0).contains(&fraction) {
            bail!(
                "recompile-all-fraction must be between 0.0 and 1.0, got {}",
                fraction
            );
        }

        Ok(IncrementalOptions {
            classfile_manager: self
                .incremental
                .classfile_manager
                .clone()
                .unwrap_or(defaults.classfile_manager),
            recompile_all_fraction: fraction,
            strict: self.incremental.strict.unwrap_or(defaults.strict),
        })
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.drydock/config.toml)
/// 2. Global config (~/.drydock/config.toml)
/// 3. Defaults
///
/// A missing file contributes nothing. A file that exists but does not
/// parse is an error: falling back to defaults could silently swap the
/// rollback policy.
pub fn load_config(global_path: &Path, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    for path in [global_path, project_path] {
        if path.exists() {
            config.merge(Config::load(path)?);
        }
    }

    Ok(config)
}

/// Get the global drydock config directory (~/.drydock).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(STATE_DIR))
}

/// Get the global config path (~/.drydock/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project state directory (.drydock).
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR)
}

/// Get the project config path (.drydock/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("config.toml")
}

/// Get the saved build record path (.drydock/record.json).
pub fn record_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join(RECORD_FILE)
}
