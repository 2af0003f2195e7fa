//! Configuration management for the DocBook importer.
//!
//! Parses `dbk.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ```toml
//! [import]
//! dialect = "5.0"
//! title_prefix_base = "TC"
//! all_section_levels = false
//! labels = ["imported"]
//!
//! [cache]
//! memory_capacity = 100
//! dir = "${XDG_CACHE_HOME:-.dbk}/dbk"
//!
//! [output]
//! dir = "wiki"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! String values support `${VAR}` and `${VAR:-default}`. Expanded fields:
//! - `import.title_prefix_base`
//! - `import.labels`
//! - `cache.dir`
//! - `output.dir`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override source dialect ("4.3" or "5.0").
    pub dialect: Option<String>,
    /// Override unique title prefix base.
    pub title_prefix_base: Option<String>,
    /// Override all-section-levels flag.
    pub all_section_levels: Option<bool>,
    /// Override external DTD loading.
    pub load_external_dtd: Option<bool>,
    /// Override persistent cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "dbk.toml";

/// Dialect keywords accepted in `import.dialect`.
const DIALECTS: &[&str] = &["4.3", "4", "5.0", "5"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Import configuration.
    pub import: ImportConfig,
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,
    /// Output configuration (paths are relative strings from TOML).
    output: OutputConfigRaw,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Resolved output configuration (set after loading).
    #[serde(skip)]
    pub output_resolved: OutputConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Import configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Source dialect keyword.
    pub dialect: String,
    /// Base used to build disambiguating title prefixes.
    pub title_prefix_base: Option<String>,
    /// Turn every nested section into its own page.
    pub all_section_levels: bool,
    /// Read entity declarations from the external DTD named in the DOCTYPE.
    pub load_external_dtd: bool,
    /// Labels added to every imported page.
    pub labels: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            dialect: "4.3".to_owned(),
            title_prefix_base: None,
            all_section_levels: false,
            load_external_dtd: true,
            labels: Vec::new(),
        }
    }
}

impl ImportConfig {
    /// Trimmed prefix base, `None` when unset or blank.
    pub fn prefix_base(&self) -> Option<&str> {
        self.title_prefix_base
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
    }

    /// Validate dialect and prefix base.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` on an unknown dialect or a prefix
    /// base that is not two or three letters or digits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !DIALECTS.contains(&self.dialect.trim()) {
            return Err(ConfigError::Validation(format!(
                "import.dialect must be one of {}",
                DIALECTS.join(", ")
            )));
        }
        if let Some(base) = self.prefix_base() {
            let len = base.chars().count();
            if !(2..=3).contains(&len) {
                return Err(ConfigError::Validation(
                    "import.title_prefix_base must be two or three characters long".to_owned(),
                ));
            }
            if !base.chars().all(char::is_alphanumeric) {
                return Err(ConfigError::Validation(
                    "import.title_prefix_base must contain only letters or digits".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    memory_capacity: Option<usize>,
    dir: Option<String>,
}

/// Resolved cache configuration with absolute paths.
#[derive(Debug)]
pub struct CacheConfig {
    /// Whether the persistent tier is used.
    pub enabled: bool,
    /// Entries kept in the memory tier.
    pub memory_capacity: usize,
    /// Directory of the persistent tier.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_capacity: 100,
            dir: PathBuf::from(".dbk/cache"),
        }
    }
}

impl CacheConfig {
    /// Persistent cache directory, `None` when disabled.
    #[must_use]
    pub fn persistent_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.dir.clone())
    }
}

/// Raw output configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OutputConfigRaw {
    dir: Option<String>,
}

/// Resolved output configuration.
#[derive(Debug, Default)]
pub struct OutputConfig {
    /// Directory receiving the generated page tree.
    pub dir: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`cache.dir`").
        field: String,
        /// Error message (e.g., "${`CACHE_DIR`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `dbk.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(dialect) = &settings.dialect {
            self.import.dialect.clone_from(dialect);
        }
        if let Some(base) = &settings.title_prefix_base {
            self.import.title_prefix_base = Some(base.clone());
        }
        if let Some(all_section_levels) = settings.all_section_levels {
            self.import.all_section_levels = all_section_levels;
        }
        if let Some(load_external_dtd) = settings.load_external_dtd {
            self.import.load_external_dtd = load_external_dtd;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.output_resolved.dir.clone_from(output_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            import: ImportConfig::default(),
            cache: CacheConfigRaw::default(),
            output: OutputConfigRaw::default(),
            cache_resolved: CacheConfig {
                dir: base.join(".dbk/cache"),
                ..CacheConfig::default()
            },
            output_resolved: OutputConfig {
                dir: base.join("wiki"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import.validate()?;
        if self.cache_resolved.memory_capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.memory_capacity must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref base) = self.import.title_prefix_base {
            self.import.title_prefix_base =
                Some(expand::expand_env(base, "import.title_prefix_base")?);
        }
        for label in &mut self.import.labels {
            *label = expand::expand_env(label, "import.labels")?;
        }
        if let Some(ref dir) = self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }
        if let Some(ref dir) = self.output.dir {
            self.output.dir = Some(expand::expand_env(dir, "output.dir")?);
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(true),
            memory_capacity: self.cache.memory_capacity.unwrap_or(100),
            dir: resolve(self.cache.dir.as_deref(), ".dbk/cache"),
        };
        self.output_resolved = OutputConfig {
            dir: resolve(self.output.dir.as_deref(), "wiki"),
        };
    }
}
