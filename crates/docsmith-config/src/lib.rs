//! Configuration management for docsmith.
//!
//! Parses `docsmith.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `diagrams.kroki_url`
//! - `cache.dir`

mod expand;

use docsmith_diagrams::{DEFAULT_CONCURRENCY as DEFAULT_RENDER_CONCURRENCY, DEFAULT_TIMEOUT};
use docsmith_sources::DEFAULT_READ_CONCURRENCY;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override source roots.
    pub roots: Option<Vec<PathBuf>>,
    /// Override include globs.
    pub include: Option<Vec<String>>,
    /// Override exclude globs.
    pub exclude: Option<Vec<String>>,
    /// Override `.gitignore` collection.
    pub use_default_patterns: Option<bool>,
    /// Override hidden file handling.
    pub include_hidden: Option<bool>,
    /// Render through Kroki at this URL.
    pub kroki_url: Option<String>,
    /// Override strict diagram rendering.
    pub strict: Option<bool>,
    /// Override the cache temp root.
    pub cache_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "docsmith.toml";

/// Cache temp root, relative to the project directory.
const DEFAULT_CACHE_DIR: &str = ".docsmith/tmp";


/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source selection (paths are relative strings from TOML).
    sources: SourcesConfigRaw,
    /// Diagram rendering configuration (optional section).
    diagrams: Option<DiagramsConfigRaw>,
    /// Cache configuration.
    cache: CacheConfigRaw,

    /// Resolved sources configuration (set after loading).
    #[serde(skip)]
    pub sources_resolved: SourcesConfig,
    /// Resolved diagrams configuration, if the section is present.
    #[serde(skip)]
    pub diagrams_resolved: Option<DiagramsConfig>,
    /// Cache temp root (set after loading).
    #[serde(skip)]
    pub cache_dir: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw sources configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SourcesConfigRaw {
    roots: Option<Vec<String>>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    use_default_patterns: Option<bool>,
    include_hidden: Option<bool>,
    read_concurrency: Option<usize>,
}

/// Resolved source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcesConfig {
    /// Root paths (directories or files).
    pub roots: Vec<PathBuf>,
    /// Include globs; `None` selects every file.
    pub include: Option<Vec<String>>,
    /// Exclude globs, added to the default denylist.
    pub exclude: Vec<String>,
    /// Whether `.gitignore` rules are collected.
    pub use_default_patterns: bool,
    /// Whether dot-files and dot-directories are considered.
    pub include_hidden: bool,
    /// Maximum concurrent file reads.
    pub read_concurrency: usize,
}

impl SourcesConfig {
    fn with_base(base: &Path) -> Self {
        Self {
            roots: vec![base.to_path_buf()],
            include: None,
            exclude: Vec::new(),
            use_default_patterns: true,
            include_hidden: false,
            read_concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self::with_base(Path::new("."))
    }
}

/// Raw diagrams configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DiagramsConfigRaw {
    renderer: Option<String>,
    kroki_url: Option<String>,
    command: Option<Vec<String>>,
    kind: Option<String>,
    format: Option<String>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    strict: Option<bool>,
    options: BTreeMap<String, String>,
}

/// Which renderer produces diagram assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererConfig {
    /// Kroki HTTP service.
    Kroki {
        /// Server base URL.
        url: String,
    },
    /// Local program reading source on stdin and writing the asset to stdout.
    Command {
        /// Executable name or path.
        program: String,
        /// Program arguments.
        args: Vec<String>,
    },
}

/// Resolved diagram rendering configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramsConfig {
    /// Renderer selection.
    pub renderer: RendererConfig,
    /// Diagram kind (e.g., `mermaid`).
    pub kind: String,
    /// Output format (`svg` or `png`).
    pub format: String,
    /// Maximum renders in flight.
    pub concurrency: usize,
    /// Per-render timeout.
    pub timeout: Duration,
    /// Fail documents on render errors instead of keeping the source.
    pub strict: bool,
    /// Renderer options, part of the cache key.
    pub options: BTreeMap<String, String>,
}

impl DiagramsConfig {
    /// Defaults for rendering through Kroki at `url`.
    #[must_use]
    pub fn kroki(url: impl Into<String>) -> Self {
        Self {
            renderer: RendererConfig::Kroki { url: url.into() },
            kind: "mermaid".to_owned(),
            format: "svg".to_owned(),
            concurrency: DEFAULT_RENDER_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            strict: false,
            options: BTreeMap::new(),
        }
    }

    /// Validate renderer settings and limits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.renderer {
            RendererConfig::Kroki { url } => {
                require_non_empty(url, "diagrams.kroki_url")?;
                require_http_url(url, "diagrams.kroki_url")?;
            }
            RendererConfig::Command { program, .. } => {
                require_non_empty(program, "diagrams.command")?;
            }
        }
        require_non_empty(&self.kind, "diagrams.kind")?;
        if !matches!(self.format.as_str(), "svg" | "png") {
            return Err(ConfigError::Validation(format!(
                "diagrams.format must be \"svg\" or \"png\", got \"{}\"",
                self.format
            )));
        }
        require_positive(self.concurrency, "diagrams.concurrency")?;
        if self.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "diagrams.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    dir: Option<String>,
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
        /// Config field path (e.g., "`diagrams.kroki_url`").
        field: String,
        /// Error message (e.g., "${`KROKI_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn require_positive(value: usize, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

/// Join `path` onto `base`, keeping `.` as the base itself.
fn resolve_path(base: &Path, path: &str) -> PathBuf {
    if path == "." {
        base.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `docsmith.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated last.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = std::env::current_dir()
            .ok()
            .and_then(|cwd| Self::discover_config(&cwd))
        {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the diagrams configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if no renderer is configured.
    pub fn require_diagrams(&self) -> Result<&DiagramsConfig, ConfigError> {
        self.diagrams_resolved.as_ref().ok_or_else(|| {
            ConfigError::Validation(
                "[diagrams] section or --kroki-url required to render diagrams".into(),
            )
        })
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            self.sources_resolved.read_concurrency,
            "sources.read_concurrency",
        )?;
        if self.sources_resolved.roots.is_empty() {
            return Err(ConfigError::Validation(
                "sources.roots cannot be empty".to_owned(),
            ));
        }
        if let Some(diagrams) = &self.diagrams_resolved {
            diagrams.validate()?;
        }
        Ok(())
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        let sources = &mut self.sources_resolved;
        if let Some(roots) = &settings.roots {
            sources.roots.clone_from(roots);
        }
        if let Some(include) = &settings.include {
            sources.include = Some(include.clone());
        }
        if let Some(exclude) = &settings.exclude {
            sources.exclude.clone_from(exclude);
        }
        if let Some(use_default_patterns) = settings.use_default_patterns {
            sources.use_default_patterns = use_default_patterns;
        }
        if let Some(include_hidden) = settings.include_hidden {
            sources.include_hidden = include_hidden;
        }
        if let Some(kroki_url) = &settings.kroki_url {
            self.diagrams_resolved
                .get_or_insert_with(|| DiagramsConfig::kroki(kroki_url.clone()))
                .renderer = RendererConfig::Kroki {
                url: kroki_url.clone(),
            };
        }
        if let Some(strict) = settings.strict
            && let Some(diagrams) = &mut self.diagrams_resolved
        {
            diagrams.strict = strict;
        }
        if let Some(cache_dir) = &settings.cache_dir {
            self.cache_dir.clone_from(cache_dir);
        }
    }

    /// Search for config file in `start` and its parents.
    fn discover_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
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
            sources: SourcesConfigRaw::default(),
            diagrams: None,
            cache: CacheConfigRaw::default(),
            sources_resolved: SourcesConfig::with_base(base),
            diagrams_resolved: None,
            cache_dir: base.join(DEFAULT_CACHE_DIR),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut diagrams) = self.diagrams
            && let Some(ref url) = diagrams.kroki_url
        {
            diagrams.kroki_url = Some(expand::expand_env(url, "diagrams.kroki_url")?);
        }
        if let Some(ref dir) = self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }
        Ok(())
    }

    /// Resolve relative paths against the config directory and build the
    /// renderer selection.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let raw = &self.sources;
        let roots = match &raw.roots {
            Some(roots) => roots.iter().map(|r| resolve_path(config_dir, r)).collect(),
            None => vec![config_dir.to_path_buf()],
        };
        self.sources_resolved = SourcesConfig {
            roots,
            include: raw.include.clone(),
            exclude: raw.exclude.clone().unwrap_or_default(),
            use_default_patterns: raw.use_default_patterns.unwrap_or(true),
            include_hidden: raw.include_hidden.unwrap_or(false),
            read_concurrency: raw.read_concurrency.unwrap_or(DEFAULT_READ_CONCURRENCY),
        };

        self.cache_dir = resolve_path(
            config_dir,
            self.cache.dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR),
        );

        self.diagrams_resolved = self
            .diagrams
            .as_ref()
            .map(resolve_diagrams)
            .transpose()?;

        Ok(())
    }
}

/// Build the renderer selection from the raw `[diagrams]` section.
fn resolve_diagrams(raw: &DiagramsConfigRaw) -> Result<DiagramsConfig, ConfigError> {
    let renderer = match raw.renderer.as_deref().unwrap_or("kroki") {
        "kroki" => {
            let url = raw.kroki_url.clone().ok_or_else(|| {
                ConfigError::Validation(
                    "[diagrams] renderer \"kroki\" requires kroki_url to be set".to_owned(),
                )
            })?;
            RendererConfig::Kroki { url }
        }
        "command" => {
            let mut command = raw.command.clone().unwrap_or_default().into_iter();
            let program = command.next().ok_or_else(|| {
                ConfigError::Validation(
                    "[diagrams] renderer \"command\" requires command to be set".to_owned(),
                )
            })?;
            RendererConfig::Command {
                program,
                args: command.collect(),
            }
        }
        other => {
            return Err(ConfigError::Validation(format!(
                "diagrams.renderer must be \"kroki\" or \"command\", got \"{other}\""
            )));
        }
    };

    Ok(DiagramsConfig {
        renderer,
        kind: raw.kind.clone().unwrap_or_else(|| "mermaid".to_owned()),
        format: raw.format.clone().unwrap_or_else(|| "svg".to_owned()),
        concurrency: raw.concurrency.unwrap_or(DEFAULT_RENDER_CONCURRENCY),
        timeout: raw.timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        strict: raw.strict.unwrap_or(false),
        options: raw.options.clone(),
    })
}
