//! Configuration for the multiplexer.
//!
//! Configuration is read from a TOML file and then patched from environment
//! variables. Everything has a default, so a missing file is not an error.
//!
//! # Configuration Location
//!
//! By default, configuration is read from `<config dir>/dap-mux/config.toml`
//! (`~/.config/dap-mux/config.toml` on Linux). This can be overridden with the
//! `DAP_MUX_CONFIG_PATH` environment variable.
//!
//! # Example
//!
//! ```toml
//! skip_files = ["**/node_modules/**", "<node_internals>/**", "!**/node_modules/my-lib/**"]
//! path_case = "auto"
//! pattern_debounce_ms = 500
//! debug_type = "pwa-node"
//!
//! [log]
//! level = "info"
//! json = false
//! ```

use crate::error::{MuxError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "DAP_MUX_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "DAP_MUX_LOG_LEVEL";
pub const ENV_SKIP_FILES: &str = "DAP_MUX_SKIP_FILES";
pub const ENV_PATH_CASE: &str = "DAP_MUX_PATH_CASE";

/// Default delay for coalescing blackbox pattern pushes.
pub const DEFAULT_PATTERN_DEBOUNCE_MS: u64 = 500;

const MAX_PATTERN_DEBOUNCE_MS: u64 = 60_000;

/// How paths and URLs are compared against skip globs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCase {
    /// Follow the host filesystem convention.
    #[default]
    Auto,
    /// Byte-exact comparison.
    Sensitive,
    /// Case-folded comparison.
    Insensitive,
}

impl PathCase {
    /// Resolve [`PathCase::Auto`] for the host platform.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(any(windows, target_os = "macos")) => Self::Insensitive,
            Self::Auto => Self::Sensitive,
            other => other,
        }
    }

    /// Whether comparisons should fold case once resolved.
    pub fn is_insensitive(self) -> bool {
        self.resolve() == Self::Insensitive
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Sensitive => "sensitive",
            Self::Insensitive => "insensitive",
        }
    }
}

impl std::str::FromStr for PathCase {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sensitive" | "case-sensitive" => Ok(Self::Sensitive),
            "insensitive" | "case-insensitive" => Ok(Self::Insensitive),
            _ => Err(MuxError::config(format!(
                "Invalid path case '{}'. Must be one of: auto, sensitive, insensitive",
                s
            ))),
        }
    }
}

impl std::fmt::Display for PathCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Write to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// Top-level multiplexer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Skip globs, including `<node_internals>/` entries and `!` negations.
    pub skip_files: Vec<String>,
    /// Case handling for glob matching and URL normalization.
    pub path_case: PathCase,
    /// Debounce window for blackbox pattern pushes.
    pub pattern_debounce_ms: u64,
    /// `type` placed in nested-session configurations.
    pub debug_type: String,
    pub log: LogConfig,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            skip_files: Vec::new(),
            path_case: PathCase::Auto,
            pattern_debounce_ms: DEFAULT_PATTERN_DEBOUNCE_MS,
            debug_type: "pwa-node".to_string(),
            log: LogConfig::default(),
        }
    }
}

impl MuxConfig {
    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("dap-mux").join("config.toml"))
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when no file
    /// exists, then apply environment overrides.
    pub fn load_or_default() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are ignored and logged.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }

        if let Some(globs) = lookup(ENV_SKIP_FILES) {
            self.skip_files = globs
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(case) = lookup(ENV_PATH_CASE) {
            match case.parse() {
                Ok(case) => self.path_case = case,
                Err(e) => debug!(error = %e, "Ignoring {}", ENV_PATH_CASE),
            }
        }
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.pattern_debounce_ms == 0 || self.pattern_debounce_ms > MAX_PATTERN_DEBOUNCE_MS {
            return Err(MuxError::config(format!(
                "pattern_debounce_ms must be within 1..={}, got {}",
                MAX_PATTERN_DEBOUNCE_MS, self.pattern_debounce_ms
            )));
        }

        if self.debug_type.trim().is_empty() {
            return Err(MuxError::config("debug_type must not be empty"));
        }

        if let Some(glob) = self
            .skip_files
            .iter()
            .find(|g| g.trim().is_empty() || g.trim() == "!")
        {
            return Err(MuxError::config(format!("Empty skip glob: {:?}", glob)));
        }

        Ok(())
    }

    pub fn pattern_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pattern_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = MuxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pattern_debounce_ms, 500);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_toml() {
        let config: MuxConfig = toml::from_str(
            r#"
            skip_files = ["**/node_modules/**", "<node_internals>/**"]
            path_case = "insensitive"
            pattern_debounce_ms = 250

            [log]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.skip_files.len(), 2);
        assert_eq!(config.path_case, PathCase::Insensitive);
        assert_eq!(config.pattern_debounce_ms, 250);
        assert_eq!(config.debug_type, "pwa-node");
        assert!(config.log.json);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_LOG_LEVEL, "trace"),
            (ENV_SKIP_FILES, "**/vendor/**, ,<node_internals>/**"),
            (ENV_PATH_CASE, "sensitive"),
        ]);

        let mut config = MuxConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.log.level, "trace");
        assert_eq!(config.skip_files, vec!["**/vendor/**", "<node_internals>/**"]);
        assert_eq!(config.path_case, PathCase::Sensitive);
    }

    #[test]
    fn test_bad_path_case_override_is_ignored() {
        let mut config = MuxConfig::default();
        config.apply_overrides_from(|key| (key == ENV_PATH_CASE).then(|| "sideways".to_string()));
        assert_eq!(config.path_case, PathCase::Auto);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MuxConfig::default();
        config.pattern_debounce_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MuxConfig::default();
        config.skip_files = vec!["!".to_string()];
        assert!(config.validate().is_err());

        let mut config = MuxConfig::default();
        config.debug_type = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "skip_files = [\"**/dist/**\"]\n").unwrap();

        let config = MuxConfig::load(&path).unwrap();
        assert_eq!(config.skip_files, vec!["**/dist/**"]);

        std::fs::write(&path, "pattern_debounce_ms = 0\n").unwrap();
        assert!(matches!(MuxConfig::load(&path), Err(MuxError::Config(_))));
    }

    #[test]
    fn test_path_case_resolution() {
        assert_eq!(PathCase::Sensitive.resolve(), PathCase::Sensitive);
        assert_eq!(PathCase::Insensitive.resolve(), PathCase::Insensitive);
        assert_ne!(PathCase::Auto.resolve(), PathCase::Auto);
        assert_eq!("Case-Insensitive".parse::<PathCase>().unwrap(), PathCase::Insensitive);
    }
}
