//! Configuration for capflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CAPFLOW_HOME, CAPFLOW_RESULTS_LOG,
//!    CAPFLOW_MAX_CONCURRENT, CAPFLOW_CACHE_CAPACITY, CAPFLOW_REQUEST_TIMEOUT_MS)
//! 2. Config file (.capflow/config.yaml)
//! 3. Defaults (~/.capflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .capflow/config.yaml
//! - Paths in config file are relative to the .capflow/ directory

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::PipelineSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .capflow/)
    pub home: Option<String>,
    /// Result log file (relative to .capflow/)
    pub results_log: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to capflow home
    pub home: PathBuf,
    /// Result log file
    pub results_log: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Pipeline settings after environment overrides
    pub pipeline: PipelineSettings,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".capflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Read and parse an environment variable, if set
fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", name, raw, e)),
        Err(_) => Ok(None),
    }
}

/// Apply CAPFLOW_* overrides to pipeline settings
fn apply_env_overrides(settings: &mut PipelineSettings) -> Result<()> {
    if let Some(value) = env_override("CAPFLOW_MAX_CONCURRENT")? {
        settings.max_concurrent = value;
    }
    if let Some(value) = env_override("CAPFLOW_CACHE_CAPACITY")? {
        settings.cache_capacity = value;
    }
    if let Some(value) = env_override("CAPFLOW_REQUEST_TIMEOUT_MS")? {
        settings.request_timeout_ms = value;
    }
    Ok(())
}

/// Resolve configuration from an optional config file plus environment
fn resolve(config_file: Option<PathBuf>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".capflow");

    let (home, results_log, mut pipeline) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        let capflow_dir = config_path.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("CAPFLOW_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(capflow_dir, home_path)
        } else {
            default_home
        };

        let results_log = config
            .paths
            .results_log
            .as_deref()
            .map(|p| resolve_path(capflow_dir, p));

        (home, results_log, config.pipeline)
    } else {
        let home = std::env::var("CAPFLOW_HOME")
            .map(PathBuf::from)
            .unwrap_or(default_home);

        (home, None, PipelineSettings::default())
    };

    let results_log = match std::env::var("CAPFLOW_RESULTS_LOG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => results_log.unwrap_or_else(|| home.join("results.jsonl")),
    };

    apply_env_overrides(&mut pipeline)?;
    pipeline.validate().context("Invalid pipeline settings")?;

    Ok(ResolvedConfig {
        home,
        results_log,
        config_file,
        pipeline,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    resolve(find_config_file(&cwd))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (bypasses the cache)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Load configuration from an explicit config file
pub fn load_from(path: &Path) -> Result<ResolvedConfig> {
    resolve(Some(path.to_path_buf()))
}

/// Get the result log path
pub fn results_log_path() -> Result<PathBuf> {
    Ok(config()?.results_log.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BroadcastMode;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let capflow_dir = dir.join(".capflow");
        std::fs::create_dir_all(&capflow_dir).unwrap();
        let config_path = capflow_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", content).unwrap();
        config_path
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1.0"
paths:
  home: ./state
  results_log: ./state/results.jsonl
pipeline:
  max_concurrent: 2
  cache_capacity: 10
  max_queue_depth: 50
  broadcast_mode: latest_only
"#,
        );

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./state".to_string()));
        assert_eq!(config.pipeline.max_concurrent, 2);
        assert_eq!(config.pipeline.cache_capacity, 10);
        assert_eq!(config.pipeline.max_queue_depth, Some(50));
        assert_eq!(config.pipeline.broadcast_mode, BroadcastMode::LatestOnly);
        // Unspecified settings keep their defaults
        assert_eq!(config.pipeline.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_config_without_pipeline_section() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(temp.path(), "version: \"1.0\"");

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert!(config.paths.results_log.is_none());
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(temp.path(), "version: \"1.0\"");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(config_path));
    }

    #[test]
    fn test_resolve_paths_relative_to_config_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1.0"
paths:
  results_log: logs/results.jsonl
"#,
        );

        let config = load_from(&config_path).unwrap();
        if std::env::var("CAPFLOW_RESULTS_LOG").is_err() {
            assert_eq!(
                config.results_log,
                temp.path().join(".capflow").join("logs/results.jsonl")
            );
        }
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1.0"
pipeline:
  max_concurrent: 0
"#,
        );

        if std::env::var("CAPFLOW_MAX_CONCURRENT").is_err() {
            assert!(load_from(&config_path).is_err());
        }
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.capflow");

        assert_eq!(
            resolve_path(&base, "./state"),
            PathBuf::from("/home/user/project/.capflow/./state")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
