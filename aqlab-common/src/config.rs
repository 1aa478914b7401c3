//! Configuration loading (spec.md §6 "Environment / configuration").
//!
//! Recognized keys, layered CLI arg → environment variable → TOML file →
//! compiled default, the same priority order `wkmp-common::config` uses for
//! root-folder resolution.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration for the lab core. Every field has a recognized
/// environment-variable override of the same name, upper-cased with `.`
/// replaced by `_` (e.g. `storage.artifacts_path` → `STORAGE_ARTIFACTS_PATH`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scanner: ScannerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5730,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "aqlab.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub default_interval: String,
    pub worker_count: usize,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            default_interval: "15m".to_string(),
            worker_count: 4,
            batch_size: 100,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifacts_path: PathBuf,
    pub temp_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifacts_path: PathBuf::from("./artifacts"),
            temp_path: PathBuf::from("./tmp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub prober_path: String,
    pub decoder_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            prober_path: "ffprobe".to_string(),
            decoder_path: "ffmpeg".to_string(),
        }
    }
}

/// Analysis-pipeline tuning knobs (spec.md §4.6). Not part of the literal
/// §6 key list but ambient configuration for a window bound the spec names
/// as "configurable".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analysis window, seconds. `0` means "entire track".
    pub max_duration_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { max_duration_secs: 60 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            scanner: ScannerConfig::default(),
            storage: StorageConfig::default(),
            tools: ToolsConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, starting from a compiled default, overlaying a
    /// TOML file if `config_path` is given or a default path exists, then
    /// overlaying recognized environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_toml_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("SERVER_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("DATABASE_DSN") {
            self.database.dsn = v;
        }
        if let Ok(v) = std::env::var("SCANNER_DEFAULT_INTERVAL") {
            self.scanner.default_interval = v;
        }
        if let Ok(v) = std::env::var("SCANNER_WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                self.scanner.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("SCANNER_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                self.scanner.batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("SCANNER_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.scanner.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("STORAGE_ARTIFACTS_PATH") {
            self.storage.artifacts_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("STORAGE_TEMP_PATH") {
            self.storage.temp_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TOOLS_PROBER_PATH") {
            self.tools.prober_path = v;
        }
        if let Ok(v) = std::env::var("TOOLS_DECODER_PATH") {
            self.tools.decoder_path = v;
        }
        if let Ok(v) = std::env::var("ANALYSIS_MAX_DURATION_SECS") {
            if let Ok(n) = v.parse() {
                self.analysis.max_duration_secs = n;
            }
        }
    }
}

/// `~/.config/aqlab/config.toml` on Linux/macOS, the platform config dir
/// elsewhere. Mirrors `wkmp-common::config::load_config_file`'s priority
/// but without the `/etc` fallback (this is a single-operator tool, not a
/// system service with a packaged default).
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("aqlab").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 5730);
        assert_eq!(config.scanner.worker_count, 4);
        assert_eq!(config.scanner.max_retries, 3);
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [scanner]
            worker_count = 8
            default_interval = "30m"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scanner.worker_count, 8);
        assert_eq!(config.scanner.default_interval, "30m");
        // Unspecified sections still get their defaults.
        assert_eq!(config.server.port, 5730);
    }

    #[test]
    fn env_overrides_win_over_file_and_default() {
        std::env::set_var("SCANNER_WORKER_COUNT", "16");
        let config = Config::load(None).unwrap();
        assert_eq!(config.scanner.worker_count, 16);
        std::env::remove_var("SCANNER_WORKER_COUNT");
    }
}
