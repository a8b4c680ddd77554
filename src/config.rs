use crate::models::TimeWindow;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const CONFIG_FILE: &str = "tea-dashboard.toml";

/// Environment variable overriding `api_base_url`.
pub const API_URL_ENV: &str = "TEA_API_URL";
/// Environment variable overriding `log_level`.
pub const LOG_LEVEL_ENV: &str = "TEA_LOG_LEVEL";

/// Application configuration, loaded from `tea-dashboard.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub default_window: TimeWindow,
    pub log_dir: String,
    pub log_level: String,
    /// Overrides the durable storage file holding the session id.
    pub storage_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
            default_window: TimeWindow::Week,
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            storage_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration with the chain: `./tea-dashboard.toml` -> `~/tea-dashboard.toml`
    /// -> defaults, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_paths(&Self::config_paths());
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.normalize();
        config
    }

    /// First candidate that exists and parses wins.
    fn from_paths(paths: &[PathBuf]) -> Self {
        for path in paths {
            if let Ok(contents) = fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&contents) {
                    Ok(cfg) => return cfg,
                    Err(e) => {
                        eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                    }
                }
            }
        }
        Self::default()
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE));
        }
        paths
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
    }

    fn normalize(&mut self) {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api_base_url, "http://localhost:8001");
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.connect_timeout_secs, 5);
        assert_eq!(cfg.default_window, TimeWindow::Week);
        assert_eq!(cfg.log_dir, "logs");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.storage_path.is_none());
    }

    #[test]
    fn test_partial_toml_deserialize() {
        let toml_str = r#"
            api_base_url = "http://stats.internal:9000"
            default_window = "month"
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.api_base_url, "http://stats.internal:9000");
        assert_eq!(cfg.default_window, TimeWindow::Month);
        // Other fields should be defaults
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_full_toml_deserialize() {
        let toml_str = r#"
            api_base_url = "https://example.com/"
            request_timeout_secs = 10
            connect_timeout_secs = 2
            default_window = "day"
            log_dir = "my_logs"
            log_level = "debug"
            storage_path = "/tmp/tea/storage.json"
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.request_timeout_secs, 10);
        assert_eq!(cfg.connect_timeout_secs, 2);
        assert_eq!(cfg.default_window, TimeWindow::Day);
        assert_eq!(cfg.log_dir, "my_logs");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.storage_path, Some(PathBuf::from("/tmp/tea/storage.json")));
    }

    #[test]
    fn test_unknown_window_is_rejected() {
        let result = toml::from_str::<AppConfig>(r#"default_window = "year""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_and_trailing_slash() {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(|key| match key {
            API_URL_ENV => Some("http://10.0.0.5:8001/".to_string()),
            LOG_LEVEL_ENV => Some("  ".to_string()),
            _ => None,
        });
        cfg.normalize();
        assert_eq!(cfg.api_base_url, "http://10.0.0.5:8001");
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_from_paths_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = AppConfig::from_paths(&[tmp.path().join(CONFIG_FILE)]);
        assert_eq!(cfg.api_base_url, AppConfig::default().api_base_url);
        assert_eq!(cfg.request_timeout_secs, AppConfig::default().request_timeout_secs);
    }

    #[test]
    fn test_from_paths_skips_missing_and_broken_files() {
        let tmp = TempDir::new().unwrap();
        let broken = tmp.path().join("broken.toml");
        let good = tmp.path().join("good.toml");
        fs::write(&broken, "api_base_url = ").unwrap();
        fs::write(&good, r#"api_base_url = "http://stats.internal:9000""#).unwrap();

        let cfg = AppConfig::from_paths(&[tmp.path().join("absent.toml"), broken, good]);
        assert_eq!(cfg.api_base_url, "http://stats.internal:9000");
    }
}
