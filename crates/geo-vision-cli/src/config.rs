//! Configuration loading and resolution.

use std::path::PathBuf;

use geo_vision::GeoVisionConfig;

pub const CONFIG_ENV: &str = "GEO_VISION_CONFIG";
pub const ENDPOINT_ENV: &str = "GEO_VISION_ENDPOINT";
pub const MODEL_ENV: &str = "GEO_VISION_MODEL";
pub const API_KEY_ENV: &str = "GEO_VISION_API_KEY";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llava";

/// Resolve the config file path, if any.
///
/// Order: explicit path, `GEO_VISION_CONFIG`, then `./.geo-vision/config.json`
/// when it exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(".geo-vision/config.json");
    cwd_config.exists().then_some(cwd_config)
}

/// Load the effective block configuration. No file means built-in defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<GeoVisionConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = GeoVisionConfig::read_from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?;
            tracing::info!("Config: {}", path.display());
            Ok(config)
        }
        None => Ok(GeoVisionConfig::default()),
    }
}

/// Where and how to reach the vision model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl EndpointSettings {
    /// Flag > env var > default, per setting.
    pub fn resolve(endpoint: Option<String>, model: Option<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint
                .or_else(|| non_empty_env(ENDPOINT_ENV))
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model
                .or_else(|| non_empty_env(MODEL_ENV))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: api_key.or_else(|| non_empty_env(API_KEY_ENV)),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_config_path(Some("/etc/geo-vision.json")).unwrap();
        assert_eq!(path, PathBuf::from("/etc/geo-vision.json"));
    }

    #[test]
    fn test_explicit_settings_win() {
        let settings = EndpointSettings::resolve(
            Some("http://vision.local/v1/chat/completions".to_string()),
            Some("qwen-vl".to_string()),
            Some("secret".to_string()),
        );
        assert_eq!(settings.endpoint, "http://vision.local/v1/chat/completions");
        assert_eq!(settings.model, "qwen-vl");
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"nearby_limit": 3}"#).unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.nearby_limit, 3);
        assert_eq!(config.recent_memory_limit, 15);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some("/nonexistent/geo-vision/config.json")).is_err());
    }
}
