use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::curriculum::Language;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub speech_model: String,
    pub voice_name: String,
    /// Starting language of the session, "ar" or "en".
    pub language: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-3-flash-preview".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice_name: "Kore".to_string(),
            language: "ar".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("discover-teacher");
        config_dir.join("config.toml")
    }

    pub fn load() -> Self {
        let path = Self::config_path();

        if path.exists() {
            if let Some(config) = Self::load_from(&path) {
                return config.with_env_fallback();
            }
        }

        let config = Config::default().with_env_fallback();
        // Save defaults on first run, without the key picked up from the environment
        if let Err(e) = Config::default().save_to(&path) {
            log::warn!("Could not write default config: {}", e);
        }
        config
    }

    /// Read and parse a config file, logging and returning `None` on any failure.
    pub fn load_from(path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}. Using defaults.", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read config: {}. Using defaults.", e);
                None
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Use env vars as fallback if the key is empty
    fn with_env_fallback(mut self) -> Self {
        if self.gemini_api_key.is_empty() {
            if let Some(key) = ["GEMINI_API_KEY", "API_KEY"]
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
            {
                self.gemini_api_key = key;
            }
        }
        self
    }

    pub fn initial_language(&self) -> Language {
        match self.language.as_str() {
            "en" | "EN" => Language::En,
            _ => Language::Ar,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_gemini() {
        let config = Config::default();
        assert!(config.base_url.contains("generativelanguage.googleapis.com"));
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.initial_language(), Language::Ar);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.language = "en".to_string();
        config.request_timeout_secs = 15;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.initial_language(), Language::En);
        assert_eq!(loaded.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "voice_name = \"Puck\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.voice_name, "Puck");
        assert_eq!(loaded.text_model, Config::default().text_model);
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(Config::load_from(&path).is_none());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
