use crate::models::DeckConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Prefix of environment variables overriding settings, e.g. `ADBDECK_ADB_PATH`
pub const ENV_PREFIX: &str = "ADBDECK";

/// Name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "adbdeck.yaml";

/// Configuration manager for loading and saving the settings file.
///
/// Settings are layered: built-in defaults, then `adbdeck.yaml` (optional),
/// then `ADBDECK_*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `adbdeck.yaml`; created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load settings from the file and the process environment.
    ///
    /// # Returns
    /// The merged DeckConfig; defaults fill anything neither layer sets
    pub fn load_settings(&self) -> Result<DeckConfig> {
        self.load_with_env(None)
    }

    /// Load settings with an explicit environment instead of the process one.
    pub fn load_with_env(&self, env: Option<config::Map<String, String>>) -> Result<DeckConfig> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let config: DeckConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(config)
    }

    /// Save the settings file.
    ///
    /// # Arguments
    /// * `config` - The DeckConfig to save
    pub fn save_settings(&self, config: &DeckConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager.load_with_env(Some(config::Map::new())).unwrap();
        assert_eq!(loaded, DeckConfig::default());
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = DeckConfig {
            adb_path: "/opt/platform-tools/adb".to_string(),
            batch_size: 25,
            ..DeckConfig::default()
        };
        manager.save_settings(&config).unwrap();

        let loaded = manager.load_with_env(Some(config::Map::new())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "batch_size: 10\ndebug_mode: false\n").unwrap();

        let mut env = config::Map::new();
        env.insert("ADBDECK_BATCH_SIZE".to_string(), "75".to_string());
        env.insert("ADBDECK_DEBUG_MODE".to_string(), "true".to_string());

        let loaded = manager.load_with_env(Some(env)).unwrap();
        assert_eq!(loaded.batch_size, 75);
        assert!(loaded.debug_mode);
        assert_eq!(loaded.adb_path, "adb");
    }
}
