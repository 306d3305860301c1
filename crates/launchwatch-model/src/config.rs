//! Settings parser for .launchwatch/config.toml

use std::path::Path;

use serde::{Deserialize, Serialize};

use launchwatch_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const LAUNCHWATCH_DIR: &str = ".launchwatch";

/// Model-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub launches: LaunchSettings,
}

/// `[launches]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Purge terminated launches whenever a new one is created
    pub auto_clear_terminated: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from .launchwatch/config.toml
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(project_path: &Path) -> ModelSettings {
    let config_path = project_path.join(LAUNCHWATCH_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return ModelSettings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                ModelSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            ModelSettings::default()
        }
    }
}

/// Strict variant of [`load_settings`] for callers that name a file explicitly
pub fn load_settings_file(config_path: &Path) -> Result<ModelSettings> {
    if !config_path.exists() {
        return Err(Error::ConfigNotFound {
            path: config_path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(config_path)?;
    Ok(toml::from_str(&content)?)
}

/// Create a commented default config in the .launchwatch/ directory
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let dir = project_path.join(LAUNCHWATCH_DIR);

    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::config(format!("Failed to create .launchwatch dir: {}", e)))?;
    }

    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# launchwatch configuration

[launches]
# Drop terminated launches each time a new launch starts
auto_clear_terminated = false
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert!(!settings.launches.auto_clear_terminated);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".launchwatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "[launches]\nauto_clear_terminated = true\n",
        )
        .unwrap();

        let settings = load_settings(temp.path());

        assert!(settings.launches.auto_clear_terminated);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".launchwatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[launches\nbroken").unwrap();

        assert_eq!(load_settings(temp.path()), ModelSettings::default());
    }

    #[test]
    fn test_load_settings_file_missing() {
        let temp = tempdir().unwrap();
        let err = load_settings_file(&temp.path().join("nope.toml")).unwrap_err();

        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_init_config_dir_writes_loadable_defaults() {
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let path = temp.path().join(".launchwatch").join("config.toml");
        assert!(path.exists());
        assert_eq!(load_settings_file(&path).unwrap(), ModelSettings::default());
    }

    #[test]
    fn test_init_config_dir_keeps_existing_file() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".launchwatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "[launches]\nauto_clear_terminated = true\n",
        )
        .unwrap();

        init_config_dir(temp.path()).unwrap();

        assert!(load_settings(temp.path()).launches.auto_clear_terminated);
    }
}
