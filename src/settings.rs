use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// On-disk defaults for values the CLI may override. A malformed file is
/// treated as empty rather than fatal; a missing one is normal on first
/// run.
pub struct SettingsStore {
    path: PathBuf,
    data: Settings,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Settings::default()
        };

        Ok(Self { path, data })
    }

    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("no platform config directory"))?;
        Ok(base.join("kadence").join("settings.json"))
    }

    pub fn settings(&self) -> &Settings {
        &self.data
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).unwrap();
        assert!(store.settings().api_key.is_none());
        assert!(store.settings().api_url.is_none());
    }

    #[test]
    fn reads_configured_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"api_key":"from-file","api_url":"https://collector.example.com/api/v1"}"#,
        )
        .unwrap();

        let store = SettingsStore::load(path).unwrap();
        assert_eq!(store.settings().api_key.as_deref(), Some("from-file"));
        assert_eq!(
            store.settings().api_url.as_deref(),
            Some("https://collector.example.com/api/v1")
        );
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = SettingsStore::load(path).unwrap();
        assert!(store.settings().api_key.is_none());
    }
}
