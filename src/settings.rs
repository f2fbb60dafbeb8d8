//! Settings persistence.
//!
//! The popup's key/value settings live in a single JSON file, by default
//! `~/.config/pure-glance/settings.json` (macOS:
//! `~/Library/Application Support/pure-glance/settings.json`).
//!
//! A missing file means "all defaults". Numeric values may arrive as
//! strings because the popup sliders store their raw input value.

use crate::classify::ClassificationPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

/// User-facing settings, serialized with the popup's key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub is_enabled: bool,
    pub is_logging_enabled: bool,
    /// Face area threshold in percent of the thumbnail area.
    #[serde(deserialize_with = "number_or_string")]
    pub threshold: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub face_count_threshold: u32,
    pub is_area_threshold_enabled: bool,
    pub is_face_count_enabled: bool,
    pub disable_on_subs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            is_logging_enabled: false,
            threshold: 5.0,
            face_count_threshold: 2,
            is_area_threshold_enabled: true,
            is_face_count_enabled: true,
            disable_on_subs: true,
        }
    }
}

impl Settings {
    pub fn policy(&self) -> ClassificationPolicy {
        ClassificationPolicy {
            area_ratio_threshold_percent: self.threshold,
            face_count_threshold: self.face_count_threshold,
            area_policy_enabled: self.is_area_threshold_enabled,
            count_policy_enabled: self.is_face_count_enabled,
        }
    }
}

/// Accept `5`, `5.0` or `"5"` for numeric settings.
fn number_or_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + serde::de::DeserializeOwned,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Value(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Apply stored key/values over the defaults one key at a time, skipping
/// unknown keys and values that don't fit their setting.
fn merge_stored(stored: Map<String, Value>) -> Settings {
    let mut settings = Settings::default();
    for (key, value) in stored {
        let mut candidate = match serde_json::to_value(&settings) {
            Ok(Value::Object(map)) => map,
            _ => return settings,
        };
        if !candidate.contains_key(&key) {
            log::debug!("[SETTINGS] Ignoring unknown stored key '{}'", key);
            continue;
        }
        candidate.insert(key.clone(), value);
        match serde_json::from_value::<Settings>(Value::Object(candidate)) {
            Ok(merged) => settings = merged,
            Err(e) => log::warn!("[SETTINGS] Ignoring stored '{}': {}", key, e),
        }
    }
    settings
}

/// Default settings directory: `<config_dir>/pure-glance/`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pure-glance")
        .join(SETTINGS_FILE)
}

/// File-backed settings store. Every read goes to disk so edits made by
/// another process are picked up on the next classification.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file does not exist.
    ///
    /// A stored value that doesn't parse only resets that one key.
    pub async fn load(&self) -> Result<Settings> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(stored)) => Ok(merge_stored(stored)),
                Ok(_) => Err(Error::Storage(format!(
                    "Invalid settings in {}: not a JSON object",
                    self.path.display()
                ))),
                Err(e) => Err(Error::Storage(format!(
                    "Invalid settings in {}: {}",
                    self.path.display(),
                    e
                ))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Persist settings, creating the parent directory if needed.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create settings dir: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", self.path.display(), e)))?;
        log::info!("[SETTINGS] Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Merge partial key/values into the stored settings and persist them.
    ///
    /// Unknown keys are rejected so a typo in the popup doesn't silently
    /// vanish.
    pub async fn update(&self, values: Map<String, Value>) -> Result<Settings> {
        let current = self.load().await?;
        let mut merged = match serde_json::to_value(&current) {
            Ok(Value::Object(map)) => map,
            _ => return Err(Error::Storage("Failed to serialize settings".to_string())),
        };

        for (key, value) in values {
            if !merged.contains_key(&key) {
                return Err(Error::Storage(format!("Unknown setting '{}'", key)));
            }
            merged.insert(key, value);
        }

        let updated: Settings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::Storage(format!("Invalid setting value: {}", e)))?;
        self.save(&updated).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> SettingsStore {
        let dir = std::env::temp_dir().join("pure-glance-settings-test").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        SettingsStore::at(dir.join(SETTINGS_FILE))
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let store = temp_store("missing");
        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.is_enabled);
        assert_eq!(settings.threshold, 5.0);
        assert_eq!(settings.face_count_threshold, 2);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let store = temp_store("partial");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"threshold": "12", "isFaceCountEnabled": false}"#).unwrap();

        let settings = store.load().await.unwrap();
        assert_eq!(settings.threshold, 12.0);
        assert!(!settings.is_face_count_enabled);
        assert!(settings.is_area_threshold_enabled);
        assert_eq!(settings.face_count_threshold, 2);
    }

    #[tokio::test]
    async fn bad_value_only_resets_its_own_key() {
        let store = temp_store("bad-value");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"isEnabled": false, "faceCountThreshold": "-1", "threshold": 9, "legacyKey": 1}"#,
        )
        .unwrap();

        let settings = store.load().await.unwrap();
        assert!(!settings.is_enabled);
        assert_eq!(settings.face_count_threshold, 2);
        assert_eq!(settings.threshold, 9.0);
    }

    #[tokio::test]
    async fn malformed_file_is_a_storage_error() {
        let store = temp_store("malformed");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn update_merges_and_persists() {
        let store = temp_store("update");
        let mut values = Map::new();
        values.insert("faceCountThreshold".to_string(), Value::String("4".to_string()));
        values.insert("isEnabled".to_string(), Value::Bool(false));

        let updated = store.update(values).await.unwrap();
        assert_eq!(updated.face_count_threshold, 4);
        assert!(!updated.is_enabled);

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, updated);
    }

    #[tokio::test]
    async fn update_rejects_unknown_keys() {
        let store = temp_store("unknown-key");
        let mut values = Map::new();
        values.insert("treshold".to_string(), Value::from(3));

        let err = store.update(values).await.unwrap_err();
        assert!(err.to_string().contains("treshold"));
    }

    #[test]
    fn policy_mirrors_settings() {
        let settings = Settings {
            threshold: 7.5,
            face_count_threshold: 3,
            is_area_threshold_enabled: false,
            ..Settings::default()
        };
        let policy = settings.policy();
        assert_eq!(policy.area_ratio_threshold_percent, 7.5);
        assert_eq!(policy.face_count_threshold, 3);
        assert!(!policy.area_policy_enabled);
        assert!(policy.count_policy_enabled);
    }
}
