//! Application configuration.
//!
//! Persisted settings live in a flat JSON object keyed like `app/sample_rate`.
//! Reading a key that is missing or holds the wrong type writes the default
//! back, so the file on disk is always repaired after a load.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::SplitResult;

pub const APP_USE_CHIP_RATE: &str = "app/use_chip_rate";
pub const APP_SAMPLE_RATE: &str = "app/sample_rate";

pub const DEFAULT_USE_CHIP_RATE: bool = true;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// User-editable settings that influence rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Whether to use the FM sampling rate (if present) rather than the
    /// user-selected sampling rate.
    pub use_chip_rate: bool,

    /// The fallback sampling rate to use if no FM chips are present.
    pub sample_rate: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            use_chip_rate: DEFAULT_USE_CHIP_RATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Render parameters that are not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderDefaults {
    /// Number of times a looped song plays its loop section.
    pub loop_count: u32,

    /// Fade-out after the last loop, in seconds.
    pub fade_duration_s: f64,

    /// Silence appended to songs without a loop, in seconds.
    pub unlooped_tail_s: f64,

    /// Master volume, 16.16 fixed point (0x1_0000 = 100%).
    pub volume: u32,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            loop_count: 2,
            fade_duration_s: 4.0,
            unlooped_tail_s: 0.5,
            volume: 0x1_0000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vgmsplit=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Flat JSON key-value store backing [`Settings`].
#[derive(Debug, Clone)]
struct SettingsStore {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl SettingsStore {
    fn open(path: Option<PathBuf>) -> Self {
        let values = path
            .as_deref()
            .and_then(read_store_file)
            .unwrap_or_default();
        Self { path, values }
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn save(&self) -> SplitResult<()> {
        match &self.path {
            Some(path) => write_store_file(path, &self.values),
            None => Ok(()),
        }
    }

    /// Read a u32. If missing or invalid, overwrite it with `default`.
    fn sync_u32(&mut self, key: &str, default: u32) -> u32 {
        let parsed = self
            .values
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());
        match parsed {
            Some(v) => v,
            None => {
                tracing::warn!(key, default, "Repairing missing or invalid setting");
                self.set(key, Value::from(default));
                default
            }
        }
    }

    /// Read a bool. If missing or invalid, overwrite it with `default`.
    fn sync_bool(&mut self, key: &str, default: bool) -> bool {
        match self.values.get(key).and_then(Value::as_bool) {
            Some(v) => v,
            None => {
                tracing::warn!(key, default, "Repairing missing or invalid setting");
                self.set(key, Value::from(default));
                default
            }
        }
    }
}

fn read_store_file(path: &Path) -> Option<Map<String, Value>> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                tracing::warn!("Settings at {:?} are not a JSON object, resetting", path);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to parse settings at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read settings at {:?}: {}", path, e);
            None
        }
    }
}

fn write_store_file(path: &Path, values: &Map<String, Value>) -> SplitResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(values)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Persisted application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    store: SettingsStore,
    app: AppSettings,
}

impl Settings {
    /// Load settings from the standard location, repairing invalid keys.
    pub fn load() -> Self {
        Self::load_from(settings_file_path())
    }

    /// Load settings from `path`, repairing invalid keys.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        Self::from_store(SettingsStore::open(Some(path.into())))
    }

    /// Settings that are never written to disk.
    pub fn in_memory() -> Self {
        Self::from_store(SettingsStore::open(None))
    }

    fn from_store(mut store: SettingsStore) -> Self {
        let before = store.values.clone();
        let app = AppSettings {
            use_chip_rate: store.sync_bool(APP_USE_CHIP_RATE, DEFAULT_USE_CHIP_RATE),
            sample_rate: store.sync_u32(APP_SAMPLE_RATE, DEFAULT_SAMPLE_RATE),
        };
        if store.values != before {
            if let Err(e) = store.save() {
                tracing::warn!(path = ?store.path, error = %e, "Failed to save repaired settings");
            }
        }
        Self { store, app }
    }

    /// Re-read the backing file (if any).
    pub fn reload(&mut self) {
        *self = Self::from_store(SettingsStore::open(self.store.path.clone()));
    }

    pub fn app_settings(&self) -> AppSettings {
        self.app
    }

    /// Replace the app settings and persist them, even if unchanged, so the
    /// last instance to save wins.
    pub fn set_app_settings(&mut self, app: AppSettings) -> SplitResult<()> {
        self.app = app;
        self.store
            .set(APP_USE_CHIP_RATE, Value::from(app.use_chip_rate));
        self.store.set(APP_SAMPLE_RATE, Value::from(app.sample_rate));
        self.store.save()
    }

    /// Path of the backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.store.path.as_deref()
    }
}

/// Standard settings file location.
pub fn settings_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vgmsplit").join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings::load_from(&path);
        assert_eq!(settings.app_settings(), AppSettings::default());

        let json = read_json(&path);
        assert_eq!(json[APP_USE_CHIP_RATE], Value::Bool(true));
        assert_eq!(json[APP_SAMPLE_RATE], Value::from(44100));
    }

    #[test]
    fn test_invalid_values_are_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"app/use_chip_rate": "yes", "app/sample_rate": -5, "other": 1}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert!(settings.app_settings().use_chip_rate);
        assert_eq!(settings.app_settings().sample_rate, 44100);

        let json = read_json(&path);
        assert_eq!(json[APP_USE_CHIP_RATE], Value::Bool(true));
        assert_eq!(json[APP_SAMPLE_RATE], Value::from(44100));
        // Unrelated keys survive the repair.
        assert_eq!(json["other"], Value::from(1));
    }

    #[test]
    fn test_valid_values_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"app/use_chip_rate": false, "app/sample_rate": 48000}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(
            settings.app_settings(),
            AppSettings {
                use_chip_rate: false,
                sample_rate: 48000,
            }
        );
    }

    #[test]
    fn test_set_app_settings_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::load_from(&path);
        settings.set_app_settings(AppSettings {
            use_chip_rate: false,
            sample_rate: 96000,
        })
        .unwrap();

        let mut other = Settings::load_from(&path);
        assert_eq!(other.app_settings().sample_rate, 96000);

        settings.set_app_settings(AppSettings {
            use_chip_rate: true,
            sample_rate: 22050,
        })
        .unwrap();
        other.reload();
        assert_eq!(other.app_settings().sample_rate, 22050);
        assert!(other.app_settings().use_chip_rate);
    }

    #[test]
    fn test_in_memory_settings_have_defaults() {
        let settings = Settings::in_memory();
        assert!(settings.path().is_none());
        assert_eq!(settings.app_settings(), AppSettings::default());
    }

    #[test]
    fn test_set_app_settings_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut settings = Settings::load_from(blocker.join("settings.json"));
        let err = settings.set_app_settings(AppSettings::default()).unwrap_err();
        assert!(matches!(err, crate::error::SplitError::Io(_)));
        // The in-memory value is still replaced.
        assert_eq!(settings.app_settings(), AppSettings::default());
    }
}
