use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::schedule;

pub const APP_DIR_NAME: &str = "HDR-SDR-Brightness";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub manual: u8,
    pub day: u8,
    pub night: u8,
    pub day_start: String,
    pub night_start: String,
    pub auto_enabled: bool,
    #[serde(deserialize_with = "lenient_theme")]
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manual: 35,
            day: 40,
            night: 25,
            day_start: "08:00".to_string(),
            night_start: "20:00".to_string(),
            auto_enabled: true,
            theme: Theme::Dark,
        }
    }
}

fn lenient_theme<'de, D>(de: D) -> std::result::Result<Theme, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    Ok(match raw.trim().to_ascii_lowercase().as_str() {
        "light" => Theme::Light,
        _ => Theme::Dark,
    })
}

impl Settings {
    /// Clamps percents and resets malformed clock times.
    pub fn normalized(mut self) -> Self {
        let d = Settings::default();
        self.manual = self.manual.min(100);
        self.day = self.day.min(100);
        self.night = self.night.min(100);
        if !schedule::valid_hhmm(&self.day_start) {
            self.day_start = d.day_start;
        }
        if !schedule::valid_hhmm(&self.night_start) {
            self.night_start = d.night_start;
        }
        self
    }
}

/// Where the settings file lives and how it is read and written.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<LocalAppData>/HDR-SDR-Brightness/config.json`, or next to the exe.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads, normalizes and writes back. A missing or unreadable file
    /// yields defaults.
    pub fn load(&self) -> Settings {
        let loaded = match fs::read_to_string(&self.path) {
            Ok(text) => parse(&text).unwrap_or_else(|e| {
                warn!("settings parse-failed path={} error={e:#}", self.path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        };
        let settings = loaded.normalized();
        if let Err(e) = self.save(&settings) {
            warn!("settings save-failed error={e:#}");
        }
        info!("settings loaded path={}", self.path.display());
        settings
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text).with_context(|| format!("write {}", self.path.display()))
    }
}

/// Percents above 100 are clamped rather than rejected.
fn parse(text: &str) -> Result<Settings> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;
    if let Some(obj) = value.as_object_mut() {
        for key in ["manual", "day", "night"] {
            if let Some(n) = obj.get(key).and_then(|v| v.as_i64()) {
                obj.insert(key.to_string(), n.clamp(0, 100).into());
            }
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(&dir.path().join("nested"));
        let s = store.load();
        assert_eq!(s, Settings::default());
        assert!(store.path().exists());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        let s = Settings {
            manual: 73,
            auto_enabled: false,
            theme: Theme::Light,
            ..Settings::default()
        };
        store.save(&s).unwrap();
        assert_eq!(store.load(), s);
    }

    #[test]
    fn out_of_range_and_malformed_values_are_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"manual": 180, "day": -5, "night_start": "25:00", "day_start": "7:00", "theme": "Solarized"}"#,
        )
        .unwrap();
        let s = store.load();
        assert_eq!(s.manual, 100);
        assert_eq!(s.day, 0);
        assert_eq!(s.night, 25);
        assert_eq!(s.day_start, "08:00");
        assert_eq!(s.night_start, "20:00");
        assert_eq!(s.theme, Theme::Dark);
    }

    #[test]
    fn theme_names_are_case_insensitive() {
        let s = parse(r#"{"theme": " LIGHT "}"#).unwrap();
        assert_eq!(s.theme, Theme::Light);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        fs::write(store.path(), "[Brightness]\nManual=50\n").unwrap();
        assert_eq!(store.load(), Settings::default());
    }
}
