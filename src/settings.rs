use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing_mode: FacingMode,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EscalationMode {
    /// First threshold crossing schedules one navigation, then the policy latches.
    #[default]
    Once,
    /// Every sad detection at or past the threshold schedules another navigation.
    EveryDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSettings {
    pub threshold: u32,
    pub delay_ms: u64,
    pub target: String,
    pub mode: EscalationMode,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            threshold: 2,
            delay_ms: 2000,
            target: "/therapy-session".into(),
            mode: EscalationMode::Once,
        }
    }
}

impl EscalationSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionSettings {
    pub tick_interval_ms: u64,
    pub classify_timeout_ms: u64,
    pub history_capacity: usize,
    pub capture: CaptureConstraints,
    pub escalation: EscalationSettings,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            classify_timeout_ms: 5000,
            history_capacity: 5,
            capture: CaptureConstraints::default(),
            escalation: EscalationSettings::default(),
        }
    }
}

impl DetectionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tickIntervalMs must be greater than zero");
        }
        if self.classify_timeout_ms == 0 {
            bail!("classifyTimeoutMs must be greater than zero");
        }
        if self.history_capacity == 0 {
            bail!("historyCapacity must be greater than zero");
        }
        if self.escalation.threshold == 0 {
            bail!("escalation.threshold must be greater than zero");
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<DetectionSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<DetectionSettings>(&contents) {
                Ok(parsed) if parsed.validate().is_ok() => parsed,
                Ok(_) | Err(_) => {
                    log::warn!(
                        "Ignoring invalid settings in {}, using defaults",
                        path.display()
                    );
                    DetectionSettings::default()
                }
            }
        } else {
            DetectionSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn detection(&self) -> DetectionSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_detection(&self, settings: DetectionSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: DetectionSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed settings in {}", self.path.display()))?;
        data.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &DetectionSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detection_cadence() {
        let settings = DetectionSettings::default();
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.history_capacity, 5);
        assert_eq!(settings.escalation.threshold, 2);
        assert_eq!(settings.escalation.delay(), Duration::from_secs(2));
        assert_eq!(settings.escalation.mode, EscalationMode::Once);
        assert_eq!(settings.capture.ideal_width, 640);
        assert_eq!(settings.capture.facing_mode, FacingMode::User);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut settings = DetectionSettings::default();
        settings.tick_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = DetectionSettings::default();
        settings.history_capacity = 0;
        assert!(settings.validate().is_err());

        let mut settings = DetectionSettings::default();
        settings.escalation.threshold = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.detection(), DetectionSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tickIntervalMs": 250 }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.detection();
        assert_eq!(settings.tick_interval_ms, 250);
        assert_eq!(settings.history_capacity, 5);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.detection(), DetectionSettings::default());
    }

    #[test]
    fn update_persists_and_reload_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = DetectionSettings::default();
        settings.escalation.mode = EscalationMode::EveryDetection;
        settings.escalation.target = "/support".into();
        store.update_detection(settings.clone()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"everyDetection\""));

        let other = SettingsStore::new(path).unwrap();
        other.reload().unwrap();
        assert_eq!(other.detection(), settings);
    }

    #[test]
    fn update_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let mut settings = DetectionSettings::default();
        settings.classify_timeout_ms = 0;
        assert!(store.update_detection(settings).is_err());
        assert_eq!(store.detection(), DetectionSettings::default());
    }
}
