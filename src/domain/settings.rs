use crate::domain::models::SystemId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
    /// Dump every H4 frame, whatever `level` says
    #[serde(default = "default_false")]
    pub frame_trace: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
            frame_trace: default_false(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "retro_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Parameters of the Bluetooth host, fixed for the lifetime of the process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Outbound frames that may wait for the radio
    #[serde(default = "default_tx_queue_capacity")]
    pub tx_queue_capacity: usize,

    /// Player LED pattern (low nibble) for each peer slot
    #[serde(default = "default_led_patterns")]
    pub led_patterns: [u8; 7],

    // Bring-up parameters
    #[serde(default = "default_local_name")]
    pub local_name: String,
    #[serde(default = "default_class_of_device")]
    pub class_of_device: [u8; 3],
    /// Inquiry duration in units of 1.28 s
    #[serde(default = "default_inquiry_length")]
    pub inquiry_length: u8,
    /// Page timeout in baseband slots (0.625 ms)
    #[serde(default = "default_page_timeout")]
    pub page_timeout: u16,

    /// Console used when no detection hardware reports one
    #[serde(default)]
    pub system_id: SystemId,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            tx_queue_capacity: default_tx_queue_capacity(),
            led_patterns: default_led_patterns(),
            local_name: default_local_name(),
            class_of_device: default_class_of_device(),
            inquiry_length: default_inquiry_length(),
            page_timeout: default_page_timeout(),
            system_id: SystemId::None,
        }
    }
}

fn default_tx_queue_capacity() -> usize {
    16
}
fn default_led_patterns() -> [u8; 7] {
    [0x1, 0x2, 0x4, 0x8, 0x3, 0x6, 0xC]
}
fn default_local_name() -> String {
    "Retro Bridge".to_string()
}
fn default_class_of_device() -> [u8; 3] {
    // Toy / game console
    [0x14, 0x08, 0x00]
}
fn default_inquiry_length() -> u8 {
    0x30
}
fn default_page_timeout() -> u16 {
    0x2000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub host: HostSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    /// Load an explicit settings file; a missing or broken file is an error here
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = path.into();
        let settings = Self::load_from_file(&settings_path)?;
        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("RetroBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "host": { "tx_queue_capacity": 4, "system_id": "GameCube" } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.host.tx_queue_capacity, 4);
        assert_eq!(settings.host.system_id, SystemId::GameCube);
        assert_eq!(settings.host.led_patterns, [0x1, 0x2, 0x4, 0x8, 0x3, 0x6, 0xC]);
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.host.local_name, "Retro Bridge");
        assert_eq!(settings.host.inquiry_length, 0x30);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "retro_bridge_settings_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{}").unwrap();

        let mut service = SettingsService::from_path(&path).unwrap();
        service.get_mut().host.local_name = "Bridge 2".to_string();
        service.save().unwrap();

        let reloaded = SettingsService::from_path(&path).unwrap();
        assert_eq!(reloaded.get().host.local_name, "Bridge 2");
        let _ = std::fs::remove_file(path);
    }
}
