use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::coords::{RelativeRegion, ScreenPoint};

pub type RgbColor = (u8, u8, u8);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub page: PageSettings,
    pub region: RegionSettings,
    pub ocr: OcrSettings,
    pub scan: ScanSettings,
    pub watch: WatchSettings,
    pub timing: TimingSettings,
    pub download: DownloadSettings,
    pub paths: PathSettings,
    pub hotkeys: HotkeySettings,
    pub browsers: BrowserSettings,
}

/// Target page and the "open tool" button that must be pressed once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    pub target_url: String,
    pub open_tool_text: String,
    pub open_tool_region: RelativeRegion,
    pub settle_wait_secs: f64,
    pub tool_load_wait_secs: f64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            target_url: "https://labs.google/fx/tools/whisk".to_string(),
            open_tool_text: "OPEN TOOL".to_string(),
            open_tool_region: RelativeRegion::new(0.28, 0.33, 0.44, 0.15),
            settle_wait_secs: 3.0,
            tool_load_wait_secs: 8.0,
        }
    }
}

/// VPN based egress region switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    pub enabled: bool,
    /// A failed switch ends the run instead of only warning.
    pub required: bool,
    pub cli_path: String,
    pub server_group: String,
    pub target_country: String,
    pub startup_wait_secs: f64,
    pub command_timeout_secs: f64,
    pub verify_retries: u32,
    pub verify_interval_secs: f64,
    pub geo_endpoints: Vec<GeoEndpoint>,
    pub geo_timeout_secs: f64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            cli_path: "nordvpn.exe".to_string(),
            server_group: "Singapore".to_string(),
            target_country: "SG".to_string(),
            startup_wait_secs: 10.0,
            command_timeout_secs: 20.0,
            verify_retries: 12,
            verify_interval_secs: 5.0,
            geo_endpoints: GeoEndpoint::defaults(),
            geo_timeout_secs: 5.0,
        }
    }
}

/// One geolocation HTTP endpoint and the JSON keys it answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEndpoint {
    pub url: String,
    pub ip_key: String,
    pub country_key: String,
}

impl GeoEndpoint {
    fn new(url: &str, ip_key: &str, country_key: &str) -> Self {
        Self {
            url: url.to_string(),
            ip_key: ip_key.to_string(),
            country_key: country_key.to_string(),
        }
    }

    pub fn defaults() -> Vec<GeoEndpoint> {
        vec![
            GeoEndpoint::new("https://ipinfo.io/json", "ip", "country"),
            GeoEndpoint::new(
                "https://ip-api.com/json/?fields=status,message,countryCode,query",
                "query",
                "countryCode",
            ),
            GeoEndpoint::new("https://freeipapi.com/api/json/", "ipAddress", "countryCode"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub detection_model_path: String,
    pub recognition_model_path: String,
    pub scale_factor: u32,
    pub precise_initial_confidence: f32,
    pub precise_min_confidence: f32,
    pub fallback_initial_confidence: f32,
    pub fallback_min_confidence: f32,
    pub confidence_step: f32,
    pub timeout_secs: f64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            detection_model_path: "models/text-detection.rten".to_string(),
            recognition_model_path: "models/text-recognition.rten".to_string(),
            scale_factor: 2,
            precise_initial_confidence: 0.60,
            precise_min_confidence: 0.25,
            fallback_initial_confidence: 0.55,
            fallback_min_confidence: 0.20,
            confidence_step: 0.10,
            timeout_secs: 20.0,
        }
    }
}

/// Color scan parameters for the prompt area and the generate button.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub prompt_area_color: RgbColor,
    pub generate_button_color: RgbColor,
    pub min_width_fraction: f32,
    pub max_width_fraction: f32,
    pub min_height_fraction: f32,
    pub max_height_fraction: f32,
    /// Vertical position of the prompt click, as a fraction of the area height.
    pub prompt_click_fraction: f32,
    pub button_click_bias: i32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            prompt_area_color: (255, 255, 255),
            generate_button_color: (41, 25, 32),
            min_width_fraction: 0.30,
            max_width_fraction: 0.90,
            min_height_fraction: 0.10,
            max_height_fraction: 0.35,
            prompt_click_fraction: 0.30,
            button_click_bias: 2,
        }
    }
}

/// Completion detection: one pixel that shows `in_progress_color` while generating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub pixel: ScreenPoint,
    pub in_progress_color: RgbColor,
    pub timeout_secs: f64,
    pub poll_interval_secs: f64,
    pub initial_wait_secs: f64,
    pub settle_secs: f64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            pixel: ScreenPoint::new(890, 487),
            in_progress_color: (217, 217, 217),
            timeout_secs: 45.0,
            poll_interval_secs: 0.5,
            initial_wait_secs: 2.0,
            settle_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub browser_load_wait_secs: f64,
    pub browser_countdown_step_secs: f64,
    pub inter_prompt_delay_secs: f64,
    pub after_prompt_click_secs: f64,
    pub after_download_secs: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            browser_load_wait_secs: 15.0,
            browser_countdown_step_secs: 3.0,
            inter_prompt_delay_secs: 2.0,
            after_prompt_click_secs: 0.3,
            after_download_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub default_point: ScreenPoint,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_point: ScreenPoint::new(925, 704),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub coordinate_cache: PathBuf,
    pub debug_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            coordinate_cache: PathBuf::from("coordinates_cache.json"),
            debug_dir: PathBuf::from("debug"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub pause_toggle: HotkeyConfig,
    pub hard_stop: HotkeyConfig,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            pause_toggle: HotkeyConfig {
                key: Some(HotkeyKey::Numpad0),
                modifiers: HotkeyModifiers::default(),
            },
            hard_stop: HotkeyConfig {
                key: Some(HotkeyKey::Escape),
                modifiers: HotkeyModifiers {
                    shift: true,
                    ..HotkeyModifiers::default()
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub key: Option<HotkeyKey>,
    #[serde(default)]
    pub modifiers: HotkeyModifiers,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotkeyKey {
    P,
    S,
    Numpad0,
    Pause,
    Escape,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Executables tried in order before the platform default opener.
    pub preferred: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            preferred: vec!["opera.exe".to_string(), "chrome.exe".to_string()],
        }
    }
}

impl AppSettings {
    pub const SETTINGS_FILE: &'static str = "whiskbatch_settings.json";

    /// Load settings from `path`. A missing file gives defaults; a malformed one
    /// gives defaults and a warning.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "settings file is malformed, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize: {}", e))?;

        fs::write(path, json).map_err(|e| format!("Failed to write file: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "watch": { "timeout_secs": 10.0 }, "region": { "enabled": false } }"#,
        )
        .unwrap();

        let settings = AppSettings::load(&path);
        assert_eq!(settings.watch.timeout_secs, 10.0);
        assert_eq!(settings.watch.pixel, ScreenPoint::new(890, 487));
        assert!(!settings.region.enabled);
        assert_eq!(settings.region.target_country, "SG");
        assert_eq!(settings.download.default_point, ScreenPoint::new(925, 704));
    }

    #[test]
    fn test_malformed_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(AppSettings::load(&path).scan.generate_button_color, (41, 25, 32));

        fs::write(&path, "{ not json").unwrap();
        let settings = AppSettings::load(&path);
        assert_eq!(settings.timing.browser_load_wait_secs, 15.0);
    }

    #[test]
    fn test_save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = AppSettings::default();
        settings.hotkeys.pause_toggle.key = Some(HotkeyKey::F8);
        settings.browsers.preferred = vec!["firefox".to_string()];
        settings.save(&path).unwrap();

        let loaded = AppSettings::load(&path);
        assert_eq!(loaded.hotkeys.pause_toggle.key, Some(HotkeyKey::F8));
        assert_eq!(loaded.browsers.preferred, vec!["firefox".to_string()]);
        assert_eq!(loaded.hotkeys.hard_stop, HotkeySettings::default().hard_stop);
    }
}
