//! Settings file loading: `original_source/misc/settings.py`'s `DotDict`
//! get-with-default style, translated into a typed struct with
//! `#[serde(default = ...)]` per field instead of a runtime fallback lookup.
//! Recognised top-level keys match spec.md §6 exactly.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::path::Path;

use serde::Deserialize;

fn default_photo_timeout() -> u64 {
    30
}
fn default_video_timeout() -> u64 {
    60
}
fn default_bitrate() -> u32 {
    2_000_000
}
fn default_framerate() -> u32 {
    25
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_buffer_secs() -> f64 {
    2.0
}
fn default_clip_length_tolerance() -> f64 {
    1.0
}
fn default_time_window() -> f64 {
    2.0
}
fn default_trigger_thresholds() -> (u8, u8) {
    (200, 180)
}
fn default_trigger_area_fractions() -> (f64, f64) {
    (1e-4, 1e-4)
}
fn default_video_duration() -> u64 {
    10
}
fn default_pwmled_frequency() -> u32 {
    100
}
fn default_temp_folder() -> String {
    "/tmp/surveil".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub token: Option<String>,
    #[serde(default)]
    pub auth_file: Option<String>,
    #[serde(default = "default_photo_timeout")]
    pub photo_timeout: u64,
    #[serde(default = "default_video_timeout")]
    pub video_timeout: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        TelegramSettings {
            token: None,
            auth_file: None,
            photo_timeout: default_photo_timeout(),
            video_timeout: default_video_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_buffer_secs")]
    pub buffer: f64,
    #[serde(default = "default_clip_length_tolerance")]
    pub clip_length_tolerance: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            bitrate: default_bitrate(),
            framerate: default_framerate(),
            jpeg_quality: default_jpeg_quality(),
            buffer: default_buffer_secs(),
            clip_length_tolerance: default_clip_length_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSettings {
    #[serde(default = "default_trigger_thresholds")]
    pub trigger_thresholds: (u8, u8),
    #[serde(default = "default_trigger_area_fractions")]
    pub trigger_area_fractions: (f64, f64),
    #[serde(default = "default_time_window")]
    pub time_window: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings {
            trigger_thresholds: default_trigger_thresholds(),
            trigger_area_fractions: default_trigger_area_fractions(),
            time_window: default_time_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatcamSettings {
    #[serde(default = "default_video_duration")]
    pub video_duration: u64,
}

impl Default for RatcamSettings {
    fn default() -> Self {
        RatcamSettings {
            video_duration: default_video_duration(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusLedSettings {
    pub bcm_pin_r: Option<u8>,
    pub bcm_pin_g: Option<u8>,
    pub bcm_pin_b: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PwmledSettings {
    pub bcm_pin: Option<u8>,
    #[serde(default = "default_pwmled_frequency")]
    pub frequency: u32,
}

impl Default for PwmledSettings {
    fn default() -> Self {
        PwmledSettings {
            bcm_pin: None,
            frequency: default_pwmled_frequency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub ratcam: RatcamSettings,
    #[serde(default)]
    pub status_led: StatusLedSettings,
    #[serde(default)]
    pub pwmled: PwmledSettings,
    #[serde(default = "default_temp_folder")]
    pub temp_folder: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            telegram: TelegramSettings::default(),
            camera: CameraSettings::default(),
            detector: DetectorSettings::default(),
            ratcam: RatcamSettings::default(),
            status_led: StatusLedSettings::default(),
            pwmled: PwmledSettings::default(),
            temp_folder: default_temp_folder(),
        }
    }
}

impl Settings {
    /// Loads `path`. A missing file is not an error — like
    /// `load_settings`, we just keep running with every default. A present
    /// but malformed file IS an error: unlike the JSON settings file (which
    /// gets renamed aside and discarded), a YAML settings file the operator
    /// is actively editing is more likely to contain a typo worth surfacing
    /// than to be a corrupt artifact safe to throw away.
    pub fn load(path: &Path) -> anyhow::Result<Settings> {
        if !path.exists() {
            log::warn!("no settings file at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        let file = File::open(path)?;
        let settings: Settings = serde_yml::from_reader(file)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/settings.yaml")).unwrap();
        assert_eq!(settings.camera.framerate, default_framerate());
        assert_eq!(settings.temp_folder, default_temp_folder());
    }

    #[test]
    fn partial_file_fills_in_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "telegram:\n  token: \"abc123\"").unwrap();
        drop(file);

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.telegram.token.as_deref(), Some("abc123"));
        assert_eq!(settings.camera.bitrate, default_bitrate());
        assert_eq!(settings.detector.time_window, default_time_window());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "telegram: [this, is, not, a, mapping").unwrap();
        drop(file);

        assert!(Settings::load(&path).is_err());
    }
}
