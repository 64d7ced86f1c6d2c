// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::audio::tone::TONE_LEVEL_RANGE;

const DEFAULT_LIBRARY_PATH: &str = "soundboard-library";
const DEFAULT_VOLUME: f32 = 0.7;
const DEFAULT_TONE_LEVEL: f32 = 0.5;
const DEFAULT_LABEL_RESTORE: Duration = Duration::from_millis(600);
const DEFAULT_FADE_OUT: Duration = Duration::from_millis(500);
const DEFAULT_DOUBLE_PRESS: Duration = Duration::from_millis(300);

/// The soundboard configuration file. Every key is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Settings {
    /// Where the sound library is stored.
    library_path: Option<String>,

    /// Initial playback volume, 0.0 to 1.0.
    volume: Option<f32>,

    /// Peak level of generated tones relative to the volume.
    tone_level: Option<f32>,

    /// How long a transient label stays up.
    label_restore: Option<String>,

    /// Length of the graceful stop fade.
    fade_out: Option<String>,

    /// Window for detecting a double press of the stop control.
    double_press: Option<String>,

    /// The audio output.
    audio: Option<Audio>,
}

/// The time windows the soundboard works with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub label_restore: Duration,
    pub fade_out: Duration,
    pub double_press: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            label_restore: DEFAULT_LABEL_RESTORE,
            fade_out: DEFAULT_FADE_OUT,
            double_press: DEFAULT_DOUBLE_PRESS,
        }
    }
}

impl Settings {
    /// Parse settings from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Settings, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// The library directory.
    pub fn library_path(&self) -> PathBuf {
        PathBuf::from(
            self.library_path
                .as_deref()
                .unwrap_or(DEFAULT_LIBRARY_PATH),
        )
    }

    /// The initial volume, clamped to 0.0..=1.0.
    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME).clamp(0.0, 1.0)
    }

    /// The tone level, clamped to 0.3..=0.5.
    pub fn tone_level(&self) -> f32 {
        self.tone_level
            .unwrap_or(DEFAULT_TONE_LEVEL)
            .clamp(*TONE_LEVEL_RANGE.start(), *TONE_LEVEL_RANGE.end())
    }

    /// The configured time windows.
    pub fn timings(&self) -> Result<Timings, ConfigError> {
        Ok(Timings {
            label_restore: parse_duration(
                "label_restore",
                &self.label_restore,
                DEFAULT_LABEL_RESTORE,
            )?,
            fade_out: parse_duration("fade_out", &self.fade_out, DEFAULT_FADE_OUT)?,
            double_press: parse_duration("double_press", &self.double_press, DEFAULT_DOUBLE_PRESS)?,
        })
    }

    /// The audio configuration.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::InvalidDuration {
                field,
                value: value.clone(),
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse("{}");
        assert_eq!(settings.library_path(), PathBuf::from("soundboard-library"));
        assert_eq!(settings.volume(), 0.7);
        assert_eq!(settings.tone_level(), 0.5);
        assert_eq!(settings.timings().unwrap(), Timings::default());
        assert_eq!(settings.audio(), Audio::default());
        assert_eq!(settings.audio().device(), None);
    }

    #[test]
    fn test_full_settings() {
        let yaml = r#"
            library_path: /var/lib/soundboard
            volume: 0.4
            tone_level: 0.35
            label_restore: 1s
            fade_out: 250ms
            double_press: 400ms
            audio:
              device: mock-device
              sample_rate: 48000
              channels: 2
        "#;

        let settings = parse(yaml);
        assert_eq!(settings.library_path(), PathBuf::from("/var/lib/soundboard"));
        assert_eq!(settings.volume(), 0.4);
        assert_eq!(settings.tone_level(), 0.35);
        assert_eq!(
            settings.timings().unwrap(),
            Timings {
                label_restore: Duration::from_secs(1),
                fade_out: Duration::from_millis(250),
                double_press: Duration::from_millis(400),
            }
        );
        assert_eq!(settings.audio().device(), Some("mock-device"));
        assert_eq!(settings.audio().sample_rate(), Some(48000));
        assert_eq!(settings.audio().channels(), Some(2));
    }

    #[test]
    fn test_values_are_clamped() {
        let settings = parse("volume: 1.5\ntone_level: 0.9\n");
        assert_eq!(settings.volume(), 1.0);
        assert_eq!(settings.tone_level(), 0.5);

        let settings = parse("volume: -1.0\ntone_level: 0.1\n");
        assert_eq!(settings.volume(), 0.0);
        assert_eq!(settings.tone_level(), 0.3);
    }

    #[test]
    fn test_invalid_duration() {
        let settings = parse("fade_out: soon\n");
        assert!(matches!(
            settings.timings(),
            Err(ConfigError::InvalidDuration {
                field: "fade_out",
                ..
            })
        ));
    }

    #[test]
    fn test_deserialize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundboard.yaml");
        std::fs::write(&path, "volume: 0.2\n").unwrap();

        let settings = Settings::deserialize(&path).unwrap();
        assert_eq!(settings.volume(), 0.2);

        assert!(matches!(
            Settings::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
