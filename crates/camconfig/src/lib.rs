//! Persisted user settings for delaycam.
//!
//! Only user selections are stored. Derived values such as the maximum
//! feasible delay are computed on demand through [`budget`].

pub mod budget;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Screen corner for the live overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl OverlayCorner {
    pub const ALL: [OverlayCorner; 4] = [
        OverlayCorner::TopLeft,
        OverlayCorner::TopRight,
        OverlayCorner::BottomLeft,
        OverlayCorner::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayCorner::TopLeft => "top-left",
            OverlayCorner::TopRight => "top-right",
            OverlayCorner::BottomLeft => "bottom-left",
            OverlayCorner::BottomRight => "bottom-right",
        }
    }

    /// Accepts `top-left`, `top_left` or `TOP_LEFT` style names.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|corner| corner.as_str() == normalized)
    }
}

impl fmt::Display for OverlayCorner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OverlayCorner {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw).unwrap_or_else(|| {
            let fallback = OverlayCorner::default();
            warn!(corner = %raw, %fallback, "unknown overlay corner, using default");
            fallback
        }))
    }
}

/// User selections persisted between runs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub delay: Duration,
    pub mirror_preview: bool,
    pub show_live_overlay: bool,
    pub live_overlay_corner: OverlayCorner,
    pub pip_scale: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            delay: Duration::from_secs(3),
            mirror_preview: false,
            show_live_overlay: true,
            live_overlay_corner: OverlayCorner::default(),
            pip_scale: 0.25,
        }
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(input)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let settings = Self::from_toml_str(&contents)?;
                debug!(path = %path.display(), "loaded settings");
                Ok(settings)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the settings to `path`, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "saved settings");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.width == 0 || self.height == 0 {
            return Err(SettingsError::Invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(SettingsError::Invalid("fps must be greater than zero".into()));
        }
        if self.delay.is_zero() {
            return Err(SettingsError::Invalid(
                "delay must be greater than zero".into(),
            ));
        }
        if !self.pip_scale.is_finite() || self.pip_scale <= 0.0 || self.pip_scale > 1.0 {
            return Err(SettingsError::Invalid(format!(
                "pip_scale must lie within (0, 1], got {}",
                self.pip_scale
            )));
        }
        Ok(())
    }

    pub fn delay_seconds(&self) -> f32 {
        self.delay.as_secs_f32()
    }

    /// Shortens the delay to `max_seconds` if it exceeds it. Returns whether
    /// the delay changed.
    pub fn clamp_delay(&mut self, max_seconds: u32) -> bool {
        let max = Duration::from_secs(u64::from(max_seconds.max(1)));
        if self.delay > max {
            warn!(
                requested = ?self.delay,
                max = ?max,
                "selected delay exceeds memory budget, clamping"
            );
            self.delay = max;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
width = 1920
height = 1080
fps = 60
delay = "10s"
mirror_preview = true
show_live_overlay = false
live_overlay_corner = "bottom-left"
pip_scale = 0.3
"#;

    #[test]
    fn parses_sample_settings() {
        let settings = Settings::from_toml_str(SAMPLE).expect("parse settings");
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.fps, 60);
        assert_eq!(settings.delay, Duration::from_secs(10));
        assert!(settings.mirror_preview);
        assert!(!settings.show_live_overlay);
        assert_eq!(settings.live_overlay_corner, OverlayCorner::BottomLeft);
        assert_eq!(settings.pip_scale, 0.3);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let settings = Settings::from_toml_str("fps = 24\ndelay = 5").unwrap();
        assert_eq!(settings.fps, 24);
        assert_eq!(settings.delay, Duration::from_secs(5));
        assert_eq!(settings.width, 1280);
        assert_eq!(settings.height, 720);
        assert!(settings.show_live_overlay);
        assert_eq!(settings.live_overlay_corner, OverlayCorner::TopRight);
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn unknown_corner_falls_back_to_default() {
        let settings = Settings::from_toml_str(r#"live_overlay_corner = "centre""#).unwrap();
        assert_eq!(settings.live_overlay_corner, OverlayCorner::TopRight);
        let legacy = Settings::from_toml_str(r#"live_overlay_corner = "BOTTOM_RIGHT""#).unwrap();
        assert_eq!(legacy.live_overlay_corner, OverlayCorner::BottomRight);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Settings::from_toml_str("fps = 0"),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("pip_scale = 1.5"),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("delay = -3"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        assert_eq!(Settings::load_or_default(&path).unwrap(), Settings::default());

        let settings = Settings {
            delay: Duration::from_secs(45),
            live_overlay_corner: OverlayCorner::TopLeft,
            mirror_preview: true,
            ..Settings::default()
        };
        settings.persist(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"delay = "45s""#));
        assert!(written.contains(r#"live_overlay_corner = "top-left""#));
        assert_eq!(Settings::load_or_default(&path).unwrap(), settings);
    }

    #[test]
    fn clamp_delay_only_shortens() {
        let mut settings = Settings {
            delay: Duration::from_secs(120),
            ..Settings::default()
        };
        assert!(settings.clamp_delay(72));
        assert_eq!(settings.delay, Duration::from_secs(72));
        assert!(!settings.clamp_delay(500));
        assert_eq!(settings.delay, Duration::from_secs(72));
    }
}
