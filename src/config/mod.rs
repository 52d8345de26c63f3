pub mod env_file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::scheduler::SchedulerConfig;

pub const SHARE_TOKEN_KEY: &str = "GOOGLE_PHOTOS_SHARE_TOKEN";

/// Upper bound for the minute settings: one week
const MAX_MINUTES: u64 = 7 * 24 * 60;
/// Upper bound for the second settings: one day
const MAX_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("{key}={value:?} is not a whole number")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be between {min} and {max}")]
    OutOfRange {
        key: &'static str,
        min: u64,
        max: u64,
    },
}

/// What the frame shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// Rotating photos from a shared album
    #[default]
    Photo,
    /// Live clock and Home Assistant sensor readings
    Weather,
}

impl std::str::FromStr for ContentMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "photo" | "photos" | "album" => Ok(ContentMode::Photo),
            "weather" | "sensors" => Ok(ContentMode::Weather),
            _ => Err(format!("Unknown content mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Save each refresh as PNG (development)
    #[default]
    Png,
    /// Write the packed 1-bit frame buffer to a file or device node
    Raw,
}

impl std::str::FromStr for OutputMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(OutputMode::Png),
            "raw" | "epd" | "device" => Ok(OutputMode::Raw),
            _ => Err(format!("Unknown output mode: {s}")),
        }
    }
}

/// Settings fixed for the process lifetime, taken from the command line
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub mode: ContentMode,
    pub env_file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub output: OutputMode,
    pub output_path: PathBuf,
    pub font: Option<PathBuf>,
    /// 0 disables the admin page
    pub admin_port: u16,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            mode: ContentMode::Photo,
            env_file: PathBuf::from(".env"),
            width: 800,
            height: 480,
            output: OutputMode::Png,
            output_path: PathBuf::from("frame.png"),
            font: None,
            admin_port: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotosConfig {
    /// Missing until an album is picked on the admin page
    pub share_token: Option<String>,
    pub token_file: PathBuf,
    pub credentials_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeAssistantConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub weather_entity: String,
}

/// Full configuration: launch options plus everything re-read from the env file on reload
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub launch: LaunchOptions,
    pub photos: PhotosConfig,
    pub home_assistant: HomeAssistantConfig,
    pub scheduler: SchedulerConfig,
}

impl FrameConfig {
    /// Read the env file (missing is fine), then the process environment.
    /// Values in the file win so that a rewritten file takes effect on reload.
    pub fn load(launch: &LaunchOptions) -> Result<Self, ConfigError> {
        let file_vars = read_env_file(&launch.env_file)?;
        Self::from_lookup(launch, |key| {
            file_vars
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_lookup(
        launch: &LaunchOptions,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let photos = PhotosConfig {
            share_token: var(SHARE_TOKEN_KEY),
            token_file: var("GOOGLE_PHOTOS_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("token.json")),
            credentials_file: var("GOOGLE_PHOTOS_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("credentials.json")),
        };

        let home_assistant = HomeAssistantConfig {
            url: var("HOME_ASSISTANT_URL").map(|u| u.trim_end_matches('/').to_string()),
            token: var("HOME_ASSISTANT_TOKEN"),
            weather_entity: var("HOME_ASSISTANT_WEATHER_ENTITY")
                .unwrap_or_else(|| "weather.home".to_string()),
        };

        let number = |key: &'static str, default: u64, min: u64, max: u64| -> Result<u64, ConfigError> {
            let value = match var(key) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                    key,
                    value: raw.clone(),
                })?,
                None => default,
            };
            if !(min..=max).contains(&value) {
                return Err(ConfigError::OutOfRange { key, min, max });
            }
            Ok(value)
        };

        let poll_minutes = number("UPDATE_INTERVAL_MINUTES", 5, 1, MAX_MINUTES)?;
        let cache_ttl = match launch.mode {
            ContentMode::Photo => Duration::from_secs(
                number("PHOTO_ROTATION_INTERVAL_MINUTES", 60, 1, MAX_MINUTES)? * 60,
            ),
            // sensor readings are refetched every tick
            ContentMode::Weather => Duration::ZERO,
        };
        let forced_repaint_period =
            number("FORCED_REPAINT_PERIOD", 10, 0, u64::from(u32::MAX))?;

        let scheduler = SchedulerConfig {
            poll_interval: Duration::from_secs(poll_minutes * 60),
            cache_ttl,
            forced_repaint_period: u32::try_from(forced_repaint_period).unwrap_or(u32::MAX),
            panel_min_refresh: Duration::from_secs(number(
                "PANEL_MIN_REFRESH_SECONDS",
                180,
                0,
                MAX_SECONDS,
            )?),
            time_check_interval: Some(Duration::from_secs(number(
                "TIME_CHECK_SECONDS",
                30,
                1,
                MAX_SECONDS,
            )?)),
            fetch_timeout: Duration::from_secs(number("FETCH_TIMEOUT_SECONDS", 30, 1, MAX_SECONDS)?),
        };

        Ok(Self {
            launch: launch.clone(),
            photos,
            home_assistant,
            scheduler,
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            debug!("No env file at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(source) => {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let vars = iter
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Read {} settings from {}", vars.len(), path.display());
    Ok(vars)
}
