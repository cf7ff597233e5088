use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::PitwallError;
use crate::timeline::SESSION_DURATION_MINUTES;

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "pitwall";

pub const TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PitwallConfig {
    pub tick_interval_ms: u64,
    pub session_duration_minutes: i64,
    pub default_timezone: String,
}

impl Default for PitwallConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            session_duration_minutes: SESSION_DURATION_MINUTES,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl PitwallConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the config from the user's config directory. `Ok(None)` when no file exists yet.
    pub fn from_local_file() -> Result<Option<Self>, PitwallError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, PitwallError> {
        let file = File::open(path).map_err(|e| PitwallError::ConfigIOError { source: e })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PitwallError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), PitwallError> {
        let config_path = Self::default_path().ok_or(PitwallError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), PitwallError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PitwallError::ConfigIOError { source: e })?;
        }

        let file = File::create(config_path)
            .map_err(|e| PitwallError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| PitwallError::ConfigSerializeError { source: e })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_duration_minutes.max(0))
    }
}
