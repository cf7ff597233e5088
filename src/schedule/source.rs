use std::{fs::File, io::BufReader, path::PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::errors::PitwallError;

use super::{NextSessionHint, NextSessionResponse, Schedule, WeekendScheduleResponse};

/// Data sources the timeline consumes. Implementations own transport and authentication; the
/// timeline only sees decoded values or a rejection.
///
/// The three fetches are independent. A rejection from one of them never invalidates the
/// others, see [`crate::schedule::aggregate`].
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Full per-session schedule for one round of a season.
    async fn fetch_full_schedule(&self, season: i32, round: u32) -> Result<Schedule, PitwallError>;

    /// Lightweight single-session hint about whatever comes next.
    async fn fetch_next_session_hint(&self) -> Result<NextSessionHint, PitwallError>;

    /// IANA timezone identifier chosen by the user, if any.
    async fn fetch_user_timezone(&self) -> Result<Option<String>, PitwallError>;
}

/// Serves previously saved endpoint payloads from JSON files.
///
/// A missing path behaves like an endpoint that rejects the request.
#[derive(Debug, Default, Clone)]
pub struct FileScheduleSource {
    schedule_path: Option<PathBuf>,
    hint_path: Option<PathBuf>,
    timezone: Option<String>,
}

impl FileScheduleSource {
    pub fn new(
        schedule_path: Option<PathBuf>,
        hint_path: Option<PathBuf>,
        timezone: Option<String>,
    ) -> Self {
        Self {
            schedule_path,
            hint_path,
            timezone,
        }
    }

    fn read_json<T: DeserializeOwned>(path: &Option<PathBuf>, what: &str) -> Result<T, PitwallError> {
        let path = path.as_ref().ok_or_else(|| PitwallError::ScheduleFetchError {
            description: format!("no {} file configured", what),
        })?;
        debug!("Loading {} from {:?}", what, path);
        let file = File::open(path).map_err(|e| PitwallError::ScheduleFileError { source: e })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PitwallError::ScheduleParseError { source: e })
    }
}

#[async_trait]
impl ScheduleSource for FileScheduleSource {
    async fn fetch_full_schedule(&self, season: i32, round: u32) -> Result<Schedule, PitwallError> {
        let response: WeekendScheduleResponse =
            Self::read_json(&self.schedule_path, "weekend schedule")?;

        let season_matches = response.season.is_none_or(|s| s == season);
        let round_matches = response.round.is_none_or(|r| r == round);
        if !season_matches || !round_matches {
            warn!(
                "Schedule file covers season {:?} round {:?}, requested season {} round {}",
                response.season, response.round, season, round
            );
            return Err(PitwallError::ScheduleFetchError {
                description: format!("no schedule for season {} round {}", season, round),
            });
        }

        Ok(response.into())
    }

    async fn fetch_next_session_hint(&self) -> Result<NextSessionHint, PitwallError> {
        let response: NextSessionResponse = Self::read_json(&self.hint_path, "next session hint")?;
        Ok(response.into())
    }

    async fn fetch_user_timezone(&self) -> Result<Option<String>, PitwallError> {
        Ok(self.timezone.clone())
    }
}
