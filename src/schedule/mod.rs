// Event weekend schedule model
// Sessions, schedules, the next-session hint and the payloads they are decoded from

pub mod aggregator;
pub mod source;

use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::PitwallError;

pub use aggregator::{AggregatedSchedule, ResolvedSchedule, ScheduleTier, aggregate, reconcile};
pub use source::{FileScheduleSource, ScheduleSource};

/// One timed activity within an event weekend, e.g. "Practice 1" or "Race".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    /// Scheduled start. Absent when the source had no start or it could not be parsed.
    pub scheduled_start_utc: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(name: impl Into<String>, scheduled_start_utc: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            scheduled_start_utc,
        }
    }

    /// Build a session from a raw ISO-8601 timestamp. A malformed timestamp is logged and the
    /// session is kept without a start time.
    pub fn from_iso(name: impl Into<String>, utc_iso: Option<&str>) -> Self {
        let name = name.into();
        let scheduled_start_utc = match utc_iso.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match parse_utc_timestamp(raw) {
                Ok(start) => Some(start),
                Err(e) => {
                    warn!("Session '{}' has an unusable start time: {}", name, e);
                    None
                }
            },
        };
        Self {
            name,
            scheduled_start_utc,
        }
    }
}

/// The set of sessions for one event weekend, in source order.
///
/// Source order carries no chronological meaning. Use [`Schedule::classifiable`] or
/// [`Schedule::chronological`] to get the sessions in time order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    sessions: Vec<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_label: Option<String>,
}

impl Schedule {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            event_label: None,
        }
    }

    pub fn with_event_label(mut self, label: impl Into<String>) -> Self {
        self.event_label = Some(label.into());
        self
    }

    /// Label of the weekend this schedule belongs to, when the payload identified it.
    pub fn event_label(&self) -> Option<&str> {
        self.event_label.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions that carry a start time, sorted by start. Sessions sharing a start keep their
    /// source order.
    pub fn classifiable(&self) -> Vec<(&Session, DateTime<Utc>)> {
        self.sessions
            .iter()
            .filter_map(|session| session.scheduled_start_utc.map(|start| (session, start)))
            .sorted_by_key(|(_, start)| *start)
            .collect()
    }

    /// Every session in display order: timed sessions by start, then untimed ones in source order.
    pub fn chronological(&self) -> Vec<&Session> {
        self.classifiable()
            .into_iter()
            .map(|(session, _)| session)
            .chain(
                self.sessions
                    .iter()
                    .filter(|session| session.scheduled_start_utc.is_none()),
            )
            .collect()
    }
}

impl From<Vec<Session>> for Schedule {
    fn from(sessions: Vec<Session>) -> Self {
        Self::new(sessions)
    }
}

/// Outcome reported by the next-session endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintStatus {
    Ok,
    SeasonFinished,
    NoSchedule,
    #[serde(other)]
    Error,
}

/// Degraded, single-session substitute for a full schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextSessionHint {
    pub status: HintStatus,
    pub single_session: Option<Session>,
    pub event_label: Option<String>,
}

impl NextSessionHint {
    pub fn new(status: HintStatus) -> Self {
        Self {
            status,
            single_session: None,
            event_label: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.single_session = Some(session);
        self
    }

    pub fn with_event_label(mut self, label: impl Into<String>) -> Self {
        self.event_label = Some(label.into());
        self
    }
}

/// A session as it appears on the wire.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionPayload {
    pub name: String,
    #[serde(default)]
    pub utc_iso: Option<String>,
}

impl From<SessionPayload> for Session {
    fn from(payload: SessionPayload) -> Self {
        Session::from_iso(payload.name, payload.utc_iso.as_deref())
    }
}

/// Body of the weekend schedule endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WeekendScheduleResponse {
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub sessions: Vec<SessionPayload>,
}

impl From<WeekendScheduleResponse> for Schedule {
    fn from(response: WeekendScheduleResponse) -> Self {
        let schedule = Schedule::new(response.sessions.into_iter().map(Session::from).collect());
        match response.round {
            Some(round) => schedule.with_event_label(format!("Round {}", round)),
            None => schedule,
        }
    }
}

/// Body of the next-session endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NextSessionResponse {
    pub status: HintStatus,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub session: Option<SessionPayload>,
}

impl NextSessionResponse {
    /// Display label for the event: its name, or "Round N" when only the round is known.
    pub fn event_label(&self) -> Option<String> {
        self.event_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.round.map(|round| format!("Round {}", round)))
    }
}

impl From<NextSessionResponse> for NextSessionHint {
    fn from(response: NextSessionResponse) -> Self {
        let event_label = response.event_label();
        NextSessionHint {
            status: response.status,
            single_session: response.session.map(Session::from),
            event_label,
        }
    }
}

/// Parse an ISO-8601 instant. Offsets and `Z` are honoured; a timestamp without an offset is
/// taken to be UTC.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>, PitwallError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(instant) => Ok(instant.with_timezone(&Utc)),
        Err(rfc_error) => ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
            .ok_or(PitwallError::MalformedTimestamp {
                value: raw.to_string(),
                source: rfc_error,
            }),
    }
}
