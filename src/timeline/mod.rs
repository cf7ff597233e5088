// Session timeline state engine
// Classifies an event weekend as upcoming, live, finished or unknown for a given instant

pub mod clock;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

use crate::schedule::{ResolvedSchedule, Schedule, Session};

pub use clock::{Clock, FixedClock, SystemClock};

/// How long a session is considered live after its scheduled start.
pub const SESSION_DURATION_MINUTES: i64 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Future,
    Running,
    Completed,
    Unknown,
}

/// What is happening on the weekend right now.
///
/// A session is attached exactly when the phase is `Future` or `Running`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TimelineState {
    Future {
        session: Session,
        seconds_remaining: u64,
    },
    Running {
        session: Session,
    },
    Completed,
    Unknown,
}

impl TimelineState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Future { .. } => Phase::Future,
            Self::Running { .. } => Phase::Running,
            Self::Completed => Phase::Completed,
            Self::Unknown => Phase::Unknown,
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        match self {
            Self::Future { session, .. } | Self::Running { session } => Some(session),
            Self::Completed | Self::Unknown => None,
        }
    }

    /// Whole seconds until the active session starts. Zero unless the phase is `Future`.
    pub fn seconds_remaining(&self) -> u64 {
        match self {
            Self::Future {
                seconds_remaining, ..
            } => *seconds_remaining,
            Self::Running { .. } | Self::Completed | Self::Unknown => 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TimelineEngine {
    session_duration: Duration,
}

impl Default for TimelineEngine {
    fn default() -> Self {
        Self::new(Duration::minutes(SESSION_DURATION_MINUTES))
    }
}

impl TimelineEngine {
    pub fn new(session_duration: Duration) -> Self {
        Self {
            session_duration: session_duration.max(Duration::zero()),
        }
    }

    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// Classify `schedule` at `now`.
    ///
    /// Sessions without a start time are ignored. The rest are scanned in chronological order
    /// (ties keep source order) and the first one that is either still ahead of `now` or whose
    /// live window `[start, start + duration]` contains `now` becomes the active session.
    /// Later sessions are never consulted once a match is found, so overlapping windows still
    /// produce a single active session.
    pub fn evaluate(&self, schedule: &Schedule, now: DateTime<Utc>) -> TimelineState {
        let sessions = schedule.classifiable();
        if sessions.is_empty() {
            debug!("No session with a start time among {}", schedule.len());
            return TimelineState::Unknown;
        }

        for (session, start) in sessions {
            if now < start {
                return TimelineState::Future {
                    session: session.clone(),
                    seconds_remaining: ceil_seconds(start - now),
                };
            }
            if now <= start + self.session_duration {
                return TimelineState::Running {
                    session: session.clone(),
                };
            }
        }

        TimelineState::Completed
    }

    /// Classify a reconciled schedule. A finished season is `Completed` without scanning.
    pub fn evaluate_resolved(&self, resolved: &ResolvedSchedule, now: DateTime<Utc>) -> TimelineState {
        match resolved {
            ResolvedSchedule::Sessions { schedule, .. } => self.evaluate(schedule, now),
            ResolvedSchedule::SeasonFinished => TimelineState::Completed,
            ResolvedSchedule::Unavailable => TimelineState::Unknown,
        }
    }
}

fn ceil_seconds(delta: Duration) -> u64 {
    if delta <= Duration::zero() {
        return 0;
    }
    let whole = delta.num_seconds();
    let whole = if delta.subsec_nanos() > 0 { whole + 1 } else { whole };
    whole.max(0) as u64
}
