use log::{info, warn};

use crate::errors::PitwallError;

use super::{HintStatus, NextSessionHint, Schedule, ScheduleSource};

/// Which data tier produced a schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleTier {
    /// The full per-session weekend schedule.
    Full,
    /// A one-session schedule synthesized from the next-session hint.
    Hint,
}

/// Canonical result of reconciling the schedule sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedSchedule {
    /// Sessions to classify against the clock.
    Sessions { schedule: Schedule, tier: ScheduleTier },
    /// The season is over; no temporal scan is needed.
    SeasonFinished,
    /// No source produced anything usable.
    Unavailable,
}

/// Resolved schedule plus the event label. The hint's label is preferred even when the full
/// schedule is authoritative. The full schedule's "Round N" label is the fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedSchedule {
    pub resolved: ResolvedSchedule,
    pub event_label: Option<String>,
}

/// Issue both schedule fetches concurrently and reconcile them once both have settled.
///
/// A rejected fetch only removes that source from consideration.
pub async fn aggregate(source: &dyn ScheduleSource, season: i32, round: u32) -> AggregatedSchedule {
    let (full, hint) = tokio::join!(
        source.fetch_full_schedule(season, round),
        source.fetch_next_session_hint()
    );
    reconcile(full, hint)
}

/// Pick the best available tier: full schedule, then hint session, then the hint's status.
pub fn reconcile(
    full: Result<Schedule, PitwallError>,
    hint: Result<NextSessionHint, PitwallError>,
) -> AggregatedSchedule {
    let full = full
        .inspect_err(|e| warn!("Full schedule unavailable: {}", e))
        .ok();
    let hint = hint
        .inspect_err(|e| warn!("Next session hint unavailable: {}", e))
        .ok();
    let event_label = hint
        .as_ref()
        .and_then(|h| h.event_label.clone())
        .or_else(|| full.as_ref().and_then(|s| s.event_label().map(str::to_string)));

    if let Some(schedule) = full.filter(|s| !s.is_empty()) {
        return AggregatedSchedule {
            resolved: ResolvedSchedule::Sessions {
                schedule,
                tier: ScheduleTier::Full,
            },
            event_label,
        };
    }

    let resolved = match hint {
        None => {
            info!("No schedule source produced data");
            ResolvedSchedule::Unavailable
        }
        Some(NextSessionHint {
            status,
            single_session,
            ..
        }) => match (status, single_session) {
            (HintStatus::Ok, Some(session)) => {
                info!("Falling back to next session hint '{}'", session.name);
                ResolvedSchedule::Sessions {
                    schedule: Schedule::new(vec![session]),
                    tier: ScheduleTier::Hint,
                }
            }
            (HintStatus::SeasonFinished, _) => {
                info!("Season finished according to next session hint");
                ResolvedSchedule::SeasonFinished
            }
            (HintStatus::Ok, None) | (HintStatus::NoSchedule, _) | (HintStatus::Error, _) => {
                info!("Next session hint carries no usable session ({:?})", status);
                ResolvedSchedule::Unavailable
            }
        },
    };

    AggregatedSchedule {
        resolved,
        event_label,
    }
}
