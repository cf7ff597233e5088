// Countdown and timezone formatting for timeline states

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use log::warn;
use serde::Serialize;

use crate::errors::PitwallError;
use crate::timeline::TimelineState;

const SECONDS_PER_DAY: u64 = 86_400;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_MINUTE: u64 = 60;

const DATE_FORMAT: &str = "%d.%m.%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Time left until a session, split into display components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

/// Split a number of seconds into days, hours, minutes and seconds. Negative input is clamped
/// to zero.
pub fn breakdown(delta_seconds: i64) -> Breakdown {
    let delta = delta_seconds.max(0) as u64;
    Breakdown {
        days: delta / SECONDS_PER_DAY,
        hours: delta % SECONDS_PER_DAY / SECONDS_PER_HOUR,
        minutes: delta % SECONDS_PER_HOUR / SECONDS_PER_MINUTE,
        seconds: delta % SECONDS_PER_MINUTE,
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

/// Date and time text of an instant in a given timezone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalizedTime {
    pub date_text: String,
    pub time_text: String,
    pub timezone: String,
    /// `false` when the timezone could not be resolved and `date_text` holds the raw UTC ISO
    /// string instead.
    pub formatted: bool,
}

pub fn parse_timezone(timezone_id: &str) -> Result<Tz, PitwallError> {
    timezone_id
        .trim()
        .parse::<Tz>()
        .map_err(|_| PitwallError::UnknownTimezone {
            timezone: timezone_id.to_string(),
        })
}

/// Render `instant` as wall-clock text in `timezone_id`. Reads no process-wide locale or
/// timezone state.
pub fn localize(instant: DateTime<Utc>, timezone_id: &str) -> LocalizedTime {
    match parse_timezone(timezone_id) {
        Ok(tz) => {
            let local = instant.with_timezone(&tz);
            LocalizedTime {
                date_text: local.format(DATE_FORMAT).to_string(),
                time_text: local.format(TIME_FORMAT).to_string(),
                timezone: tz.name().to_string(),
                formatted: true,
            }
        }
        Err(e) => {
            warn!("{}, showing raw UTC time", e);
            LocalizedTime {
                date_text: instant.to_rfc3339_opts(SecondsFormat::Secs, true),
                time_text: String::new(),
                timezone: timezone_id.to_string(),
                formatted: false,
            }
        }
    }
}

/// What to show in place of the countdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    Remaining(Breakdown),
    Live,
    Finished,
    NoData,
}

/// Display-ready snapshot of a [`TimelineState`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimelineDisplay {
    pub event_label: Option<String>,
    pub headline: String,
    pub session_name: Option<String>,
    pub starts_at: Option<LocalizedTime>,
    pub countdown: Countdown,
}

pub fn render(state: &TimelineState, event_label: Option<&str>, timezone_id: &str) -> TimelineDisplay {
    let starts_at = state
        .active_session()
        .and_then(|session| session.scheduled_start_utc)
        .map(|start| localize(start, timezone_id));
    let session_name = state.active_session().map(|session| session.name.clone());

    let (headline, countdown) = match state {
        TimelineState::Future {
            session,
            seconds_remaining,
        } => (
            format!("Next: {}", session.name),
            Countdown::Remaining(breakdown(i64::try_from(*seconds_remaining).unwrap_or(i64::MAX))),
        ),
        TimelineState::Running { session } => (format!("Live: {}", session.name), Countdown::Live),
        TimelineState::Completed => ("Weekend finished".to_string(), Countdown::Finished),
        TimelineState::Unknown => ("No schedule data".to_string(), Countdown::NoData),
    };

    TimelineDisplay {
        event_label: event_label.map(str::to_string),
        headline,
        session_name,
        starts_at,
        countdown,
    }
}

impl fmt::Display for TimelineDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.event_label {
            write!(f, "{} | ", label)?;
        }
        write!(f, "{}", self.headline)?;
        if let Some(when) = &self.starts_at {
            if when.formatted {
                write!(f, " ({} {} {})", when.date_text, when.time_text, when.timezone)?;
            } else {
                write!(f, " ({})", when.date_text)?;
            }
        }
        match &self.countdown {
            Countdown::Remaining(remaining) => write!(f, " in {}", remaining),
            Countdown::Live => write!(f, " [LIVE]"),
            Countdown::Finished | Countdown::NoData => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Session;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_breakdown_cascade() {
        assert_eq!(
            breakdown(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5),
            Breakdown {
                days: 2,
                hours: 3,
                minutes: 4,
                seconds: 5
            }
        );
        assert_eq!(breakdown(59).seconds, 59);
        assert_eq!(breakdown(3_600).hours, 1);
    }

    #[test]
    fn test_breakdown_clamps_negative() {
        assert_eq!(breakdown(-42), Breakdown::default());
        assert_eq!(breakdown(-42).to_string(), "00:00:00");
    }

    #[test]
    fn test_breakdown_display_omits_zero_days() {
        assert_eq!(breakdown(3 * 3_600 + 4 * 60 + 5).to_string(), "03:04:05");
        assert_eq!(breakdown(86_400 + 61).to_string(), "1d 00:01:01");
    }

    #[test]
    fn test_localize_differs_by_timezone_for_same_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 2, 22, 30, 0).unwrap();

        let utc = localize(instant, "UTC");
        let gmt_plus_3 = localize(instant, "Etc/GMT-3");

        assert!(utc.formatted && gmt_plus_3.formatted);
        assert_eq!((utc.date_text.as_str(), utc.time_text.as_str()), ("02.03.2024", "22:30"));
        assert_eq!(
            (gmt_plus_3.date_text.as_str(), gmt_plus_3.time_text.as_str()),
            ("03.03.2024", "01:30")
        );

        // both describe the same point in time
        let tz = parse_timezone("Etc/GMT-3").unwrap();
        let reparsed = chrono::NaiveDateTime::parse_from_str(
            &format!("{} {}", gmt_plus_3.date_text, gmt_plus_3.time_text),
            "%d.%m.%Y %H:%M",
        )
        .unwrap()
        .and_local_timezone(tz)
        .single()
        .unwrap();
        assert_eq!(reparsed.with_timezone(&Utc), instant);
    }

    #[test]
    fn test_localize_unknown_timezone_is_unformatted() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap();
        let localized = localize(instant, "Mars/Olympus_Mons");
        assert!(!localized.formatted);
        assert_eq!(localized.date_text, "2024-03-02T15:00:00Z");
        assert_eq!(localized.timezone, "Mars/Olympus_Mons");
    }

    #[test]
    fn test_localize_is_independent_across_threads() {
        let instant = Utc.with_ymd_and_hms(2024, 11, 23, 6, 0, 0).unwrap();
        let handles: Vec<_> = ["UTC", "Europe/Moscow", "America/Los_Angeles", "Asia/Tokyo"]
            .into_iter()
            .map(|tz| std::thread::spawn(move || (tz, localize(instant, tz))))
            .collect();

        for handle in handles {
            let (tz, localized) = handle.join().unwrap();
            let expected = localize(instant, tz);
            assert_eq!(localized, expected);
        }
        assert_eq!(localize(instant, "Europe/Moscow").time_text, "09:00");
        assert_eq!(localize(instant, "America/Los_Angeles").time_text, "22:00");
    }

    #[test]
    fn test_display_snapshot_serializes() {
        let start = Utc.with_ymd_and_hms(2024, 5, 26, 13, 0, 0).unwrap();
        let display = render(
            &TimelineState::Future {
                session: Session::new("Race", Some(start)),
                seconds_remaining: 3_725,
            },
            None,
            "UTC",
        );

        let value = serde_json::to_value(&display).unwrap();
        assert_eq!(value["headline"], "Next: Race");
        assert_eq!(value["event_label"], serde_json::Value::Null);
        assert_eq!(value["starts_at"]["date_text"], "26.05.2024");
        assert_eq!(
            value["countdown"],
            serde_json::json!({"kind": "remaining", "days": 0, "hours": 1, "minutes": 2, "seconds": 5})
        );
    }

    #[test]
    fn test_render_states() {
        let start = Utc.with_ymd_and_hms(2024, 5, 26, 13, 0, 0).unwrap();
        let session = Session::new("Race", Some(start));

        let future = render(
            &TimelineState::Future {
                session: session.clone(),
                seconds_remaining: 90_061,
            },
            Some("Monaco Grand Prix"),
            "Europe/Monaco",
        );
        assert_eq!(future.countdown, Countdown::Remaining(breakdown(90_061)));
        assert_eq!(future.session_name.as_deref(), Some("Race"));
        assert_eq!(future.starts_at.as_ref().unwrap().time_text, "15:00");
        assert_eq!(
            future.to_string(),
            "Monaco Grand Prix | Next: Race (26.05.2024 15:00 Europe/Monaco) in 1d 01:01:01"
        );

        let live = render(&TimelineState::Running { session }, None, "UTC");
        assert_eq!(live.countdown, Countdown::Live);
        assert_eq!(live.to_string(), "Live: Race (26.05.2024 13:00 UTC) [LIVE]");

        let done = render(&TimelineState::Completed, None, "UTC");
        assert_eq!(done.countdown, Countdown::Finished);
        assert!(done.starts_at.is_none());

        let unknown = render(&TimelineState::Unknown, None, "UTC");
        assert_eq!(unknown.countdown, Countdown::NoData);
        assert_eq!(unknown.to_string(), "No schedule data");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_breakdown_recomposes(delta in 0i64..10_000_000) {
            let b = breakdown(delta);
            prop_assert!(b.hours < 24 && b.minutes < 60 && b.seconds < 60);
            let total = b.days * 86_400 + b.hours * 3_600 + b.minutes * 60 + b.seconds;
            prop_assert_eq!(total, delta as u64);
        }
    }
}
