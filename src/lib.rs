// Library interface for pitwall
// This allows integration tests to access internal modules

pub mod config;
pub mod countdown;
pub mod errors;
pub mod poller;
pub mod schedule;
pub mod timeline;
pub mod view;

// Re-export commonly used types
pub use config::PitwallConfig;
pub use countdown::{Breakdown, Countdown, LocalizedTime, TimelineDisplay, breakdown, localize, render};
pub use errors::PitwallError;
pub use poller::Poller;
pub use schedule::{
    AggregatedSchedule, FileScheduleSource, HintStatus, NextSessionHint, ResolvedSchedule,
    Schedule, ScheduleSource, ScheduleTier, Session,
};
pub use timeline::{Clock, FixedClock, Phase, SystemClock, TimelineEngine, TimelineState};
pub use view::{TeardownHandle, WeekendView};
