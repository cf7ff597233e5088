// Error types for pitwall

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum PitwallError {
    // Errors while fetching schedule data
    #[snafu(display("Schedule fetch failed: {description}"))]
    ScheduleFetchError { description: String },
    #[snafu(display("Error reading schedule file"))]
    ScheduleFileError { source: io::Error },
    #[snafu(display("Error parsing schedule payload"))]
    ScheduleParseError { source: serde_json::Error },

    // Date and time errors
    #[snafu(display("Malformed session timestamp: {value}"))]
    MalformedTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[snafu(display("Unknown timezone: {timezone}"))]
    UnknownTimezone { timezone: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Output errors
    #[snafu(display("Error serializing the timeline snapshot"))]
    SnapshotSerializeError { source: serde_json::Error },

    // View lifecycle errors
    #[snafu(display("The view was torn down before the schedule resolved"))]
    ViewTornDown,
    #[snafu(display("The poller is already running"))]
    PollerAlreadyRunning,
    #[snafu(display("Could not start the async runtime"))]
    RuntimeError { source: io::Error },
}
