/*!
 # Aquaculture Feeder Controller Library

 A Rust library for planning feeding schedules on remote aquaculture feeder
 controllers and exchanging them with the device over its packed
 `key=value` command protocol.

 ## Features

 * Up to ten feeding settings per controller
 * Conflict checks (duplicate start, exact duplicate, overlapping runs)
 * Cycle count, run duration and end time calculation
 * Single and multi setting command payloads
 * Lenient decoding of controller acknowledgements
 * Compact `DDMMYYHHMM[SS]` device timestamp parsing
 * Cancellable telemetry polling

 ## Example

 ```rust
 use aqua_feeder_controller::*;

 fn main() -> Result<()> {
     let mut store = SettingStore::new();

     store.add(FeedingSetting::new("06:00", FeedLevel::new(40)?, DispatchGrams::G250, TimeGap::S180))?;
     store.add(FeedingSetting::new("18:00", FeedLevel::new(25)?, DispatchGrams::G500, TimeGap::S240))?;

     let payload = store.payload();
     assert!(payload.starts_with("c0=212&as1=0600:1800"));

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the feeder controller library
#[derive(Error, Debug)]
pub enum Error {
    /// Candidate setting conflicts with the stored list
    #[error("{0}")]
    Validation(#[from] ViolationKind),

    /// The store already holds the maximum number of settings
    #[error("You can only add up to {0} settings")]
    CapacityExceeded(usize),

    /// No setting at the given position
    #[error("No setting at position {0}")]
    NotFound(usize),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(u32, u32, u32),

    /// Setting text could not be understood
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Controller request timed out
    #[error("Controller did not respond within {0} ms")]
    Timeout(u64),

    /// Transport failure reported by a controller link
    #[error("Controller link error: {0}")]
    Link(String),

    /// Configuration rejected after parsing
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod codec;
pub mod config;
pub mod metrics;
pub mod setting;
pub mod store;
pub mod telemetry;
pub mod timestamp;
pub mod validator;

// Re-export key types
pub use codec::{
    AckStatus, Command, CommandRequest, CommandResponse, DecodedAck, EncodeMode,
    LastSettingResponse,
};
pub use config::FeederConfig;
pub use metrics::SettingMetrics;
pub use setting::{DispatchGrams, FeedLevel, FeedingSetting, StartTime, TimeGap};
pub use store::{SettingStore, SharedSettingStore, MAX_SETTINGS};
pub use telemetry::{ControllerLink, DeviceStatus, StatusReport, Telemetry, TelemetryPoller};
pub use validator::ViolationKind;
