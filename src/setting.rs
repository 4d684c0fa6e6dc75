/*!
 # Feeding settings

 This module defines one scheduled feeding event and the typed values it is
 built from: start time, feed mass, grams dispatched per cycle and the gap
 between cycles.
*/

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::metrics::{self, SettingMetrics};
use crate::{Error, Result};

/// Wall-clock start time of a setting, kept as the operator or device wrote it
///
/// Operator input is `HH:MM`. Decoded device data may carry other digit
/// tokens, which are kept verbatim and simply never resolve to a clock time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StartTime(String);

impl StartTime {
    /// Creates a start time from text, trimming surrounding whitespace
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self(text.trim().to_string())
    }

    /// Raw text of the start time
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether no start time was given
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses `H:MM` or `HH:MM` into hours and minutes
    pub fn hours_minutes(&self) -> Option<(u32, u32)> {
        let (hours, minutes) = self.0.split_once(':')?;
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(hours) || hours.len() > 2 || !digits(minutes) || minutes.len() != 2 {
            return None;
        }

        let hours: u32 = hours.parse().ok()?;
        let minutes: u32 = minutes.parse().ok()?;
        (hours < 24 && minutes < 60).then_some((hours, minutes))
    }

    /// Minutes since midnight, if the text is a valid clock time
    pub fn minutes_of_day(&self) -> Option<u32> {
        self.hours_minutes().map(|(h, m)| h * 60 + m)
    }

    /// Clock time, if the text is a valid `HH:MM`
    pub fn clock(&self) -> Option<NaiveTime> {
        let (h, m) = self.hours_minutes()?;
        NaiveTime::from_hms_opt(h, m, 0)
    }

    /// Same start: equal clock times, or identical text when either is not a clock time
    pub fn same_as(&self, other: &StartTime) -> bool {
        match (self.clock(), other.clock()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0 == other.0,
        }
    }

    /// Zero-padded `HH:MM` form, if the text is a valid clock time
    pub fn normalized(&self) -> Option<StartTime> {
        self.clock().map(StartTime::from)
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StartTime {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for StartTime {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<StartTime> for String {
    fn from(start: StartTime) -> String {
        start.0
    }
}

impl From<NaiveTime> for StartTime {
    fn from(time: NaiveTime) -> Self {
        Self(format!("{:02}:{:02}", time.hour(), time.minute()))
    }
}

/// Feed mass in whole kilograms (0-2000)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FeedLevel(u16);

impl FeedLevel {
    /// Largest feed level the controller accepts
    pub const MAX_KG: u32 = 2000;

    /// Creates a feed level, rejecting values above [`FeedLevel::MAX_KG`]
    pub fn new(kg: u32) -> Result<Self> {
        if kg > Self::MAX_KG {
            return Err(Error::ValueOutOfRange(kg, 0, Self::MAX_KG));
        }
        Ok(Self(kg as u16))
    }

    /// Creates a feed level, clamping values above [`FeedLevel::MAX_KG`]
    pub fn saturating(kg: u32) -> Self {
        Self(kg.min(Self::MAX_KG) as u16)
    }

    /// Feed level in kilograms
    pub fn kg(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for FeedLevel {
    type Error = Error;

    fn try_from(kg: u32) -> Result<Self> {
        Self::new(kg)
    }
}

impl From<FeedLevel> for u32 {
    fn from(level: FeedLevel) -> u32 {
        level.kg()
    }
}

/// Grams dispatched per feed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DispatchGrams {
    /// 250 g per cycle
    #[default]
    G250,
    /// 500 g per cycle
    G500,
}

impl DispatchGrams {
    /// Every supported dispatch amount
    pub const ALL: [DispatchGrams; 2] = [DispatchGrams::G250, DispatchGrams::G500];

    /// Grams per cycle
    pub fn grams(self) -> u32 {
        match self {
            DispatchGrams::G250 => 250,
            DispatchGrams::G500 => 500,
        }
    }

    /// Maps a gram amount back to a supported value
    pub fn from_grams(grams: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.grams() == grams)
    }
}

impl TryFrom<u32> for DispatchGrams {
    type Error = Error;

    fn try_from(grams: u32) -> Result<Self> {
        Self::from_grams(grams).ok_or_else(|| {
            Error::InvalidSetting(format!("dispatch must be 250 or 500 grams, got {grams}"))
        })
    }
}

impl From<DispatchGrams> for u32 {
    fn from(dispatch: DispatchGrams) -> u32 {
        dispatch.grams()
    }
}

/// Seconds between two feed cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TimeGap {
    /// 3 minutes
    #[default]
    S180,
    /// 4 minutes
    S240,
    /// 5 minutes
    S300,
    /// 6 minutes
    S360,
}

impl TimeGap {
    /// Every supported time gap
    pub const ALL: [TimeGap; 4] = [TimeGap::S180, TimeGap::S240, TimeGap::S300, TimeGap::S360];

    /// Gap length in seconds
    pub fn seconds(self) -> u32 {
        match self {
            TimeGap::S180 => 180,
            TimeGap::S240 => 240,
            TimeGap::S300 => 300,
            TimeGap::S360 => 360,
        }
    }

    /// Maps a number of seconds back to a supported gap
    pub fn from_seconds(seconds: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.seconds() == seconds)
    }
}

impl TryFrom<u32> for TimeGap {
    type Error = Error;

    fn try_from(seconds: u32) -> Result<Self> {
        Self::from_seconds(seconds).ok_or_else(|| {
            Error::InvalidSetting(format!(
                "time gap must be one of 180, 240, 300 or 360 seconds, got {seconds}"
            ))
        })
    }
}

impl From<TimeGap> for u32 {
    fn from(gap: TimeGap) -> u32 {
        gap.seconds()
    }
}

/// One scheduled feeding event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingSetting {
    /// 1-based position in the owning store, 0 until stored
    #[serde(default)]
    pub(crate) position: usize,
    /// Start time of the first cycle
    pub start_time: StartTime,
    /// Total feed mass in kilograms
    pub feed_level: FeedLevel,
    /// Grams dispatched per cycle
    #[serde(default)]
    pub dispatch: DispatchGrams,
    /// Seconds between cycles
    #[serde(default)]
    pub time_gap: TimeGap,
    /// Free-form duration text shown to the operator, never used in calculations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_duration_override: Option<String>,
    /// Absolute start instant reported by the device, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_start: Option<NaiveDateTime>,
}

impl FeedingSetting {
    /// Creates an unstored setting
    pub fn new(
        start_time: impl Into<StartTime>,
        feed_level: FeedLevel,
        dispatch: DispatchGrams,
        time_gap: TimeGap,
    ) -> Self {
        Self {
            position: 0,
            start_time: start_time.into(),
            feed_level,
            dispatch,
            time_gap,
            feed_duration_override: None,
            full_start: None,
        }
    }

    /// Attaches display-only duration text
    pub fn with_feed_duration_override(mut self, text: impl Into<String>) -> Self {
        self.feed_duration_override = Some(text.into());
        self
    }

    /// Attaches the absolute start instant
    pub fn with_full_start(mut self, start: NaiveDateTime) -> Self {
        self.full_start = Some(start);
        self
    }

    /// 1-based position in the owning store (0 if not stored)
    pub fn position(&self) -> usize {
        self.position
    }

    /// Display label, always `Setting {position}`
    pub fn label(&self) -> String {
        format!("Setting {}", self.position)
    }

    /// Number of dispatch cycles needed for the feed level
    pub fn cycles(&self) -> u32 {
        metrics::cycles(self.feed_level.kg(), self.dispatch.grams())
    }

    /// Total run time in seconds
    pub fn run_duration_seconds(&self) -> u64 {
        metrics::run_duration_seconds(
            self.feed_level.kg(),
            self.dispatch.grams(),
            self.time_gap.seconds(),
        )
    }

    /// Half-open `[start, end)` interval in minutes since midnight
    pub fn interval_minutes(&self) -> Option<(u32, u32)> {
        metrics::interval_minutes(
            &self.start_time,
            self.feed_level.kg(),
            self.dispatch.grams(),
            self.time_gap.seconds(),
        )
    }

    /// Instant the run starts: the full start when known, else `today` at the start time
    pub fn base_instant(&self, today: NaiveDate) -> Option<NaiveDateTime> {
        self.full_start
            .or_else(|| self.start_time.clock().map(|t| today.and_time(t)))
    }

    /// Cycle count, run time and end time for display
    pub fn metrics(&self, today: NaiveDate) -> SettingMetrics {
        SettingMetrics::compute(self, today)
    }

    /// Checks operator input and zero-pads the start time
    ///
    /// An empty start passes through so validation can report it as missing.
    /// Any other text must be a clock time.
    pub fn normalize_start(mut self) -> Result<Self> {
        if self.start_time.is_empty() {
            return Ok(self);
        }
        match self.start_time.normalized() {
            Some(start) => {
                self.start_time = start;
                Ok(self)
            }
            None => Err(Error::InvalidSetting(format!(
                "start time must be HH:MM, got {:?}",
                self.start_time.as_str()
            ))),
        }
    }

    /// Same start, feed level, gap and dispatch
    pub fn is_exact_duplicate_of(&self, other: &FeedingSetting) -> bool {
        self.start_time.same_as(&other.start_time)
            && self.feed_level == other.feed_level
            && self.time_gap == other.time_gap
            && self.dispatch == other.dispatch
    }
}

/// Parses `HH:MM,kg[,grams[,gap_seconds]]`, as typed on the command line
impl FromStr for FeedingSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(',').map(str::trim);

        let start = fields.next().unwrap_or_default();
        let number = |field: Option<&str>, name: &str| -> Result<Option<u32>> {
            match field {
                None | Some("") => Ok(None),
                Some(text) => text
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| Error::InvalidSetting(format!("{name} is not a number: {text}"))),
            }
        };

        let kg = number(fields.next(), "feed level")?.unwrap_or(0);
        let dispatch = match number(fields.next(), "dispatch")? {
            Some(grams) => DispatchGrams::try_from(grams)?,
            None => DispatchGrams::default(),
        };
        let gap = match number(fields.next(), "time gap")? {
            Some(seconds) => TimeGap::try_from(seconds)?,
            None => TimeGap::default(),
        };

        if let Some(extra) = fields.next() {
            return Err(Error::InvalidSetting(format!("unexpected field: {extra}")));
        }

        FeedingSetting::new(start, FeedLevel::new(kg)?, dispatch, gap).normalize_start()
    }
}
