/*!
 # Controller wire codec

 The controller speaks `key=value` pairs joined by `&`. Setting commands
 always carry the same keys in the same order:

 | Key    | Field                        | Token               |
 |--------|------------------------------|---------------------|
 | `c0`   | command code                 | `212`               |
 | `as1`  | start time                   | `HHMM`              |
 | `as2`  | feed level (kg)              | 4 digits            |
 | `as3`  | total run time               | `HHMM`, `0000` if 0 |
 | `as4`  | time gap (s)                 | 4 digits            |
 | `as9`  | dispatch (g)                 | 4 digits            |
 | `as10` | cycle count                  | 4 digits            |

 With several settings each value is the `:`-joined list of per-setting
 tokens, in list order, so the n-th token of every key describes the same
 setting.

 Acknowledgements are decoded leniently: missing or unreadable fields fall
 back to defaults instead of failing the whole report.
*/

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::setting::{DispatchGrams, FeedLevel, FeedingSetting, StartTime, TimeGap};
use crate::timestamp;

/// Commands understood by the controller (`c0`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask the controller to report fresh telemetry
    Refresh,
    /// Run the controller self test
    SelfTest,
    /// Replace the feeding settings
    ApplySettings,
}

impl Command {
    /// Numeric command code
    pub fn code(self) -> u16 {
        match self {
            Command::Refresh => 201,
            Command::SelfTest => 203,
            Command::ApplySettings => 212,
        }
    }

    /// Payload carrying only the command code, e.g. `c0=201`
    pub fn bare_payload(self) -> String {
        format!("c0={}", self.code())
    }
}

/// Whether to send one setting or the whole list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeMode {
    /// One token per key, from the first setting
    Single,
    /// `:`-joined tokens for every setting
    #[default]
    Multi,
}

/// Body posted to the controller command endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub payload: String,
}

impl CommandRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Request carrying a bare command
    pub fn command(command: Command) -> Self {
        Self::new(command.bare_payload())
    }
}

/// Controller acknowledgement of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Controller confirmed the command
    Received,
    /// Command was relayed but the controller never confirmed it
    NotReceived,
    /// Anything else
    Unexpected,
}

/// Response of the controller command endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub ack: Option<String>,
    #[serde(default)]
    pub ack_payload: Option<String>,
}

impl CommandResponse {
    pub fn status(&self) -> AckStatus {
        match self.ack.as_deref() {
            Some("received") => AckStatus::Received,
            Some("not_received") => AckStatus::NotReceived,
            _ => AckStatus::Unexpected,
        }
    }
}

/// Settings last accepted by the controller, as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSettingResponse {
    /// Acknowledged settings payload
    #[serde(default)]
    pub sent_settings: String,
    /// Compact controller timestamp of when they were accepted
    #[serde(default)]
    pub set_time_raw: Option<String>,
}

/// Decoded acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAck {
    /// Settings the controller holds, positions assigned
    pub settings: Vec<FeedingSetting>,
    /// When the controller accepted them, or the caller's fallback
    pub accepted_at: NaiveDateTime,
}

fn pad4(value: u64) -> String {
    format!("{value:04}")
}

fn start_token(start: &StartTime) -> String {
    if start.is_empty() {
        return "0000".to_string();
    }
    let token = start.as_str().replacen(':', "", 1);
    format!("{token:0>4}")
}

fn run_time_token(run_seconds: u64) -> String {
    if run_seconds == 0 {
        return "0000".to_string();
    }
    let hours = run_seconds / 3600;
    let minutes = (run_seconds % 3600) / 60;
    format!("{hours:02}{minutes:02}")
}

fn assemble(fields: [String; 6]) -> String {
    let [as1, as2, as3, as4, as9, as10] = fields;
    format!(
        "c0={}&as1={as1}&as2={as2}&as3={as3}&as4={as4}&as9={as9}&as10={as10}",
        Command::ApplySettings.code()
    )
}

fn tokens(setting: &FeedingSetting) -> [String; 6] {
    [
        start_token(&setting.start_time),
        pad4(u64::from(setting.feed_level.kg())),
        run_time_token(setting.run_duration_seconds()),
        pad4(u64::from(setting.time_gap.seconds())),
        pad4(u64::from(setting.dispatch.grams())),
        pad4(u64::from(setting.cycles())),
    ]
}

/// Encodes one setting
///
/// Run times of 100 hours or more produce a longer `as3` token; nothing is truncated.
pub fn encode_single(setting: &FeedingSetting) -> String {
    assemble(tokens(setting))
}

/// Encodes every setting, `:`-joining the tokens of each key
///
/// Returns an empty string for an empty list.
pub fn encode_multi(settings: &[FeedingSetting]) -> String {
    if settings.is_empty() {
        return String::new();
    }

    let mut columns: [Vec<String>; 6] = Default::default();
    for setting in settings {
        for (column, token) in columns.iter_mut().zip(tokens(setting)) {
            column.push(token);
        }
    }
    assemble(columns.map(|column| column.join(":")))
}

/// Encodes a settings command
///
/// An empty list always falls back to the single form of a default setting,
/// so a command is never sent without values.
#[instrument(skip(settings), fields(count = settings.len()))]
pub fn encode(settings: &[FeedingSetting], mode: EncodeMode) -> String {
    let payload = match (mode, settings.first()) {
        (EncodeMode::Multi, Some(_)) => encode_multi(settings),
        (EncodeMode::Single, Some(first)) => encode_single(first),
        (_, None) => encode_single(&FeedingSetting::new(
            StartTime::default(),
            FeedLevel::default(),
            DispatchGrams::default(),
            TimeGap::default(),
        )),
    };
    debug!("Encoded payload: {}", payload);
    payload
}

/// Value of the first `key=` pair in a `&`-joined payload
fn field<'a>(payload: &'a str, key: &str) -> Option<&'a str> {
    payload
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v)
}

/// Splits a multi value on `|`, else `:`, else keeps it whole
fn split_list(value: &str) -> Vec<&str> {
    if value.contains('|') {
        value.split('|').collect()
    } else if value.contains(':') {
        value.split(':').collect()
    } else {
        vec![value]
    }
}

/// `HHMM` becomes `HH:MM`; other tokens keep their digits only
fn decode_start(token: &str) -> StartTime {
    let digits: String = token.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 4 {
        StartTime::new(format!("{}:{}", &digits[..2], &digits[2..]))
    } else {
        StartTime::new(digits)
    }
}

fn decode_feed_level(token: Option<&str>) -> FeedLevel {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return FeedLevel::default();
    };
    match token.parse::<u32>() {
        Ok(kg) if kg > FeedLevel::MAX_KG => {
            warn!("Feed level {} above {} kg, clamping", kg, FeedLevel::MAX_KG);
            FeedLevel::saturating(kg)
        }
        Ok(kg) => FeedLevel::saturating(kg),
        Err(_) => {
            warn!("Unreadable feed level {:?}, using 0", token);
            FeedLevel::default()
        }
    }
}

fn decode_enum<T: Default + std::fmt::Debug>(
    token: Option<&str>,
    name: &str,
    lookup: impl Fn(u32) -> Option<T>,
) -> T {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return T::default();
    };
    match token.parse().ok().and_then(lookup) {
        Some(value) => value,
        None => {
            let fallback = T::default();
            warn!("Unsupported {} {:?}, using {:?}", name, token, fallback);
            fallback
        }
    }
}

/// Decodes an acknowledgement or telemetry payload into settings
///
/// Only `as1`, `as2`, `as4` and `as9` are read; the rest are derivable or
/// ignored. One setting is produced per `as1` token. When `base_date` is
/// given, every token that reads as a clock time also gets a full start
/// instant on that date. An empty payload or a missing `as1` yields no
/// settings; a present but empty `as1` is one element and yields one setting
/// with no start time.
#[instrument(skip(payload))]
pub fn decode(payload: &str, base_date: Option<NaiveDate>) -> Vec<FeedingSetting> {
    let Some(as1) = field(payload, "as1") else {
        debug!("Payload has no as1 field, no settings");
        return Vec::new();
    };

    let list = |key: &str| field(payload, key).map(split_list).unwrap_or_default();
    let feed_levels = list("as2");
    let gaps = list("as4");
    let dispatches = list("as9");

    let settings: Vec<FeedingSetting> = split_list(as1)
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            let start = decode_start(token);
            trace!("Setting {}: start {:?} from {:?}", index + 1, start.as_str(), token);

            let mut setting = FeedingSetting::new(
                start,
                decode_feed_level(feed_levels.get(index).copied()),
                decode_enum(dispatches.get(index).copied(), "dispatch", DispatchGrams::from_grams),
                decode_enum(gaps.get(index).copied(), "time gap", TimeGap::from_seconds),
            );
            setting.full_start = base_date
                .zip(setting.start_time.clock())
                .map(|(date, time)| date.and_time(time));
            setting.position = index + 1;
            setting
        })
        .collect();

    debug!("Decoded {} settings", settings.len());
    settings
}

/// Decodes the controller's last accepted settings
///
/// Start instants are anchored on the reported acceptance date. When the
/// controller timestamp is missing or unreadable `now` is used instead.
#[instrument(skip(response, now))]
pub fn decode_last_setting(response: &LastSettingResponse, now: NaiveDateTime) -> DecodedAck {
    let accepted_at = response
        .set_time_raw
        .as_deref()
        .and_then(timestamp::parse)
        .unwrap_or_else(|| {
            debug!("No usable controller timestamp, using fallback");
            now
        });

    DecodedAck {
        settings: decode(&response.sent_settings, Some(accepted_at.date())),
        accepted_at,
    }
}

/// Decodes the older `ACK,<id>,HH:MM|HH:MM|...` acknowledgement
///
/// Only start times are carried; every other field takes its default. Anything
/// not starting with `ACK` yields no settings.
pub fn decode_legacy_ack(data: &str) -> Vec<FeedingSetting> {
    if !data.starts_with("ACK") {
        return Vec::new();
    }
    let Some(times) = data.split(',').nth(2) else {
        return Vec::new();
    };

    times
        .split('|')
        .enumerate()
        .map(|(index, time)| {
            let mut setting = FeedingSetting::new(
                time,
                FeedLevel::default(),
                DispatchGrams::default(),
                TimeGap::default(),
            );
            setting.position = index + 1;
            setting
        })
        .collect()
}
