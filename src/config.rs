/*!
 # Runtime configuration

 Optional TOML file read by the binaries. Every key has a default, so an
 empty file is valid:

 ```toml
 controller_id = "feeder-07"
 poll_interval_secs = 12
 request_timeout_secs = 4
 refresh_settle_millis = 1500
 max_settings = 10
 ```
*/

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::store::MAX_SETTINGS;
use crate::{Error, Result};

/// Settings for talking to one feeder controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeederConfig {
    /// Controller the binaries address
    pub controller_id: Option<String>,
    /// Seconds between telemetry polls
    pub poll_interval_secs: u64,
    /// Seconds before a controller request counts as unanswered
    pub request_timeout_secs: u64,
    /// Milliseconds to wait after a refresh command before reading telemetry
    pub refresh_settle_millis: u64,
    /// Settings the store accepts (1-10)
    pub max_settings: usize,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            controller_id: None,
            poll_interval_secs: 12,
            request_timeout_secs: 4,
            refresh_settle_millis: 1500,
            max_settings: MAX_SETTINGS,
        }
    }
}

impl FeederConfig {
    /// Reads and validates a TOML file
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Reading configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FeederConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SETTINGS).contains(&self.max_settings) {
            return Err(Error::Config(format!(
                "max_settings must be between 1 and {MAX_SETTINGS}, got {}",
                self.max_settings
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_settle_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = FeederConfig::from_toml_str("").unwrap();
        assert_eq!(config, FeederConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(4));
        assert_eq!(config.refresh_settle_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn partial_file_overrides() {
        let config = FeederConfig::from_toml_str("controller_id = \"pond-3\"\nmax_settings = 4\n").unwrap();
        assert_eq!(config.controller_id.as_deref(), Some("pond-3"));
        assert_eq!(config.max_settings, 4);
        assert_eq!(config.poll_interval_secs, 12);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            FeederConfig::from_toml_str("max_settings = 11"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FeederConfig::from_toml_str("request_timeout_secs = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(FeederConfig::from_toml_str("colour = 3"), Err(Error::Toml(_))));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_secs = 120").unwrap();
        let config = FeederConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(120));

        let missing = FeederConfig::load(Path::new("/nonexistent/feeder.toml"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
