use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The configuration used for running the manager.
///
/// Every field has a default, so a configuration file only needs
/// the fields it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The serial port to use.
    /// Likely "/dev/ttyACMx" or "COMx".
    /// If not given, the first port which can be opened is used.
    pub port: Option<String>,

    /// Baud rate of the link.
    pub baud: u32,

    /// Upper bound for reading one line, in milliseconds.
    pub read_timeout_ms: u64,

    /// Upper bound for one write, in milliseconds.
    pub write_timeout_ms: u64,

    /// How long the reset line is held low when opening, in milliseconds.
    pub reset_settle_ms: u64,

    /// Pause between reads in the receive loop, in milliseconds.
    pub receive_interval_ms: u64,

    /// Pause between polls in the dispatch loop, in milliseconds.
    pub dispatch_interval_ms: u64,

    /// Pause after starting each loop, so the board can come up after the reset.
    pub startup_settle_ms: u64,

    /// How long stopping waits for each loop before giving up on it.
    /// `None` waits for as long as it takes.
    pub shutdown_timeout_ms: Option<u64>,

    /// Auto event value sent to the encoders when they are registered.
    /// Zero keeps them quiet.
    pub encoder_autoevent: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            baud: 57_600,
            read_timeout_ms: 1_000,
            write_timeout_ms: 100,
            reset_settle_ms: 1_000,
            receive_interval_ms: 10,
            dispatch_interval_ms: 1,
            startup_settle_ms: 1_000,
            shutdown_timeout_ms: Some(2_000),
            encoder_autoevent: 1,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents and validate the result.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        let config = Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not a valid configuration: {e}")))?;

        config.validate()?;

        Ok(config)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            port: Some("/dev/ttyACM0".into()),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(format!("Could not serialize: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p)?;

        Self::deserialize(&s)
    }

    /// Check the values make sense together.
    pub fn validate(&self) -> Result<(), Error> {
        if self.baud == 0 {
            return Err(Error::BadConfig("The baud rate must be non-zero".into()));
        }

        let must_be_positive = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("receive_interval_ms", self.receive_interval_ms),
            ("dispatch_interval_ms", self.dispatch_interval_ms),
        ];

        let zeroes = must_be_positive
            .iter()
            .filter(|(_, value)| *value == 0)
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();

        if !zeroes.is_empty() {
            return Err(Error::BadConfig(format!(
                "These must be non-zero, otherwise the loops would spin: {zeroes:?}"
            )));
        }

        if self.port.as_deref() == Some("") {
            return Err(Error::BadConfig(
                "An empty port was given, leave it out to pick the first available port".into(),
            ));
        }

        Ok(())
    }

    /// See [`Config::read_timeout_ms`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// See [`Config::write_timeout_ms`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// See [`Config::reset_settle_ms`].
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    /// See [`Config::receive_interval_ms`].
    pub fn receive_interval(&self) -> Duration {
        Duration::from_millis(self.receive_interval_ms)
    }

    /// See [`Config::dispatch_interval_ms`].
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// See [`Config::startup_settle_ms`].
    pub fn startup_settle(&self) -> Duration {
        Duration::from_millis(self.startup_settle_ms)
    }

    /// See [`Config::shutdown_timeout_ms`].
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serialize() {
        let c = Config::example();

        println!("{}", c.serialize_pretty().unwrap());
    }

    #[test]
    fn example_round_trips() {
        let c = Config::example();

        assert_eq!(Config::deserialize(&c.serialize_pretty().unwrap()).unwrap(), c);
    }

    #[test]
    fn deserialize_partial() {
        let input = r#"
(
    port: "/dev/ttyUSB0",
    baud: 115200,
    shutdown_timeout_ms: None,
)
"#;
        let config = Config::deserialize(input).unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.shutdown_timeout(), None);

        // Untouched fields keep their defaults.
        assert_eq!(config.receive_interval(), Duration::from_millis(10));
        assert_eq!(config.dispatch_interval(), Duration::from_millis(1));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn defaults() {
        let config = Config::deserialize("()").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.baud, 57_600);
        assert_eq!(config.reset_settle(), Duration::from_secs(1));
        assert_eq!(config.startup_settle(), Duration::from_secs(1));
    }

    #[test]
    fn bad_config_zero_intervals() {
        let c = Config {
            receive_interval_ms: 0,
            dispatch_interval_ms: 0,
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("receive_interval_ms"));
        assert!(err.contains("dispatch_interval_ms"));
        assert!(!err.contains("read_timeout_ms"));
    }

    #[test]
    fn bad_config_baud() {
        let err = Config::deserialize("(baud: 0)")
            .unwrap_err()
            .try_into_bad_config()
            .unwrap();

        assert!(err.contains("baud"));
    }

    #[test]
    fn bad_config_not_ron() {
        assert!(Config::deserialize("port = 3").is_err());
    }
}
