// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{path::Path, time::Duration};

use ::config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use crate::player::BUFFER_QN_LENGTH;

mod error;

pub use error::ConfigError;

/// Environment variables with this prefix override file settings.
const ENV_PREFIX: &str = "MIDISEQ";

const DEFAULT_REFILL_INTERVAL: &str = "50ms";
const DEFAULT_CLIENT_NAME: &str = "midiseq";

/// The configuration for playback.
#[derive(Debug, Deserialize)]
pub struct PlayerConfig {
    /// The MIDI output to play through.
    #[serde(default)]
    device: Option<String>,
    /// How far ahead of the sequencer clock to submit commands, in quarter notes.
    #[serde(default = "default_buffer_quarter_notes")]
    buffer_quarter_notes: u64,
    /// How often the buffer is checked.
    #[serde(default = "default_refill_interval")]
    refill_interval: String,
    /// The client name announced to the MIDI system.
    #[serde(default = "default_client_name")]
    client_name: String,
}

fn default_buffer_quarter_notes() -> u64 {
    BUFFER_QN_LENGTH
}

fn default_refill_interval() -> String {
    DEFAULT_REFILL_INTERVAL.to_string()
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            device: None,
            buffer_quarter_notes: BUFFER_QN_LENGTH,
            refill_interval: default_refill_interval(),
            client_name: default_client_name(),
        }
    }
}

impl PlayerConfig {
    /// Loads the configuration from the optional YAML file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<PlayerConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let config: PlayerConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<PlayerConfig, ConfigError> {
        let config: PlayerConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn buffer_quarter_notes(&self) -> u64 {
        self.buffer_quarter_notes
    }

    /// Returns the refill interval.
    pub fn refill_interval(&self) -> Result<Duration, ConfigError> {
        let interval: Duration = DurationString::from_string(self.refill_interval.clone())
            .map_err(|_| ConfigError::InvalidDuration(self.refill_interval.clone()))?
            .into();
        if interval.is_zero() {
            return Err(ConfigError::InvalidDuration(self.refill_interval.clone()));
        }
        Ok(interval)
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Overrides the device from the command line.
    pub fn set_device(&mut self, device: String) {
        self.device = Some(device);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_quarter_notes == 0 {
            return Err(ConfigError::InvalidValue(
                "buffer_quarter_notes must be at least 1".to_string(),
            ));
        }
        self.refill_interval()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::from_yaml("device: mock-device").expect("config");
        assert_eq!(Some("mock-device"), config.device());
        assert_eq!(8, config.buffer_quarter_notes());
        assert_eq!(
            Duration::from_millis(50),
            config.refill_interval().expect("interval")
        );
        assert_eq!("midiseq", config.client_name());

        let config = PlayerConfig::default();
        assert_eq!(None, config.device());
        assert_eq!(8, config.buffer_quarter_notes());
    }

    #[test]
    fn test_all_fields() {
        let yaml = r#"
            device: USB MIDI
            buffer_quarter_notes: 4
            refill_interval: 20ms
            client_name: sequencer
        "#;
        let config = PlayerConfig::from_yaml(yaml).expect("config");
        assert_eq!(Some("USB MIDI"), config.device());
        assert_eq!(4, config.buffer_quarter_notes());
        assert_eq!(
            Duration::from_millis(20),
            config.refill_interval().expect("interval")
        );
        assert_eq!("sequencer", config.client_name());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PlayerConfig::from_yaml("buffer_quarter_notes: 0"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            PlayerConfig::from_yaml("refill_interval: soon"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            PlayerConfig::from_yaml("refill_interval: 0ms"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            PlayerConfig::from_yaml("buffer_quarter_notes: lots"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(file, "device: mock-file\nbuffer_quarter_notes: 2").expect("write");

        let config = PlayerConfig::load(Some(file.path())).expect("load");
        assert_eq!(Some("mock-file"), config.device());
        assert_eq!(2, config.buffer_quarter_notes());

        assert!(matches!(
            PlayerConfig::load(Some(&file.path().with_extension("missing"))),
            Err(ConfigError::Load(_))
        ));
    }
}
