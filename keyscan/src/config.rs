use std::collections::BTreeSet;
use std::time::Duration;
use dotenv::var;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use keyscan_gpio::keypad::{KeypadConfig, MatrixOptions, ScanTiming};
use keyscan_gpio::{GpioActiveLevel, GpioBias, GpioDriveMode};
use crate::keys::KeyCode;
use crate::keys::KeyCode::*;

const DEFAULT_CONFIG_FILE: &str = "keyscan.json";

/// Which GPIO backend to open.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Register access through `/dev/gpiomem`.
    #[default]
    Gpiomem,
    /// Register access through `/dev/mem`, needs root.
    Mem,
    /// The GPIO character device named by `chip`.
    Gpiod,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Bias {
    #[default]
    None,
    PullUp,
    PullDown,
}

impl From<Bias> for GpioBias {
    fn from(bias: Bias) -> Self {
        match bias {
            Bias::None => GpioBias::None,
            Bias::PullUp => GpioBias::PullUp,
            Bias::PullDown => GpioBias::PullDown,
        }
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Drive {
    #[default]
    PushPull,
    OpenDrain,
}

impl From<Drive> for GpioDriveMode {
    fn from(drive: Drive) -> Self {
        match drive {
            Drive::PushPull => GpioDriveMode::PushPull,
            Drive::OpenDrain => GpioDriveMode::OpenDrain,
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("at least one row pin and one column pin are required")]
    NoPins,
    #[error("keymap has {keymap} rows, but {pins} row pins are configured")]
    RowCount { keymap: usize, pins: usize },
    #[error("keymap row {row} has {keymap} keys, but {pins} column pins are configured")]
    ColumnCount { row: usize, keymap: usize, pins: usize },
    #[error("pin {0} is used more than once")]
    DuplicatePin(usize),
    #[error("scan interval must be at least 1 ms")]
    ZeroInterval,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Character device used by the `gpiod` backend.
    pub chip: String,
    pub row_pins: Vec<usize>,
    pub col_pins: Vec<usize>,
    pub keymap: Vec<Vec<KeyCode>>,
    pub scan_interval_ms: u64,
    pub settle_delay_us: u64,
    pub initial_delay_ms: u64,
    /// Rows are pulled low to select them and columns read low when pressed.
    pub active_low: bool,
    pub col_bias: Bias,
    pub row_drive: Drive,
    /// Releasing this key stops the program.
    pub exit_key: Option<KeyCode>,
}

impl Config {
    fn path() -> String {
        var("KEYSCAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
    }

    /// Loads the config file, or returns `None` if there is none.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        let path = Self::path();
        match std::fs::File::open(&path) {
            Ok(file) => {
                let reader = std::io::BufReader::new(file);
                let config = serde_json::from_reader(reader)
                    .map_err(|e| eyre::eyre!("Invalid config file {}: {}", path, e))?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> eyre::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Checks the wiring before any pin is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.row_pins.is_empty() || self.col_pins.is_empty() {
            return Err(ConfigError::NoPins);
        }

        if self.keymap.len() != self.row_pins.len() {
            return Err(ConfigError::RowCount {
                keymap: self.keymap.len(),
                pins: self.row_pins.len(),
            });
        }

        if let Some((row, keys)) = self.keymap.iter().enumerate().find(|(_, keys)| keys.len() != self.col_pins.len()) {
            return Err(ConfigError::ColumnCount {
                row,
                keymap: keys.len(),
                pins: self.col_pins.len(),
            });
        }

        let mut seen = BTreeSet::new();
        if let Some(&pin) = self.row_pins.iter().chain(&self.col_pins).find(|&&pin| !seen.insert(pin)) {
            return Err(ConfigError::DuplicatePin(pin));
        }

        if self.scan_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        Ok(())
    }

    pub fn keypad_config(&self) -> KeypadConfig<KeyCode> {
        let mut config = KeypadConfig::new(self.row_pins.clone(), self.col_pins.clone(), self.keymap.clone());
        config.timing = ScanTiming {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            interval: Duration::from_millis(self.scan_interval_ms),
        };
        config.settle_delay = Duration::from_micros(self.settle_delay_us);
        config.options = MatrixOptions {
            active_level: if self.active_low { GpioActiveLevel::Low } else { GpioActiveLevel::High },
            col_bias: self.col_bias.into(),
            row_drive: self.row_drive.into(),
        };
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::default(),
            chip: "/dev/gpiochip0".to_string(),
            row_pins: vec![17, 5, 6, 13],
            col_pins: vec![23, 24, 12, 16],
            keymap: vec![
                vec![Key1, Key2, Key3, KeyA],
                vec![Key4, Key5, Key6, KeyB],
                vec![Key7, Key8, Key9, KeyC],
                vec![Backspace, Key0, KpEnter, KeyD],
            ],
            scan_interval_ms: 30,
            settle_delay_us: 10,
            initial_delay_ms: 100,
            active_low: false,
            col_bias: Bias::None,
            row_drive: Drive::PushPull,
            exit_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "row_pins": [2, 3],
                "col_pins": [4],
                "keymap": [["KEY_1"], ["KEY_KPENTER"]],
                "col_bias": "pull-down",
                "exit_key": "KEY_KPENTER"
            }"#,
        )
        .unwrap();

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.backend, Backend::Gpiomem);
        assert_eq!(config.scan_interval_ms, 30);
        assert_eq!(config.exit_key, Some(KpEnter));

        let keypad = config.keypad_config();
        assert_eq!(keypad.timing.initial_delay, Duration::from_millis(100));
        assert_eq!(keypad.settle_delay, Duration::from_micros(10));
        assert_eq!(keypad.options.col_bias, GpioBias::PullDown);
        assert_eq!(keypad.options.active_level, GpioActiveLevel::High);
    }

    #[test]
    fn keymap_must_match_the_pins() {
        let mut config = Config::default();
        config.row_pins.pop();
        assert_eq!(config.validate(), Err(ConfigError::RowCount { keymap: 4, pins: 3 }));

        let mut config = Config::default();
        config.keymap[2].pop();
        assert_eq!(config.validate(), Err(ConfigError::ColumnCount { row: 2, keymap: 3, pins: 4 }));
    }

    #[test]
    fn pins_may_not_be_shared() {
        let mut config = Config::default();
        config.col_pins[3] = 5;
        assert_eq!(config.validate(), Err(ConfigError::DuplicatePin(5)));
    }

    #[test]
    fn active_low_and_open_drain_reach_the_matrix() {
        let config = Config {
            active_low: true,
            row_drive: Drive::OpenDrain,
            ..Config::default()
        };

        let options = config.keypad_config().options;
        assert_eq!(options.active_level, GpioActiveLevel::Low);
        assert_eq!(options.row_drive, GpioDriveMode::OpenDrain);
    }
}
