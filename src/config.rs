use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub timeout: u64,
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeDetect {
    Rising,
    Falling,
}

impl Default for EdgeDetect {
    fn default() -> Self {
        EdgeDetect::Rising
    }
}

/// Line assignment and behaviour of the receiver chip wiring.
///
/// Defaults match the reference board: detected on 73, data on 86/75/76/77,
/// power-down on 87 and the indicator LED on 51.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReceiverConfig {
    pub chip: String,
    pub edge: EdgeDetect,
    pub detected: u32,
    pub data: [u32; 4],
    pub power_down: u32,
    pub led: u32,
    pub debounce_ms: u32,
    pub history_capacity: usize,
    pub broadcast_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip0".into(),
            edge: EdgeDetect::Rising,
            detected: 73,
            data: [86, 75, 76, 77],
            power_down: 87,
            led: 51,
            debounce_ms: 20,
            history_capacity: 32,
            broadcast_capacity: 64,
        }
    }
}

impl ReceiverConfig {
    /// Name of the property group, e.g. `gpio73`.
    pub fn group_name(&self) -> String {
        format!("gpio{}", self.detected)
    }

    pub fn lines(&self) -> [u32; 7] {
        let [d1, d2, d3, d4] = self.data;
        [self.led, self.detected, d1, d2, d3, d4, self.power_down]
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for line in self.lines() {
            if !seen.insert(line) {
                return Err(format!("GPIO line {line} is assigned more than once"));
            }
        }
        if self.debounce_ms == 0 {
            return Err("debounce_ms must be greater than zero".into());
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than zero".into());
        }
        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.receiver.validate().map_err(AppError::Config)?;
        Ok(config)
    }
}
