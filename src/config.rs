//! Printer configuration record supplied by the host application

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Usb,
    Bluetooth,
    /// Printing through a remote print server; no direct link to the device
    Server,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionType::Usb => "usb",
            ConnectionType::Bluetooth => "bluetooth",
            ConnectionType::Server => "server",
        };
        f.write_str(name)
    }
}

/// How a Bluetooth printer is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BluetoothMode {
    /// GATT over Bluetooth Low Energy
    #[default]
    Ble,
    /// Classic Bluetooth bound to a serial device (e.g. `/dev/rfcomm0`)
    Serial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub model: String,
    pub connection_type: ConnectionType,
    /// Serial port path, BLE address or BLE name. Optional for USB (auto-detect).
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub bluetooth_mode: BluetoothMode,
    #[serde(default = "default_density")]
    pub density: u8,
    /// Label size the host expects; detection warns when the loaded roll differs
    #[serde(default)]
    pub label_width_mm: Option<u16>,
    #[serde(default)]
    pub label_height_mm: Option<u16>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_density() -> u8 {
    3
}

fn default_enabled() -> bool {
    true
}

impl PrinterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_json_str(&contents)?)
    }
}
