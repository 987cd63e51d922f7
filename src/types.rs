//! Types for printer status and RFID operations

use serde::{Deserialize, Serialize};

/// Label tag reading reported by the printer.
///
/// Dimensions are optional because they come from an untyped source (the tag block or
/// JSON from a caller) and are validated by the profile detector before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RfidReading {
    #[serde(default)]
    pub width_mm: Option<f64>,
    #[serde(default)]
    pub height_mm: Option<f64>,
    #[serde(rename = "type", default)]
    pub label_type: Option<i64>,
    /// Hex dump of the tag payload as received
    #[serde(default)]
    pub raw_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_len: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_len: Option<u16>,
}

impl RfidReading {
    /// Build a reading from caller-supplied JSON.
    ///
    /// Missing fields become `None`; a field of the wrong type is an error.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Keys accepted by the `GET_INFO` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardVersion = 12,
}

/// Decoded `GET_INFO` answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Number(u64),
    Version(f64),
    Serial(String),
}

/// Printer state reported by a heartbeat.
///
/// Which fields are present depends on the firmware's payload length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatStatus {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

impl HeartbeatStatus {
    pub(crate) fn from_payload(data: &[u8]) -> Self {
        let at = |i: usize| data.get(i).copied();
        match data.len() {
            20 => Self {
                paper_state: at(18),
                rfid_read_state: at(19),
                ..Self::default()
            },
            19 => Self {
                closing_state: at(15),
                power_level: at(16),
                paper_state: at(17),
                rfid_read_state: at(18),
            },
            13 => Self {
                closing_state: at(9),
                power_level: at(10),
                paper_state: at(11),
                rfid_read_state: at(12),
            },
            10 => Self {
                closing_state: at(8),
                power_level: at(9),
                rfid_read_state: at(8),
                ..Self::default()
            },
            9 => Self {
                closing_state: at(8),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// Progress of the current print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrintStatus {
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

/// Convert bytes to lowercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
