//! Error types for printer communication and label detection

use thiserror::Error;

/// Errors raised by the packet codec and the protocol client
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Frame failed header, footer or checksum validation
    #[error("Malformed packet: {0:02X?}")]
    MalformedPacket(Vec<u8>),

    /// Transport layer error (serial, BLE)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid parameter passed to a function
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Response decoded fine but its payload makes no sense
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Image cannot be printed on the target model
    #[error("Image error: {0}")]
    Image(String),
}

/// Errors raised by transport implementations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("No serial ports found")]
    NoPortsFound,

    /// More than one candidate port, the caller must pick one
    #[error("Multiple serial ports found, specify one of: {}", .0.join(", "))]
    AmbiguousPorts(Vec<String>),

    #[error("Bluetooth error: {0}")]
    Ble(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Operation attempted after `disconnect()`
    #[error("Transport is closed")]
    Closed,
}

/// Categorized failures of a label detection run.
///
/// The `Display` text is what ends up in [`DetectionResult::error`](crate::DetectionResult).
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Printer is not configured")]
    NotConfigured,

    #[error("Printer is not enabled")]
    NotEnabled,

    #[error("Connection type '{0}' does not support RFID detection")]
    UnsupportedConnection(String),

    #[error("No printer address configured for {0} connection")]
    MissingAddress(String),

    #[error("Could not connect to printer: {0}")]
    Connection(String),

    #[error("Printer did not answer the connection handshake")]
    Handshake,

    #[error("No RFID tag detected, is a label roll loaded?")]
    NoTag,

    #[error("Unknown label size: {width_mm}x{height_mm}mm reported by printer")]
    UnknownLabelSize { width_mm: String, height_mm: String },

    #[error("Printer communication failed: {0}")]
    Protocol(String),
}

/// Errors loading a [`PrinterConfig`](crate::PrinterConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid printer configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
