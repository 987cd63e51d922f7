//! NIIMBOT thermal label printer driver with serial and Bluetooth LE transports.
//!
//! # Features
//!
//! - `serial` - Serial port transport (USB, Bluetooth SPP) using the serialport crate
//! - `ble` - Bluetooth LE transport using btleplug on a dedicated worker thread
//! - `cli` - The `niimctl` command-line tool
//!
//! # Example
//!
//! ```ignore
//! use niimbot_link::{PrinterClient, PrinterModel, SerialTransport};
//!
//! let transport = SerialTransport::open(None)?;
//! let mut printer = PrinterClient::new(transport);
//!
//! if printer.connect()? {
//!     let model = PrinterModel::find("d110").unwrap();
//!     let label = image::open("label.png")?.to_luma8();
//!     printer.print_image(&label, model, 3)?;
//! }
//! printer.disconnect()?;
//! ```
//!
//! Label detection in one call:
//!
//! ```ignore
//! let config = niimbot_link::PrinterConfig::from_json_file("printer.json")?;
//! let result = niimbot_link::detect_label(Some(&config));
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

mod client;
mod config;
mod detect;
mod error;
mod models;
mod packet;
mod profiles;
pub mod raster;
mod transport;
mod types;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "ble")]
pub mod ble;

// Re-exports
pub use client::PrinterClient;
pub use config::{BluetoothMode, ConnectionType, PrinterConfig};
pub use detect::{detect_label, detect_label_with, resolve_target, DetectionResult};
pub use error::{ConfigError, DetectionError, PrinterError, TransportError};
pub use models::{Dpi, PrintDirection, PrinterModel, RasterProtocol, MODELS};
pub use packet::Packet;
pub use profiles::{
    detect_profile, get_profile_by_model, get_profiles_by_model, LabelProfile, PROFILES,
    TOLERANCE_MM,
};
pub use transport::{Link, PrinterTransport, TransportTarget};
pub use types::{HeartbeatStatus, InfoKey, InfoValue, PrintStatus, RfidReading};

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(feature = "ble")]
pub use ble::{BleOptions, BleTransport, GattLink};
