//! One-call label detection: connect, read the RFID tag, match it to a profile, clean up.

use log::{info, warn};
use serde::Serialize;
use std::fmt::Display;

use crate::client::PrinterClient;
use crate::config::{BluetoothMode, ConnectionType, PrinterConfig};
use crate::error::DetectionError;
use crate::profiles::{detect_profile, LabelProfile, TOLERANCE_MM};
use crate::transport::{Link, PrinterTransport, TransportTarget};
use crate::types::RfidReading;

/// Outcome of a detection run, shaped for the host application
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_profile: Option<LabelProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfid_data: Option<RfidReading>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    fn detected(profile: LabelProfile, reading: RfidReading) -> Self {
        Self {
            success: true,
            confidence: profile.confidence,
            detected_profile: Some(profile),
            rfid_data: Some(reading),
            error: None,
        }
    }

    fn failed(error: DetectionError, reading: Option<RfidReading>) -> Self {
        Self {
            success: false,
            detected_profile: None,
            rfid_data: reading,
            confidence: 0.0,
            error: Some(error.to_string()),
        }
    }
}

/// Pick the transport for a configuration
pub fn resolve_target(config: &PrinterConfig) -> Result<TransportTarget, DetectionError> {
    match config.connection_type {
        ConnectionType::Usb => Ok(TransportTarget::Serial(config.address.clone())),
        ConnectionType::Bluetooth => {
            let address = config
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| DetectionError::MissingAddress(config.connection_type.to_string()))?
                .to_string();
            Ok(match config.bluetooth_mode {
                BluetoothMode::Ble => TransportTarget::Ble(address),
                BluetoothMode::Serial => TransportTarget::Serial(Some(address)),
            })
        }
        ConnectionType::Server => Err(DetectionError::UnsupportedConnection(
            config.connection_type.to_string(),
        )),
    }
}

/// Detect the loaded label over the configured link
pub fn detect_label(config: Option<&PrinterConfig>) -> DetectionResult {
    detect_label_with(config, Link::open)
}

/// Detect the loaded label, opening the transport with `open`.
///
/// Both the client and the transport are disconnected before returning, whatever happened.
pub fn detect_label_with<T, E, F>(config: Option<&PrinterConfig>, open: F) -> DetectionResult
where
    T: PrinterTransport,
    E: Display,
    F: FnOnce(&TransportTarget) -> Result<T, E>,
{
    let config = match validate(config) {
        Ok(config) => config,
        Err(e) => return DetectionResult::failed(e, None),
    };
    let target = match resolve_target(config) {
        Ok(target) => target,
        Err(e) => return DetectionResult::failed(e, None),
    };

    info!("Detecting label via {:?}", target);
    let transport = match open(&target) {
        Ok(transport) => transport,
        Err(e) => return DetectionResult::failed(DetectionError::Connection(e.to_string()), None),
    };

    let mut client = PrinterClient::new(transport);
    let outcome = read_label(&mut client);

    if let Err(e) = client.disconnect() {
        warn!("Printer disconnect failed: {}", e);
    }
    let mut transport = client.into_transport();
    if let Err(e) = transport.disconnect() {
        warn!("Transport disconnect failed: {}", e);
    }

    match outcome {
        Ok((profile, reading)) => {
            info!(
                "Detected {} (confidence {:.3})",
                profile.name, profile.confidence
            );
            if !matches_configured_size(config, &profile) {
                warn!(
                    "Loaded roll {}x{}mm differs from configured label size {:?}x{:?}mm",
                    profile.width_mm,
                    profile.height_mm,
                    config.label_width_mm,
                    config.label_height_mm
                );
            }
            DetectionResult::detected(profile, reading)
        }
        Err((error, reading)) => {
            warn!("Label detection failed: {}", error);
            DetectionResult::failed(error, reading)
        }
    }
}

fn validate(config: Option<&PrinterConfig>) -> Result<&PrinterConfig, DetectionError> {
    let config = config.ok_or(DetectionError::NotConfigured)?;
    if !config.enabled {
        return Err(DetectionError::NotEnabled);
    }
    Ok(config)
}

/// Whether `profile` agrees with the label size the host configured, where it configured one
fn matches_configured_size(config: &PrinterConfig, profile: &LabelProfile) -> bool {
    let within = |configured: Option<u16>, actual: u16| {
        configured.is_none_or(|mm| (f64::from(mm) - f64::from(actual)).abs() <= TOLERANCE_MM)
    };
    within(config.label_width_mm, profile.width_mm)
        && within(config.label_height_mm, profile.height_mm)
}

type LabelOutcome = Result<(LabelProfile, RfidReading), (DetectionError, Option<RfidReading>)>;

fn read_label<T: PrinterTransport>(client: &mut PrinterClient<T>) -> LabelOutcome {
    match client.connect() {
        Ok(true) => {}
        Ok(false) => return Err((DetectionError::Handshake, None)),
        Err(e) => return Err((DetectionError::Connection(e.to_string()), None)),
    }

    let reading = match client.get_rfid() {
        Ok(Some(reading)) => reading,
        Ok(None) => return Err((DetectionError::NoTag, None)),
        Err(e) => return Err((DetectionError::Protocol(e.to_string()), None)),
    };

    match detect_profile(Some(&reading)) {
        Some(profile) => Ok((profile, reading)),
        None => Err((
            DetectionError::UnknownLabelSize {
                width_mm: format_mm(reading.width_mm),
                height_mm: format_mm(reading.height_mm),
            },
            Some(reading),
        )),
    }
}

fn format_mm(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |mm| format!("{}", mm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::get_profile_by_model;

    fn config(connection_type: ConnectionType, address: Option<&str>) -> PrinterConfig {
        PrinterConfig {
            model: "b1".into(),
            connection_type,
            address: address.map(String::from),
            bluetooth_mode: BluetoothMode::Ble,
            density: 3,
            label_width_mm: None,
            label_height_mm: None,
            enabled: true,
        }
    }

    #[test]
    fn test_resolve_usb_auto_detect() {
        let target = resolve_target(&config(ConnectionType::Usb, None)).unwrap();
        assert_eq!(target, TransportTarget::Serial(None));
    }

    #[test]
    fn test_resolve_bluetooth_modes() {
        let mut cfg = config(ConnectionType::Bluetooth, Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(
            resolve_target(&cfg).unwrap(),
            TransportTarget::Ble("AA:BB:CC:DD:EE:FF".into())
        );
        cfg.bluetooth_mode = BluetoothMode::Serial;
        cfg.address = Some("/dev/rfcomm0".into());
        assert_eq!(
            resolve_target(&cfg).unwrap(),
            TransportTarget::Serial(Some("/dev/rfcomm0".into()))
        );
    }

    #[test]
    fn test_resolve_bluetooth_without_address() {
        let result = resolve_target(&config(ConnectionType::Bluetooth, Some("  ")));
        assert!(matches!(result, Err(DetectionError::MissingAddress(_))));
    }

    #[test]
    fn test_resolve_server_unsupported() {
        let result = resolve_target(&config(ConnectionType::Server, None));
        assert!(matches!(result, Err(DetectionError::UnsupportedConnection(_))));
    }

    #[test]
    fn test_configured_size_check() {
        let profile = get_profile_by_model("b1").unwrap();
        assert_eq!((profile.width_mm, profile.height_mm), (50, 30));
        let mut cfg = config(ConnectionType::Usb, None);
        assert!(matches_configured_size(&cfg, &profile));

        cfg.label_width_mm = Some(51);
        cfg.label_height_mm = Some(30);
        assert!(matches_configured_size(&cfg, &profile));

        cfg.label_width_mm = Some(40);
        assert!(!matches_configured_size(&cfg, &profile));

        cfg.label_width_mm = None;
        cfg.label_height_mm = Some(50);
        assert!(!matches_configured_size(&cfg, &profile));
    }

    #[test]
    fn test_unknown_size_message() {
        let error = DetectionError::UnknownLabelSize {
            width_mm: format_mm(Some(99.0)),
            height_mm: format_mm(None),
        };
        assert_eq!(error.to_string(), "Unknown label size: 99x?mm reported by printer");
    }
}
