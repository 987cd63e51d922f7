use niimbot_link::{
    detect_label_with, BluetoothMode, ConnectionType, Packet, PrinterConfig, PrinterTransport,
    TransportTarget,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Printer that answers the handshake and serves a fixed RFID block
struct FakePrinter {
    rfid_payload: Vec<u8>,
    answer_handshake: bool,
    pending: VecDeque<u8>,
    disconnects: Rc<Cell<u32>>,
}

impl FakePrinter {
    fn new(rfid_payload: Vec<u8>, disconnects: Rc<Cell<u32>>) -> Self {
        Self {
            rfid_payload,
            answer_handshake: true,
            pending: VecDeque::new(),
            disconnects,
        }
    }
}

impl PrinterTransport for FakePrinter {
    type Error = io::Error;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let request = Packet::decode(data).map_err(|e| io::Error::other(e.to_string()))?;
        let reply = match request.packet_type {
            0xC1 if self.answer_handshake => Some(Packet::new(0xC2, [0x01])),
            0x1A => Some(Packet::new(0x1B, self.rfid_payload.clone())),
            _ => None,
        };
        if let Some(reply) = reply {
            let frame = reply.encode().map_err(|e| io::Error::other(e.to_string()))?;
            self.pending.extend(frame);
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Self::Error> {
        let n = max_len.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnects.set(self.disconnects.get() + 1);
        Ok(())
    }
}

fn tag_block(width_mm: u8, height_mm: u8) -> Vec<u8> {
    let mut data = vec![0x88, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
    data.push(0);
    data.push(0);
    data.extend([0x00, 0xB4, 0x00, 0x00, 0x01]);
    data.extend([width_mm, height_mm]);
    data
}

fn usb_config() -> PrinterConfig {
    PrinterConfig::from_json_str(
        r#"{"model": "b1", "connection_type": "usb", "address": "/dev/ttyACM0"}"#,
    )
    .unwrap()
}

#[test]
fn detects_b1_label_and_disconnects_twice() {
    let disconnects = Rc::new(Cell::new(0));
    let config = usb_config();
    let counter = Rc::clone(&disconnects);

    let result = detect_label_with(Some(&config), |target| {
        assert_eq!(target, &TransportTarget::Serial(Some("/dev/ttyACM0".into())));
        Ok::<_, io::Error>(FakePrinter::new(tag_block(50, 30), counter))
    });

    assert!(result.success);
    assert_eq!(result.error, None);
    assert_eq!(result.confidence, 1.0);
    let profile = result.detected_profile.unwrap();
    assert_eq!(profile.name, "B1 50mm");
    assert_eq!(disconnects.get(), 2);
}

#[test]
fn result_serializes_to_outward_shape() {
    let config = usb_config();
    let result = detect_label_with(Some(&config), |_| {
        Ok::<_, io::Error>(FakePrinter::new(tag_block(51, 30), Rc::default()))
    });

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["success"], json!(true));
    assert_eq!(
        value["detected_profile"],
        json!({
            "name": "B1 50mm",
            "model": "b1",
            "width_mm": 50,
            "height_mm": 30,
            "width_px": 400,
            "height_px": 240,
            "dpi": 203,
            "print_direction": "horizontal"
        })
    );
    assert_eq!(value["rfid_data"]["width_mm"], json!(51.0));
    assert!(value.get("error").is_none());
}

#[test]
fn unknown_size_reports_dimensions() {
    let config = usb_config();
    let result = detect_label_with(Some(&config), |_| {
        Ok::<_, io::Error>(FakePrinter::new(tag_block(99, 99), Rc::default()))
    });

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Unknown label size: 99x99mm reported by printer")
    );
    assert!(result.rfid_data.is_some());
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn missing_tag_is_reported() {
    let disconnects = Rc::new(Cell::new(0));
    let config = usb_config();
    let counter = Rc::clone(&disconnects);
    let result = detect_label_with(Some(&config), |_| {
        Ok::<_, io::Error>(FakePrinter::new(vec![0x00], counter))
    });

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("No RFID tag detected, is a label roll loaded?")
    );
    assert_eq!(disconnects.get(), 2);
}

#[test]
fn silent_handshake_still_cleans_up() {
    let disconnects = Rc::new(Cell::new(0));
    let config = usb_config();
    let counter = Rc::clone(&disconnects);
    let result = detect_label_with(Some(&config), |_| {
        let mut printer = FakePrinter::new(tag_block(50, 30), counter);
        printer.answer_handshake = false;
        Ok::<_, io::Error>(printer)
    });

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Printer did not answer the connection handshake")
    );
    assert_eq!(disconnects.get(), 2);
}

#[test]
fn open_failure_is_a_connection_error() {
    let config = usb_config();
    let result = detect_label_with(Some(&config), |_| {
        Err::<FakePrinter, _>(io::Error::new(io::ErrorKind::NotFound, "no such device"))
    });

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Could not connect to printer: no such device")
    );
}

#[test]
fn configuration_is_validated_before_connecting() {
    let never_open = |_: &TransportTarget| -> Result<FakePrinter, io::Error> {
        panic!("transport must not be opened")
    };

    let result = detect_label_with(None, never_open);
    assert_eq!(result.error.as_deref(), Some("Printer is not configured"));

    let mut disabled = usb_config();
    disabled.enabled = false;
    let result = detect_label_with(Some(&disabled), never_open);
    assert_eq!(result.error.as_deref(), Some("Printer is not enabled"));

    let mut server = usb_config();
    server.connection_type = ConnectionType::Server;
    let result = detect_label_with(Some(&server), never_open);
    assert_eq!(
        result.error.as_deref(),
        Some("Connection type 'server' does not support RFID detection")
    );

    let mut bluetooth = usb_config();
    bluetooth.connection_type = ConnectionType::Bluetooth;
    bluetooth.bluetooth_mode = BluetoothMode::Ble;
    bluetooth.address = None;
    let result = detect_label_with(Some(&bluetooth), never_open);
    assert_eq!(
        result.error.as_deref(),
        Some("No printer address configured for bluetooth connection")
    );
}
