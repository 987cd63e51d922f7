//! Serial port transport for USB and Bluetooth SPP links using the serialport crate

use crate::error::TransportError;
use crate::transport::PrinterTransport;
use log::{debug, info};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

pub const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Open `port_name`, or the only serial port on the system when `None`
    pub fn open(port_name: Option<&str>) -> Result<Self, TransportError> {
        let port_name = match port_name {
            Some(name) => name.to_string(),
            None => select_port(list_ports()?)?,
        };

        info!("Opening serial port {} at {} baud", port_name, BAUD_RATE);
        let mut port = serialport::new(&port_name, BAUD_RATE)
            .flow_control(serialport::FlowControl::Hardware)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Serial(format!("Failed to open {}: {}", port_name, e)))?;
        port.write_data_terminal_ready(true)
            .map_err(|e| TransportError::Serial(e.to_string()))?;
        port.write_request_to_send(true)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        Ok(Self { port: Some(port) })
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

/// Names of the serial ports present on this machine
pub fn list_ports() -> Result<Vec<String>, TransportError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| TransportError::Serial(e.to_string()))
}

/// Pick the port to auto-connect to: exactly one candidate, or an error
pub fn select_port(mut ports: Vec<String>) -> Result<String, TransportError> {
    match ports.len() {
        0 => Err(TransportError::NoPortsFound),
        1 => Ok(ports.remove(0)),
        _ => Err(TransportError::AmbiguousPorts(ports)),
    }
}

impl PrinterTransport for SerialTransport {
    type Error = TransportError;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Self::Error> {
        let port = self.port()?;
        let mut buf = vec![0u8; max_len];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        if self.port.take().is_some() {
            debug!("Serial port closed");
        }
        Ok(())
    }
}
