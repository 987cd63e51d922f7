use crate::error::TransportError;

/// Trait for printer communication backends.
/// Implement this trait for different links (serial port, Bluetooth LE, etc.)
pub trait PrinterTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Write data to the transport
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read up to `max_len` bytes, blocking for at most the transport's own timeout.
    ///
    /// An empty result means nothing arrived in time, not that the link is closed.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Self::Error>;

    /// Close the link. Calling it more than once is a no-op.
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}

/// Concrete link selected once from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// Serial device path, or `None` to auto-detect the single available port
    Serial(Option<String>),
    /// BLE device address or advertised name
    Ble(String),
}

/// The closed set of transports, behind [`PrinterTransport`]
pub enum Link {
    #[cfg(feature = "serial")]
    Serial(crate::serial::SerialTransport),
    #[cfg(feature = "ble")]
    Ble(crate::ble::BleTransport),
}

impl Link {
    /// Open the transport described by `target`
    pub fn open(target: &TransportTarget) -> Result<Self, TransportError> {
        match target {
            #[cfg(feature = "serial")]
            TransportTarget::Serial(port) => {
                crate::serial::SerialTransport::open(port.as_deref()).map(Link::Serial)
            }
            #[cfg(feature = "ble")]
            TransportTarget::Ble(address) => {
                crate::ble::BleTransport::connect(address, crate::ble::BleOptions::default())
                    .map(Link::Ble)
            }
            #[allow(unreachable_patterns)]
            other => Err(TransportError::Serial(format!(
                "{:?} support is not compiled in",
                other
            ))),
        }
    }
}

impl PrinterTransport for Link {
    type Error = TransportError;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            #[cfg(feature = "serial")]
            Link::Serial(t) => t.write(data),
            #[cfg(feature = "ble")]
            Link::Ble(t) => t.write(data),
            #[cfg(not(any(feature = "serial", feature = "ble")))]
            _ => match *self {},
        }
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Self::Error> {
        match self {
            #[cfg(feature = "serial")]
            Link::Serial(t) => t.read(max_len),
            #[cfg(feature = "ble")]
            Link::Ble(t) => t.read(max_len),
            #[cfg(not(any(feature = "serial", feature = "ble")))]
            _ => match *self {},
        }
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        match self {
            #[cfg(feature = "serial")]
            Link::Serial(t) => t.disconnect(),
            #[cfg(feature = "ble")]
            Link::Ble(t) => t.disconnect(),
            #[cfg(not(any(feature = "serial", feature = "ble")))]
            _ => match *self {},
        }
    }
}
