//! Bluetooth LE transport
//!
//! All GATT work happens on a dedicated worker thread that owns a single-threaded tokio
//! runtime for as long as the connection lives. The calling thread only sees a blocking
//! `read`/`write`/`disconnect` facade:
//!
//! - connect blocks on a ready signal from the worker (30s by default)
//! - notifications are appended to a mutex-guarded byte buffer that `read` polls
//! - each write is sent to the worker over a bounded channel and waited on with a timeout
//! - disconnect waits a bounded time for the worker to finish, then gives up on it

use crate::error::TransportError;
use crate::transport::PrinterTransport;
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Characteristic carrying both the write and notify sides of the printer protocol
pub const PRINTER_CHARACTERISTIC: Uuid = Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f);

const COMMAND_QUEUE: usize = 32;
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bytes received from notifications, shared between the worker and the caller
pub type InboundBuffer = Arc<Mutex<VecDeque<u8>>>;

/// Timing of the BLE facade
#[derive(Debug, Clone)]
pub struct BleOptions {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Number of times `read` checks the inbound buffer before giving up
    pub read_polls: u32,
    pub read_interval: Duration,
    pub disconnect_timeout: Duration,
    /// How long to scan for the device before failing the connection
    pub scan_timeout: Duration,
}

impl Default for BleOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            read_polls: 50,
            read_interval: Duration::from_millis(100),
            disconnect_timeout: Duration::from_secs(2),
            scan_timeout: Duration::from_secs(5),
        }
    }
}

/// GATT operations the worker drives. Implemented over btleplug for real devices.
#[async_trait]
pub trait GattLink: Send + 'static {
    /// Connect, subscribe to notifications and start appending them to `inbound`
    async fn connect(&mut self, inbound: InboundBuffer) -> Result<(), TransportError>;

    /// Write without waiting for a GATT response
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Stop notifications and drop the connection
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

enum Command {
    Write(Vec<u8>, std_mpsc::SyncSender<Result<(), TransportError>>),
    Disconnect,
}

pub struct BleTransport {
    commands: Option<mpsc::Sender<Command>>,
    inbound: InboundBuffer,
    worker: Option<JoinHandle<()>>,
    finished: Option<std_mpsc::Receiver<()>>,
    options: BleOptions,
}

impl BleTransport {
    /// Scan for `address` (MAC address or advertised name) and connect to it
    pub fn connect(address: &str, options: BleOptions) -> Result<Self, TransportError> {
        let link = BtleplugLink::new(address, options.scan_timeout);
        Self::with_link(link, options)
    }

    /// Start the worker thread over any [`GattLink`] and wait for it to connect
    pub fn with_link<L: GattLink>(link: L, options: BleOptions) -> Result<Self, TransportError> {
        let inbound = InboundBuffer::default();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (finished_tx, finished_rx) = std_mpsc::sync_channel(1);

        let worker_inbound = Arc::clone(&inbound);
        let worker_options = options.clone();
        let worker = thread::Builder::new()
            .name("ble-worker".into())
            .spawn(move || {
                run_worker(link, worker_inbound, command_rx, ready_tx, worker_options);
                let _ = finished_tx.send(());
            })?;

        match ready_rx.recv_timeout(options.connect_timeout) {
            Ok(Ok(())) => {
                info!("BLE transport connected");
                Ok(Self {
                    commands: Some(command_tx),
                    inbound,
                    worker: Some(worker),
                    finished: Some(finished_rx),
                    options,
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(format!(
                "BLE connection not ready after {:?}",
                options.connect_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Ble(
                "BLE worker exited before connecting".into(),
            )),
        }
    }
}

fn run_worker<L: GattLink>(
    mut link: L,
    inbound: InboundBuffer,
    mut commands: mpsc::Receiver<Command>,
    ready: std_mpsc::SyncSender<Result<(), TransportError>>,
    options: BleOptions,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    runtime.block_on(async move {
        let connected = tokio::time::timeout(options.connect_timeout, link.connect(inbound))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout("BLE connection".into())));
        let failed = connected.is_err();
        let _ = ready.send(connected);
        if failed {
            return;
        }

        while let Some(command) = commands.recv().await {
            match command {
                Command::Write(data, reply) => {
                    let result = tokio::time::timeout(options.write_timeout, link.write(&data))
                        .await
                        .unwrap_or_else(|_| Err(TransportError::Timeout("BLE write".into())));
                    let _ = reply.send(result);
                }
                Command::Disconnect => break,
            }
        }

        match tokio::time::timeout(options.disconnect_timeout, link.disconnect()).await {
            Ok(Ok(())) => debug!("BLE link disconnected"),
            Ok(Err(e)) => warn!("BLE disconnect failed: {}", e),
            Err(_) => warn!(
                "BLE disconnect did not complete within {:?}",
                options.disconnect_timeout
            ),
        }
    });
}

impl PrinterTransport for BleTransport {
    type Error = TransportError;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let commands = self.commands.as_ref().ok_or(TransportError::Closed)?;
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        commands
            .blocking_send(Command::Write(data.to_vec(), reply_tx))
            .map_err(|_| TransportError::Closed)?;

        match reply_rx.recv_timeout(self.options.write_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(format!(
                "BLE write not acknowledged after {:?}",
                self.options.write_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Self::Error> {
        for attempt in 0..self.options.read_polls {
            {
                let mut buffer = self
                    .inbound
                    .lock()
                    .map_err(|_| TransportError::Ble("inbound buffer poisoned".into()))?;
                if !buffer.is_empty() {
                    let n = max_len.min(buffer.len());
                    return Ok(buffer.drain(..n).collect());
                }
            }
            if attempt + 1 < self.options.read_polls {
                thread::sleep(self.options.read_interval);
            }
        }
        Ok(Vec::new())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        info!("Disconnecting BLE transport");

        // A full queue still ends the worker loop once the sender is dropped
        let _ = commands.try_send(Command::Disconnect);
        drop(commands);

        let started = Instant::now();
        if let Some(finished) = self.finished.take() {
            match finished.recv_timeout(self.options.disconnect_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if let Some(worker) = self.worker.take() {
                        let _ = worker.join();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "BLE worker still running after {:?}, detaching it",
                        started.elapsed()
                    );
                    self.worker.take();
                }
            }
        }
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn ble_error(e: btleplug::Error) -> TransportError {
    TransportError::Ble(e.to_string())
}

/// [`GattLink`] over the platform Bluetooth stack
struct BtleplugLink {
    address: String,
    scan_timeout: Duration,
    peripheral: Option<Peripheral>,
    characteristic: Option<Characteristic>,
    pump: Option<tokio::task::JoinHandle<()>>,
}

impl BtleplugLink {
    fn new(address: &str, scan_timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            scan_timeout,
            peripheral: None,
            characteristic: None,
            pump: None,
        }
    }

    async fn find_peripheral(&self, central: &Adapter) -> Result<Peripheral, TransportError> {
        let deadline = Instant::now() + self.scan_timeout;
        loop {
            for peripheral in central.peripherals().await.map_err(ble_error)? {
                if peripheral.address().to_string().eq_ignore_ascii_case(&self.address) {
                    return Ok(peripheral);
                }
                let name = peripheral
                    .properties()
                    .await
                    .map_err(ble_error)?
                    .and_then(|props| props.local_name);
                if name.is_some_and(|n| n.eq_ignore_ascii_case(&self.address)) {
                    return Ok(peripheral);
                }
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Ble(format!(
                    "Device {} not found within {:?}",
                    self.address, self.scan_timeout
                )));
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn connect(&mut self, inbound: InboundBuffer) -> Result<(), TransportError> {
        let manager = Manager::new().await.map_err(ble_error)?;
        let central = manager
            .adapters()
            .await
            .map_err(ble_error)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Ble("No Bluetooth adapter found".into()))?;

        info!("Scanning for {}", self.address);
        central.start_scan(ScanFilter::default()).await.map_err(ble_error)?;
        let found = self.find_peripheral(&central).await;
        let _ = central.stop_scan().await;
        let peripheral = found?;

        peripheral.connect().await.map_err(ble_error)?;
        peripheral.discover_services().await.map_err(ble_error)?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == PRINTER_CHARACTERISTIC)
            .ok_or_else(|| {
                TransportError::Ble(format!("Characteristic {} not found", PRINTER_CHARACTERISTIC))
            })?;

        let mut notifications = peripheral.notifications().await.map_err(ble_error)?;
        peripheral.subscribe(&characteristic).await.map_err(ble_error)?;
        self.pump = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != PRINTER_CHARACTERISTIC {
                    continue;
                }
                if let Ok(mut buffer) = inbound.lock() {
                    buffer.extend(notification.value);
                }
            }
        }));

        self.peripheral = Some(peripheral);
        self.characteristic = Some(characteristic);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let (Some(peripheral), Some(characteristic)) = (&self.peripheral, &self.characteristic)
        else {
            return Err(TransportError::Closed);
        };
        peripheral
            .write(characteristic, data, WriteType::WithoutResponse)
            .await
            .map_err(ble_error)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };
        if let Some(characteristic) = self.characteristic.take() {
            if let Err(e) = peripheral.unsubscribe(&characteristic).await {
                debug!("Unsubscribe failed: {}", e);
            }
        }
        peripheral.disconnect().await.map_err(ble_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> BleOptions {
        BleOptions {
            connect_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
            read_polls: 3,
            read_interval: Duration::from_millis(10),
            disconnect_timeout: Duration::from_millis(300),
            scan_timeout: Duration::from_millis(100),
        }
    }

    /// Echoes every write back as a notification
    #[derive(Default)]
    struct EchoLink {
        inbound: Option<InboundBuffer>,
    }

    #[async_trait]
    impl GattLink for EchoLink {
        async fn connect(&mut self, inbound: InboundBuffer) -> Result<(), TransportError> {
            self.inbound = Some(inbound);
            Ok(())
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if let Some(inbound) = &self.inbound {
                inbound.lock().unwrap().extend(data.iter().copied());
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Device that never acknowledges a disconnect
    struct StuckLink;

    #[async_trait]
    impl GattLink for StuckLink {
        async fn connect(&mut self, _inbound: InboundBuffer) -> Result<(), TransportError> {
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Connects fine but never completes a write
    struct HangingWriteLink;

    #[async_trait]
    impl GattLink for HangingWriteLink {
        async fn connect(&mut self, _inbound: InboundBuffer) -> Result<(), TransportError> {
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct RefusingLink;

    #[async_trait]
    impl GattLink for RefusingLink {
        async fn connect(&mut self, _inbound: InboundBuffer) -> Result<(), TransportError> {
            Err(TransportError::Ble("adapter powered off".into()))
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct SilentLink;

    #[async_trait]
    impl GattLink for SilentLink {
        async fn connect(&mut self, _inbound: InboundBuffer) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_write_then_read_echo() {
        let mut transport = BleTransport::with_link(EchoLink::default(), fast_options()).unwrap();
        transport.write(&[0x55, 0x55, 0xDC]).unwrap();
        assert_eq!(transport.read(16).unwrap(), vec![0x55, 0x55, 0xDC]);
        transport.disconnect().unwrap();
    }

    #[test]
    fn test_read_respects_max_len() {
        let mut transport = BleTransport::with_link(EchoLink::default(), fast_options()).unwrap();
        transport.write(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(transport.read(2).unwrap(), vec![1, 2]);
        assert_eq!(transport.read(10).unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_read_empty_after_polling_window() {
        let mut transport = BleTransport::with_link(EchoLink::default(), fast_options()).unwrap();
        let started = Instant::now();
        assert!(transport.read(16).unwrap().is_empty());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_connect_error_propagates() {
        match BleTransport::with_link(RefusingLink, fast_options()) {
            Err(TransportError::Ble(msg)) => assert_eq!(msg, "adapter powered off"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("connection should have failed"),
        }
    }

    #[test]
    fn test_connect_timeout() {
        let result = BleTransport::with_link(SilentLink, fast_options());
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[test]
    fn test_disconnect_is_bounded_when_device_hangs() {
        let mut transport = BleTransport::with_link(StuckLink, fast_options()).unwrap();
        let started = Instant::now();
        transport.disconnect().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_write_timeout() {
        let options = fast_options();
        let mut transport = BleTransport::with_link(HangingWriteLink, options.clone()).unwrap();

        let started = Instant::now();
        let result = transport.write(&[0x55, 0x55, 0xC1]);
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(TransportError::Timeout(_))), "{:?}", result);
        assert!(elapsed >= options.write_timeout / 2, "{:?}", elapsed);
        assert!(elapsed < options.write_timeout * 3, "{:?}", elapsed);

        let started = Instant::now();
        transport.disconnect().unwrap();
        assert!(started.elapsed() < options.disconnect_timeout * 3);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut transport = BleTransport::with_link(EchoLink::default(), fast_options()).unwrap();
        transport.disconnect().unwrap();
        transport.disconnect().unwrap();
        assert!(matches!(transport.write(&[0x00]), Err(TransportError::Closed)));
    }
}
