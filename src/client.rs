use image::GrayImage;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::PrinterError;
use crate::models::{PrinterModel, RasterProtocol};
use crate::packet::{Packet, FRAME_OVERHEAD};
use crate::raster;
use crate::transport::PrinterTransport;
use crate::types::{bytes_to_hex, HeartbeatStatus, InfoKey, InfoValue, PrintStatus, RfidReading};

pub struct PrinterClient<T: PrinterTransport> {
    transport: T,
    buffer: Vec<u8>,
    packets: VecDeque<Packet>,
}

impl<T: PrinterTransport> PrinterClient<T> {
    // Request codes
    const GET_INFO: u8 = 0x40;
    const GET_RFID: u8 = 0x1A;
    const HEARTBEAT: u8 = 0xDC;
    const SET_LABEL_TYPE: u8 = 0x23;
    const SET_LABEL_DENSITY: u8 = 0x21;
    const START_PRINT: u8 = 0x01;
    const END_PRINT: u8 = 0xF3;
    const START_PAGE_PRINT: u8 = 0x03;
    const END_PAGE_PRINT: u8 = 0xE3;
    const ALLOW_PRINT_CLEAR: u8 = 0x20;
    const SET_DIMENSION: u8 = 0x13;
    const SET_QUANTITY: u8 = 0x15;
    const GET_PRINT_STATUS: u8 = 0xA3;
    const CONNECT: u8 = 0xC1;
    const RASTER_ROW: u8 = 0x85;

    /// Response type any command may be answered with
    const GENERIC_ACK: u8 = 0x00;

    // Transceive policy
    const READ_CHUNK: usize = 1024;
    const RECV_ATTEMPTS: u32 = 6;
    const RECV_INTERVAL: Duration = Duration::from_millis(100);

    // Settle delays
    const END_PAGE_SETTLE: Duration = Duration::from_millis(300);
    const V5_SETUP_SETTLE: Duration = Duration::from_millis(200);
    const V5_ROW_PACING: Duration = Duration::from_millis(10);

    /// Create a new client over an open transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            packets: VecDeque::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give the transport back, dropping any buffered input
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Connection handshake; must succeed before printing
    pub fn connect(&mut self) -> Result<bool, PrinterError> {
        let response = self.transceive(Self::CONNECT, &[0x01], 1)?;
        if response.is_some() {
            info!("Printer handshake complete");
        }
        Ok(response.is_some())
    }

    /// Query one device property
    pub fn get_info(&mut self, key: InfoKey) -> Result<Option<InfoValue>, PrinterError> {
        let code = key as u8;
        let Some(packet) = self.transceive(Self::GET_INFO, &[code], code)? else {
            return Ok(None);
        };

        let value = match key {
            InfoKey::DeviceSerial => InfoValue::Serial(bytes_to_hex(&packet.data)),
            InfoKey::SoftVersion | InfoKey::HardVersion => {
                InfoValue::Version(be_uint(&packet.data) as f64 / 100.0)
            }
            _ => InfoValue::Number(be_uint(&packet.data)),
        };
        Ok(Some(value))
    }

    pub fn heartbeat(&mut self) -> Result<Option<HeartbeatStatus>, PrinterError> {
        Ok(self
            .transceive(Self::HEARTBEAT, &[0x01], 16)?
            .map(|packet| HeartbeatStatus::from_payload(&packet.data)))
    }

    /// Read the label roll's RFID tag. `None` when no tag is present or the printer is silent.
    pub fn get_rfid(&mut self) -> Result<Option<RfidReading>, PrinterError> {
        match self.transceive(Self::GET_RFID, &[0x01], 1)? {
            Some(packet) => Self::parse_rfid(&packet.data),
            None => Ok(None),
        }
    }

    /// Set label type (1-3)
    pub fn set_label_type(&mut self, label_type: u8) -> Result<bool, PrinterError> {
        if !(1..=3).contains(&label_type) {
            return Err(PrinterError::InvalidParameter(format!(
                "Label type must be 1-3, got {}",
                label_type
            )));
        }
        self.transceive_flag(Self::SET_LABEL_TYPE, &[label_type], 16)
    }

    /// Set print density (1-5)
    pub fn set_label_density(&mut self, density: u8) -> Result<bool, PrinterError> {
        if !(1..=5).contains(&density) {
            return Err(PrinterError::InvalidParameter(format!(
                "Density must be 1-5, got {}",
                density
            )));
        }
        self.transceive_flag(Self::SET_LABEL_DENSITY, &[density], 16)
    }

    pub fn start_print(&mut self) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::START_PRINT, &[0x01], 1)
    }

    pub fn end_print(&mut self) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::END_PRINT, &[0x01], 1)
    }

    pub fn start_page_print(&mut self) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::START_PAGE_PRINT, &[0x01], 1)
    }

    pub fn end_page_print(&mut self) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::END_PAGE_PRINT, &[0x01], 1)
    }

    pub fn allow_print_clear(&mut self) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::ALLOW_PRINT_CLEAR, &[0x01], 16)
    }

    /// Set page size in pixels
    pub fn set_dimension(&mut self, width: u16, height: u16) -> Result<bool, PrinterError> {
        let [w_hi, w_lo] = width.to_be_bytes();
        let [h_hi, h_lo] = height.to_be_bytes();
        self.transceive_flag(Self::SET_DIMENSION, &[w_hi, w_lo, h_hi, h_lo], 1)
    }

    pub fn set_quantity(&mut self, quantity: u16) -> Result<bool, PrinterError> {
        self.transceive_flag(Self::SET_QUANTITY, &quantity.to_be_bytes(), 1)
    }

    pub fn get_print_status(&mut self) -> Result<Option<PrintStatus>, PrinterError> {
        let Some(packet) = self.transceive(Self::GET_PRINT_STATUS, &[0x01], 16)? else {
            return Ok(None);
        };
        match packet.data.as_slice() {
            [page_hi, page_lo, progress1, progress2, ..] => Ok(Some(PrintStatus {
                page: u16::from_be_bytes([*page_hi, *page_lo]),
                progress1: *progress1,
                progress2: *progress2,
            })),
            other => Err(PrinterError::InvalidResponse(format!(
                "Print status too short: {:02X?}",
                other
            ))),
        }
    }

    /// Print one label.
    ///
    /// Runs density, start print, start page, raster rows, end page, end print in that order.
    /// Bracketing commands wait for acknowledgement; rows are fire-and-forget. Returns
    /// `false` if any bracketing command went unacknowledged.
    pub fn print_image(
        &mut self,
        image: &GrayImage,
        model: &PrinterModel,
        density: u8,
    ) -> Result<bool, PrinterError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PrinterError::Image("Image is empty".into()));
        }
        if image.width() > u32::from(model.printhead_px) {
            return Err(PrinterError::Image(format!(
                "Image width {}px exceeds {} printhead width {}px",
                image.width(),
                model.id,
                model.printhead_px
            )));
        }
        let rows = u16::try_from(image.height())
            .map_err(|_| PrinterError::Image(format!("Image too tall: {}px", image.height())))?;
        let cols = image.width() as u16;

        let clamped = model.clamp_density(density);
        if clamped != density {
            warn!(
                "Density {} not supported by {}, using {}",
                density, model.id, clamped
            );
        }

        let mut acked = Vec::with_capacity(5);
        acked.push(self.set_label_density(clamped)?);
        acked.push(self.start_print()?);
        acked.push(self.start_page_print()?);

        match model.raster {
            RasterProtocol::Legacy => {
                for (y, pixels) in raster::image_rows(image).enumerate() {
                    self.send(Packet::new(Self::RASTER_ROW, raster::legacy_row(y as u16, pixels)))?;
                }
            }
            RasterProtocol::V5 => {
                self.send(Packet::new(Self::START_PRINT, raster::v5_start_print(1)))?;
                std::thread::sleep(Self::V5_SETUP_SETTLE);
                self.send(Packet::new(
                    Self::SET_DIMENSION,
                    raster::v5_set_dimension(rows, cols, 1),
                ))?;
                std::thread::sleep(Self::V5_SETUP_SETTLE);

                for (y, pixels) in raster::image_rows(image).enumerate() {
                    self.send(Packet::new(Self::RASTER_ROW, raster::v5_row(y as u16, pixels)))?;
                    std::thread::sleep(Self::V5_ROW_PACING);
                }
            }
        }
        debug!("Sent {} raster rows ({}x{})", rows, cols, rows);

        acked.push(self.end_page_print()?);
        std::thread::sleep(Self::END_PAGE_SETTLE);
        acked.push(self.end_print()?);

        let all_acked = acked.iter().all(|&ok| ok);
        if !all_acked {
            warn!("Print sequence finished with unacknowledged steps: {:?}", acked);
        }
        Ok(all_acked)
    }

    /// Close the underlying transport. Safe to call more than once.
    pub fn disconnect(&mut self) -> Result<(), PrinterError> {
        self.buffer.clear();
        self.packets.clear();
        self.transport
            .disconnect()
            .map_err(|e| PrinterError::Transport(e.to_string()))
    }

    fn transceive_flag(
        &mut self,
        request_code: u8,
        payload: &[u8],
        response_offset: u8,
    ) -> Result<bool, PrinterError> {
        Ok(self
            .transceive(request_code, payload, response_offset)?
            .is_some_and(|packet| packet.data.first().is_some_and(|&b| b != 0)))
    }

    /// Send a request and wait for its response.
    ///
    /// The response type is `request_code + response_offset`, or the generic ack `0`.
    /// `Ok(None)` means the printer stayed silent for every attempt.
    pub fn transceive(
        &mut self,
        request_code: u8,
        payload: &[u8],
        response_offset: u8,
    ) -> Result<Option<Packet>, PrinterError> {
        let expected = response_offset.wrapping_add(request_code);
        self.send(Packet::new(request_code, payload))?;

        for _ in 0..Self::RECV_ATTEMPTS {
            self.recv()?;
            while let Some(packet) = self.packets.pop_front() {
                if packet.packet_type == expected || packet.packet_type == Self::GENERIC_ACK {
                    return Ok(Some(packet));
                }
                warn!(
                    "Discarding packet 0x{:02X} while waiting for 0x{:02X}",
                    packet.packet_type, expected
                );
            }
            std::thread::sleep(Self::RECV_INTERVAL);
        }

        debug!("No response to request 0x{:02X}", request_code);
        Ok(None)
    }

    fn send(&mut self, packet: Packet) -> Result<(), PrinterError> {
        let frame = packet.encode()?;
        debug!("Sending packet: {:02X?}", frame);
        self.transport
            .write(&frame)
            .map_err(|e| PrinterError::Transport(e.to_string()))
    }

    /// Pull available bytes and queue every complete frame; partial frames stay buffered
    fn recv(&mut self) -> Result<(), PrinterError> {
        let bytes = self.transport.read(Self::READ_CHUNK).map_err(|e| {
            error!("Read error: {}", e);
            PrinterError::Transport(e.to_string())
        })?;
        if !bytes.is_empty() {
            debug!("Received {} bytes: {:02X?}", bytes.len(), bytes);
            self.buffer.extend_from_slice(&bytes);
        }

        while self.buffer.len() > 4 {
            let frame_len = self.buffer[3] as usize + FRAME_OVERHEAD;
            if self.buffer.len() < frame_len {
                break;
            }
            let frame: Vec<u8> = self.buffer.drain(..frame_len).collect();
            self.packets.push_back(Packet::decode(&frame)?);
        }
        Ok(())
    }

    fn parse_rfid(data: &[u8]) -> Result<Option<RfidReading>, PrinterError> {
        if data.first().is_none_or(|&b| b == 0) {
            return Ok(None);
        }

        let mut fields = TagFields { data, pos: 0 };
        let uuid = bytes_to_hex(fields.take(8)?);
        let barcode_len = fields.byte()? as usize;
        let barcode = String::from_utf8_lossy(fields.take(barcode_len)?).into_owned();
        let serial_len = fields.byte()? as usize;
        let serial = String::from_utf8_lossy(fields.take(serial_len)?).into_owned();
        let total_len = fields.u16()?;
        let used_len = fields.u16()?;
        let label_type = fields.byte()?;
        let (width_mm, height_mm) = match fields.take(2) {
            Ok(&[w, h]) => (Some(f64::from(w)), Some(f64::from(h))),
            _ => (None, None),
        };

        Ok(Some(RfidReading {
            width_mm,
            height_mm,
            label_type: Some(i64::from(label_type)),
            raw_data: bytes_to_hex(data),
            uuid: Some(uuid),
            barcode: Some(barcode),
            serial: Some(serial),
            total_len: Some(total_len),
            used_len: Some(used_len),
        }))
    }
}

/// Sequential reader over an RFID tag block
struct TagFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TagFields<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PrinterError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(PrinterError::InvalidResponse(format!(
                "RFID block truncated: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, PrinterError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PrinterError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

fn be_uint(data: &[u8]) -> u64 {
    data.iter().take(8).fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
