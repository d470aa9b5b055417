//! Scripted transport used by the unit tests

use std::{
    collections::VecDeque,
    ffi::CString,
    sync::{Arc, Mutex},
};

use crate::{
    error::{Error, Result},
    hid::{
        command::{GET_INPUT, RUMBLE_AND_SUBCOMMAND, SPI_READ, SPI_WRITE},
        frame::{CommandFrame, Mode},
        DeviceDescriptor, HidHandle, Transport, PID_JOYCON_L, REPORT_LENGTH, USB_SERIAL, VID,
    },
    input::FULL_INPUT_REPORT,
};

pub const FLASH_SIZE: usize = 0x80000;

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Simulated controller: answers serial commands, subcommands and input requests
#[derive(Debug)]
pub struct MockDevice {
    pub mode: Mode,
    pub flash: Vec<u8>,
    pub writes: Vec<Vec<u8>>,
    pub pending: VecDeque<Vec<u8>>,
    pub fail_writes: bool,
    pub fail_reads: bool,
    /// Swallow every frame without answering
    pub silent: bool,
    /// Answer SPI reads with an address that never matches
    pub wrong_echo: bool,
    /// Report the USB link as disconnected on MAC query
    pub unplugged: bool,
    /// Non-blocking reads that come back empty before a pending reply is delivered
    pub empty_polls: usize,
    pub input: [u8; REPORT_LENGTH],
}

impl MockDevice {
    pub fn new(mode: Mode) -> Self {
        let mut input = [0; REPORT_LENGTH];
        input[5] = FULL_INPUT_REPORT;
        MockDevice {
            mode,
            flash: (0..FLASH_SIZE).map(|i| (i % 251) as u8).collect(),
            writes: vec![],
            pending: VecDeque::new(),
            fail_writes: false,
            fail_reads: false,
            silent: false,
            wrong_echo: false,
            unplugged: false,
            empty_polls: 0,
            input,
        }
    }

    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    fn reply_frame(&self) -> Vec<u8> {
        let mut reply = vec![0; REPORT_LENGTH];
        reply[0] = self.mode.ack_report_id();
        reply
    }

    fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if self.silent {
            return None;
        }

        // Two byte serial link commands
        if frame.len() == 2 && frame[0] == 0x80 {
            let mut reply = vec![0; REPORT_LENGTH];
            reply[0] = 0x81;
            reply[1] = frame[1];
            reply[2] = if self.unplugged { 0x03 } else { 0x00 };
            reply[4..10].copy_from_slice(&[0x6a, 0x50, 0x46, 0xe9, 0xb6, 0x98]);
            return Some(reply);
        }

        let command = *frame.get(self.mode.command_offset())?;
        if command == GET_INPUT {
            return Some(self.input.to_vec());
        }
        if command != RUMBLE_AND_SUBCOMMAND {
            return Some(self.reply_frame());
        }

        let parsed = CommandFrame::decode(self.mode, frame, true)?;
        let (subcommand, _) = parsed.subcommand?;
        let argument = parsed.payload;
        let mut reply = self.reply_frame();

        match subcommand {
            SPI_READ => {
                let address = u32::from_le_bytes(argument[0..4].try_into().ok()?);
                let length = usize::from(argument[4]);
                let echo = if self.wrong_echo {
                    address.wrapping_add(1)
                } else {
                    address
                };
                let echo_offset = self.mode.spi_address_offset();
                reply[echo_offset..echo_offset + 4].copy_from_slice(&echo.to_le_bytes());
                reply[echo_offset + 4] = argument[4];

                let start = address as usize;
                let data_offset = self.mode.spi_data_offset();
                reply[data_offset..data_offset + length]
                    .copy_from_slice(&self.flash[start..start + length]);
            }
            SPI_WRITE => {
                let address = u32::from_le_bytes(argument[0..4].try_into().ok()?) as usize;
                let length = usize::from(argument[4]);
                self.flash[address..address + length].copy_from_slice(&argument[5..5 + length]);
                reply[self.mode.spi_write_ack_offset()] = SPI_WRITE;
            }
            _ => (),
        }

        Some(reply)
    }
}

pub struct MockHandle {
    pub name: &'static str,
    pub device: Arc<Mutex<MockDevice>>,
    pub journal: Journal,
}

impl MockHandle {
    pub fn new(name: &'static str, device: Arc<Mutex<MockDevice>>, journal: Journal) -> Self {
        MockHandle {
            name,
            device,
            journal,
        }
    }
}

impl HidHandle for MockHandle {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} write", self.name));

        let mut device = self.device.lock().unwrap();
        if device.fail_writes {
            return Err(Error::transport("write", "device unplugged"));
        }

        device.writes.push(buf.to_vec());
        if let Some(reply) = device.respond(buf) {
            device.pending.push_back(reply);
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8], nonblocking: bool) -> Result<usize> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} read", self.name));

        let mut device = self.device.lock().unwrap();
        if device.fail_reads {
            return Err(Error::transport("read", "device unplugged"));
        }

        if nonblocking && device.empty_polls > 0 {
            device.empty_polls -= 1;
            return Ok(0);
        }

        match device.pending.pop_front() {
            Some(reply) => {
                let len = reply.len().min(buf.len());
                buf[..len].copy_from_slice(&reply[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}

pub struct MockTransport {
    pub devices: Vec<(DeviceDescriptor, Arc<Mutex<MockDevice>>)>,
    pub journal: Journal,
    pub opened: Vec<CString>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            devices: vec![],
            journal: Journal::default(),
            opened: vec![],
        }
    }

    /// Register a device and return the shared state tests can poke at
    pub fn add(&mut self, product_id: u16, interface_number: i32, mode: Mode) -> Arc<Mutex<MockDevice>> {
        let device = MockDevice::new(mode).shared();
        let serial = match mode {
            Mode::Usb => USB_SERIAL.to_owned(),
            Mode::Bluetooth => format!("98b6e94650{:02x}", self.devices.len()),
        };
        let descriptor = DeviceDescriptor {
            path: CString::new(format!("/dev/hidraw{}", self.devices.len())).unwrap(),
            vendor_id: VID,
            product_id,
            interface_number,
            serial_number: Some(serial),
            manufacturer: Some("Nintendo".to_owned()),
            product: None,
        };
        self.devices.push((descriptor, device.clone()));
        device
    }
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
        Ok(self
            .devices
            .iter()
            .map(|(descriptor, _)| descriptor)
            .filter(|descriptor| {
                descriptor.vendor_id == vendor_id && descriptor.product_id == product_id
            })
            .cloned()
            .collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Handle> {
        let (_, device) = self
            .devices
            .iter()
            .find(|(candidate, _)| candidate.path == descriptor.path)
            .ok_or_else(|| Error::transport("open", "no such device"))?;
        self.opened.push(descriptor.path.clone());
        // Stale replies are flushed on open
        device.lock().unwrap().pending.clear();

        let name = if descriptor.interface_number == 1 || descriptor.product_id == PID_JOYCON_L {
            "left"
        } else {
            "right"
        };
        Ok(MockHandle::new(name, device.clone(), self.journal.clone()))
    }
}
