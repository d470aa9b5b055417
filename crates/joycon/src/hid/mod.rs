pub mod command;
pub mod frame;

use std::{ffi::CString, fmt::Display};

use hidapi::{HidApi, HidDevice};
use log::{debug, info};

use crate::error::{Error, Result};

pub const VID: u16 = 0x057e;
pub const PID_JOYCON_L: u16 = 0x2006;
pub const PID_JOYCON_R: u16 = 0x2007;
pub const PID_PRO_CONTROLLER: u16 = 0x2009;
pub const PID_CHARGING_GRIP: u16 = 0x200e;

/// Scanned in this order during discovery
pub const PRODUCT_IDS: [u16; 4] = [
    PID_JOYCON_L,
    PID_JOYCON_R,
    PID_PRO_CONTROLLER,
    PID_CHARGING_GRIP,
];

/// Serial identity reported by devices attached over the USB serial link
pub const USB_SERIAL: &str = "000000000001";

/// Fixed size of an input report
pub const REPORT_LENGTH: usize = 0x40;

/// Size of the scratch buffer replies are read into
pub const READ_LENGTH: usize = 0x400;

/// Everything enumeration tells us about a device before it is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: CString,
    pub vendor_id: u16,
    pub product_id: u16,
    /// -1 on platforms that don't report interfaces for single-interface devices
    pub interface_number: i32,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vid: 0x{:04X} pid: 0x{:04X} path: {} serial: {} interface: {} manufacturer: {} product: {}",
            self.vendor_id,
            self.product_id,
            self.path.to_string_lossy(),
            self.serial_number.as_deref().unwrap_or("?"),
            self.interface_number,
            self.manufacturer.as_deref().unwrap_or("?"),
            self.product.as_deref().unwrap_or("?"),
        )
    }
}

/// An open HID channel; closed on drop
pub trait HidHandle {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Read one report into `buf`.
    ///
    /// A non-blocking read with nothing pending returns `Ok(0)`.
    fn read(&mut self, buf: &mut [u8], nonblocking: bool) -> Result<usize>;
}

/// Device enumeration and opening
pub trait Transport {
    type Handle: HidHandle;

    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>>;

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Handle>;
}

/// Write a frame, then block for the reply.
///
/// Returns the reply bytes; empty if the device didn't answer in time.
pub fn request<H: HidHandle>(handle: &mut H, frame: &[u8]) -> Result<Vec<u8>> {
    handle.write(frame)?;
    debug!("Sent {:02x?}", frame);

    let mut buffer = [0; READ_LENGTH];
    let len = handle.read(&mut buffer, false)?;
    let reply = buffer[..len.min(READ_LENGTH)].to_vec();
    if !reply.is_empty() {
        debug!("Received {:02x?}", reply);
    }
    Ok(reply)
}

pub struct HidapiTransport {
    api: HidApi,
    read_timeout: i32,
}

impl HidapiTransport {
    /// `read_timeout` bounds blocking reads, in milliseconds
    pub fn new(read_timeout: i32) -> Result<Self> {
        let api = HidApi::new().map_err(|e| Error::transport("hid init", e))?;
        Ok(HidapiTransport { api, read_timeout })
    }
}

impl Transport for HidapiTransport {
    type Handle = HidapiHandle;

    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
        self.api
            .refresh_devices()
            .map_err(|e| Error::transport("enumerate", e))?;

        Ok(self
            .api
            .device_list()
            .filter(|device_info| {
                device_info.vendor_id() == vendor_id && device_info.product_id() == product_id
            })
            .map(|device_info| DeviceDescriptor {
                path: device_info.path().to_owned(),
                vendor_id: device_info.vendor_id(),
                product_id: device_info.product_id(),
                interface_number: device_info.interface_number(),
                serial_number: device_info.serial_number().map(ToOwned::to_owned),
                manufacturer: device_info.manufacturer_string().map(ToOwned::to_owned),
                product: device_info.product_string().map(ToOwned::to_owned),
            })
            .collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Handle> {
        let device = self
            .api
            .open_path(&descriptor.path)
            .map_err(|e| Error::transport("open", e))?;

        info!("Opened {}", descriptor.path.to_string_lossy());

        let mut handle = HidapiHandle {
            device,
            read_timeout: self.read_timeout,
        };
        handle.flush_read()?;
        Ok(handle)
    }
}

pub struct HidapiHandle {
    device: HidDevice,
    read_timeout: i32,
}

impl HidapiHandle {
    /// Discard any pending read packets to ensure the write-read cycle syncs up
    fn flush_read(&mut self) -> Result<()> {
        let mut buffer = [0; READ_LENGTH];
        while self.read(&mut buffer, true)? > 0 {
            debug!("Flushed {:02x?}", &buffer[..REPORT_LENGTH]);
        }
        Ok(())
    }
}

impl HidHandle for HidapiHandle {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.device
            .write(buf)
            .map_err(|e| Error::transport("write", e))
    }

    fn read(&mut self, buf: &mut [u8], nonblocking: bool) -> Result<usize> {
        let timeout = if nonblocking { 0 } else { self.read_timeout };
        self.device
            .read_timeout(buf, timeout)
            .map_err(|e| Error::transport("read", e))
    }
}
