// USB serial link commands, sent as bare two-byte frames
pub const GET_MAC: &[u8] = &[0x80, 0x01];
pub const HANDSHAKE: &[u8] = &[0x80, 0x02];
pub const BAUDRATE_3M: &[u8] = &[0x80, 0x03];
pub const HID_ONLY: &[u8] = &[0x80, 0x04];
pub const RESUME_BLUETOOTH: &[u8] = &[0x80, 0x05];

/// Byte of the `GET_MAC` reply that signals a missing device
pub const STATUS_OFFSET: usize = 0x02;
pub const STATUS_DISCONNECTED: u8 = 0x03;

// Outer commands
pub const RUMBLE_AND_SUBCOMMAND: u8 = 0x01;
pub const GET_INPUT: u8 = 0x1f;

// Subcommands
pub const SET_INPUT_REPORT_MODE: u8 = 0x03;
pub const SPI_READ: u8 = 0x10;
pub const SPI_WRITE: u8 = 0x11;
pub const ENABLE_IMU: u8 = 0x40;
pub const ENABLE_VIBRATION: u8 = 0x48;

pub const ENABLED: u8 = 0x01;
pub const REPORT_MODE_FULL: u8 = 0x31;

/// Location and size of the factory serial number in flash
pub const SERIAL_NUMBER_ADDRESS: u32 = 0x6002;
pub const SERIAL_NUMBER_LENGTH: u8 = 0x0e;

/// Input request in USB mode carries its own post-handshake header
pub const USB_GET_INPUT: &[u8] = &[0x80, 0x92, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, GET_INPUT];

pub const fn feature(subcommand: u8, argument: u8) -> (u8, [u8; 1]) {
    (subcommand, [argument])
}

pub const FEATURE_VIBRATION: (u8, [u8; 1]) = feature(ENABLE_VIBRATION, ENABLED);
pub const FEATURE_IMU: (u8, [u8; 1]) = feature(ENABLE_IMU, ENABLED);
pub const FEATURE_REPORT_RATE: (u8, [u8; 1]) = feature(SET_INPUT_REPORT_MODE, REPORT_MODE_FULL);
