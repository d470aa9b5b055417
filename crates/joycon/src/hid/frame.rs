//! Command framing.
//!
//! Over Bluetooth a frame is the command byte followed by its payload. Over the
//! USB serial link the same frame is wrapped in an 8 byte `80 92 .. 31` envelope,
//! shifting the command to offset 8 and the payload to offset 9. Replies are
//! shifted by 10 bytes in USB mode.

use crate::{
    error::{Error, Result},
    hid::USB_SERIAL,
};

/// Largest payload a single command frame can carry
pub const PAYLOAD_CAPACITY: usize = 0x3a;

/// Rumble data following the sequence counter in every subcommand frame
pub const RUMBLE_NEUTRAL: [u8; 8] = [0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40];

/// Counter byte plus neutral rumble
pub const SUBCOMMAND_HEADER_LENGTH: usize = 1 + RUMBLE_NEUTRAL.len();

/// Largest argument a subcommand can carry once header and id are accounted for
pub const SUBCOMMAND_CAPACITY: usize = PAYLOAD_CAPACITY - SUBCOMMAND_HEADER_LENGTH - 1;

const USB_ENVELOPE: [u8; 8] = [0x80, 0x92, 0x00, 0x31, 0x00, 0x00, 0x00, 0x00];
const USB_REPLY_SHIFT: usize = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    Usb,
    Bluetooth,
}

impl Mode {
    /// Infer the link from a device's reported serial identity
    pub fn from_serial(serial: Option<&str>) -> Self {
        match serial {
            Some(USB_SERIAL) => Mode::Usb,
            _ => Mode::Bluetooth,
        }
    }

    pub const fn command_offset(self) -> usize {
        match self {
            Mode::Bluetooth => 0,
            Mode::Usb => USB_ENVELOPE.len(),
        }
    }

    pub const fn payload_offset(self) -> usize {
        self.command_offset() + 1
    }

    const fn reply_shift(self) -> usize {
        match self {
            Mode::Bluetooth => 0,
            Mode::Usb => USB_REPLY_SHIFT,
        }
    }

    /// Offset of the echoed little-endian address in an SPI reply
    pub const fn spi_address_offset(self) -> usize {
        0x0f + self.reply_shift()
    }

    /// Offset of the byte checked against the SPI write subcommand id
    pub const fn spi_write_ack_offset(self) -> usize {
        0x10 + self.reply_shift()
    }

    /// Offset of the data returned by an SPI read
    pub const fn spi_data_offset(self) -> usize {
        0x14 + self.reply_shift()
    }

    /// Report id of a subcommand reply
    pub const fn ack_report_id(self) -> u8 {
        match self {
            Mode::Bluetooth => 0x21,
            Mode::Usb => 0x81,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Usb => "USB",
            Mode::Bluetooth => "Bluetooth",
        })
    }
}

/// Logical content of an outgoing frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: u8,
    /// Subcommand id and the sequence counter it was sent with
    pub subcommand: Option<(u8, u8)>,
    pub payload: Vec<u8>,
}

impl CommandFrame {
    pub fn encode(&self, mode: Mode) -> Result<Vec<u8>> {
        match self.subcommand {
            Some((subcommand, counter)) => {
                encode_subcommand(mode, counter, self.command, subcommand, &self.payload)
            }
            None => encode_command(mode, self.command, &self.payload),
        }
    }

    /// Parse a frame produced by [`CommandFrame::encode`].
    ///
    /// With `has_subcommand`, the payload is split into counter, subcommand id and argument.
    pub fn decode(mode: Mode, frame: &[u8], has_subcommand: bool) -> Option<Self> {
        let command = *frame.get(mode.command_offset())?;
        let payload = frame.get(mode.payload_offset()..)?;

        if !has_subcommand {
            return Some(CommandFrame {
                command,
                subcommand: None,
                payload: payload.to_vec(),
            });
        }

        let counter = *payload.first()?;
        let subcommand = *payload.get(SUBCOMMAND_HEADER_LENGTH)?;
        let argument = payload.get(SUBCOMMAND_HEADER_LENGTH + 1..)?;

        Some(CommandFrame {
            command,
            subcommand: Some((subcommand, counter)),
            payload: argument.to_vec(),
        })
    }
}

/// Frame a bare command. Output length is always `payload.len() + mode.payload_offset()`.
pub fn encode_command(mode: Mode, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > PAYLOAD_CAPACITY {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            capacity: PAYLOAD_CAPACITY,
        });
    }

    let mut frame = Vec::with_capacity(mode.payload_offset() + payload.len());
    if mode == Mode::Usb {
        frame.extend_from_slice(&USB_ENVELOPE);
    }
    frame.push(command);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Frame a subcommand behind the counter and neutral rumble header.
///
/// `counter` is the already advanced sequence value; only its low nibble is sent.
pub fn encode_subcommand(
    mode: Mode,
    counter: u8,
    command: u8,
    subcommand: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > SUBCOMMAND_CAPACITY {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            capacity: SUBCOMMAND_CAPACITY,
        });
    }

    let body = [
        &[counter & 0x0f][..],
        &RUMBLE_NEUTRAL[..],
        &[subcommand][..],
        payload,
    ]
    .concat();

    encode_command(mode, command, &body)
}

/// Recover the command byte from an encoded frame
pub fn decode_command(mode: Mode, frame: &[u8]) -> Option<u8> {
    frame.get(mode.command_offset()).copied()
}
