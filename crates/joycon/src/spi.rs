//! Reading and writing the controller's SPI flash through subcommands 0x10 / 0x11

use std::io::Write;

use log::{debug, error, info};

use crate::{
    error::{Error, Result},
    hid::{
        command::{SPI_READ, SPI_WRITE},
        frame::Mode,
        HidHandle,
    },
    pair::Link,
};

/// Most flash data a single reply can carry
pub const MAX_TRANSFER: u8 = 0x1d;

/// Total size of the controller's flash
pub const FLASH_SIZE: u32 = 0x80000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One bounded request against flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiTransaction {
    pub address: u32,
    pub length: u8,
    pub direction: Direction,
    /// Bytes to write; empty for reads
    pub data: Vec<u8>,
}

impl SpiTransaction {
    pub fn read(address: u32, length: u8) -> Result<Self> {
        check_length(usize::from(length))?;
        Ok(SpiTransaction {
            address,
            length,
            direction: Direction::Read,
            data: vec![],
        })
    }

    pub fn write(address: u32, data: &[u8]) -> Result<Self> {
        check_length(data.len())?;
        Ok(SpiTransaction {
            address,
            length: data.len() as u8,
            direction: Direction::Write,
            data: data.to_vec(),
        })
    }

    pub fn subcommand(&self) -> u8 {
        match self.direction {
            Direction::Read => SPI_READ,
            Direction::Write => SPI_WRITE,
        }
    }

    fn operation(&self) -> &'static str {
        match self.direction {
            Direction::Read => "spi_read",
            Direction::Write => "spi_write",
        }
    }

    /// Subcommand argument: little-endian address, length, then any data
    pub fn body(&self) -> Vec<u8> {
        [
            &self.address.to_le_bytes()[..],
            &[self.length][..],
            &self.data[..],
        ]
        .concat()
    }

    /// Whether `reply` answers this transaction
    pub fn accepts(&self, mode: Mode, reply: &[u8]) -> bool {
        match self.direction {
            Direction::Read => {
                let echo_offset = mode.spi_address_offset();
                let data_end = mode.spi_data_offset() + usize::from(self.length);
                reply.len() >= data_end
                    && reply[0] == mode.ack_report_id()
                    && reply
                        .get(echo_offset..echo_offset + 4)
                        .map(|echo| echo == self.address.to_le_bytes())
                        .unwrap_or(false)
            }
            Direction::Write => {
                reply.get(mode.spi_write_ack_offset()) == Some(&SPI_WRITE)
                    || reply.first() == Some(&mode.ack_report_id())
            }
        }
    }

    /// Run the request/response cycle until an accepted reply or the retry bound
    pub fn execute<H: HidHandle>(&self, link: &mut Link<H>) -> Result<Vec<u8>> {
        let body = self.body();
        let mode = link.mode;
        let policy = *link.policy;

        let outcome = policy.run(|attempt| -> Result<Option<Vec<u8>>> {
            let reply = link.subcommand(self.subcommand(), &body)?;
            if self.accepts(mode, &reply) {
                debug!(
                    "{} of {} bytes at 0x{:05X} accepted on attempt {attempt:}",
                    self.operation(),
                    self.length,
                    self.address
                );
                Ok(Some(reply))
            } else {
                Ok(None)
            }
        })?;

        outcome.map_err(|attempts| {
            error!(
                "{} error or timeout, skipped {} bytes at address 0x{:05X}",
                self.operation(),
                self.length,
                self.address
            );
            Error::ProtocolTimeout {
                operation: self.operation(),
                address: self.address,
                length: self.length,
                attempts,
            }
        })
    }
}

fn check_length(len: usize) -> Result<()> {
    if len > usize::from(MAX_TRANSFER) {
        Err(Error::PayloadTooLarge {
            len,
            capacity: usize::from(MAX_TRANSFER),
        })
    } else {
        Ok(())
    }
}

pub fn spi_read<H: HidHandle>(link: &mut Link<H>, address: u32, length: u8) -> Result<Vec<u8>> {
    let transaction = SpiTransaction::read(address, length)?;
    let reply = transaction.execute(link)?;
    let start = link.mode.spi_data_offset();
    Ok(reply[start..start + usize::from(length)].to_vec())
}

/// Permanently modifies controller flash
pub fn spi_write<H: HidHandle>(link: &mut Link<H>, address: u32, data: &[u8]) -> Result<()> {
    SpiTransaction::write(address, data)?.execute(link)?;
    Ok(())
}

/// Stream the whole flash into `sink`, returning the number of bytes written.
///
/// Any failed chunk aborts the dump; the error carries the byte count reached.
pub fn spi_flash_dump<H: HidHandle, W: Write>(link: &mut Link<H>, sink: &mut W) -> Result<u32> {
    let mut written = 0u32;

    let abort = |written, source| Error::DumpAborted {
        written,
        source: Box::new(source),
    };

    while written < FLASH_SIZE {
        let length = (FLASH_SIZE - written).min(u32::from(MAX_TRANSFER)) as u8;

        let chunk = spi_read(link, written, length).map_err(|e| abort(written, e))?;
        sink.write_all(&chunk)
            .map_err(|e| abort(written, Error::from(e)))?;

        if written & 0xff == 0 {
            info!("Dumped 0x{written:05X} of 0x{FLASH_SIZE:05X}");
        }
        written += u32::from(length);
    }

    sink.flush().map_err(|e| abort(written, Error::from(e)))?;
    info!("Dumped 0x{written:05X} of 0x{FLASH_SIZE:05X}");

    Ok(written)
}
