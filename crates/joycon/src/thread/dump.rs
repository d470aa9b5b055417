use std::{fs::File, io::BufWriter, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;

use crate::{
    connection::{discover, teardown_pair},
    hid::{HidHandle, HidapiTransport},
    pair::{ControllerPair, Role},
    retry::RetryPolicy,
    spi::spi_flash_dump,
    thread::{backoff, duration_from_str},
};

/// Dump the SPI flash of a Joy-Con or Pro Controller to a file
#[derive(Debug, Parser)]
pub struct JoyconDump {
    /// File the 512 KiB flash image is written to
    #[clap(long)]
    output: PathBuf,

    /// Dump the left Joy-Con of a pair instead of the right one
    #[clap(long)]
    left: bool,

    /// Maximum attempts per flash read
    #[clap(long, default_value = "2000")]
    max_attempts: u32,

    /// Duration in seconds to wait between flash read attempts
    #[clap(long, parse(try_from_str = duration_from_str), default_value = "0")]
    retry_backoff: Duration,

    /// Timeout in milliseconds for blocking HID reads
    #[clap(long, default_value = "100")]
    read_timeout: i32,
}

impl JoyconDump {
    pub fn role(&self) -> Role {
        if self.left {
            Role::Left
        } else {
            Role::Right
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, backoff(self.retry_backoff))
    }

    pub fn run(self) -> Result<()> {
        let policy = self.policy();
        let mut transport = HidapiTransport::new(self.read_timeout)?;
        let mut pair = ControllerPair::default();

        info!("Discovering controllers");
        discover(&mut transport, &mut pair, &policy)?;

        let result = self.dump(&mut pair, &policy);
        teardown_pair(&mut pair);
        result
    }

    fn dump<H: HidHandle>(&self, pair: &mut ControllerPair<H>, policy: &RetryPolicy) -> Result<()> {
        let role = self.role();
        let mut link = pair
            .link(role, policy)
            .ok_or_else(|| anyhow!("No {role:} controller to dump"))?;

        let mut file = BufWriter::new(File::create(&self.output)?);
        info!("Dumping {role:} flash to {}", self.output.display());

        let written = spi_flash_dump(&mut link, &mut file)?;
        info!("Wrote {written:} bytes to {}", self.output.display());

        Ok(())
    }
}
