pub mod connection;
pub mod driver;
pub mod error;
pub mod hid;
pub mod input;
pub mod pair;
pub mod retry;
pub mod sink;
pub mod spi;
pub mod sync;
pub mod thread;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
