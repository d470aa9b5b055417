pub mod dump;
pub mod joycon;

use std::time::Duration;

use anyhow::Result;
use log::{error, info};

use crate::error::Error;

/// Log how an application or its session task finished
pub fn log_outcome<T>(name: &str, result: &Result<T>) {
    match result {
        Ok(_) => info!("{name:} finished"),
        Err(e) => error!("{name:} failed: {e:#}"),
    }
}

/// 0 on success, 2 when no controller could be found, 1 for any other failure
pub fn exit_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::NoPrimaryController) => 2,
            _ => 1,
        },
    }
}

/// Log the outcome of `name` and exit with its code
pub fn finish<T>(name: &str, result: Result<T>) -> ! {
    log_outcome(name, &result);
    std::process::exit(exit_code(&result))
}

/// Parse a duration given in fractional seconds
pub fn duration_from_str(s: &str) -> Result<Duration> {
    Ok(Duration::try_from_secs_f64(s.parse::<f64>()?)?)
}

/// A zero backoff means retry immediately
pub fn backoff(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then(|| duration)
}
