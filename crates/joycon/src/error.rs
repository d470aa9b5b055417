use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Open, write or read on the HID channel failed
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// A bounded exchange never produced the expected reply
    #[error("{operation} timed out after {attempts} attempts ({length} bytes at 0x{address:05X})")]
    ProtocolTimeout {
        operation: &'static str,
        address: u32,
        length: u8,
        attempts: u32,
    },

    #[error("can't mix USB HID with Bluetooth HID in one controller")]
    ModeConflict,

    #[error("malformed report: {reason}")]
    MalformedReport { reason: &'static str },

    #[error("payload of {len} bytes exceeds capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("failed to get a handle for the right Joy-Con or Pro Controller")]
    NoPrimaryController,

    /// Flash dump stopped early; `written` bytes reached the sink
    #[error("flash dump aborted after {written} bytes: {source}")]
    DumpAborted {
        written: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("output sink closed")]
    SinkClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transport(operation: &'static str, e: impl std::fmt::Display) -> Self {
        Error::Transport {
            operation,
            message: e.to_string(),
        }
    }

    /// Whether this error means the device is gone and the pair must be rebuilt
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}
