use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use log::{debug, info};
use tokio::{
    runtime::Runtime,
    signal::unix::{self, SignalKind},
    sync::mpsc,
    task::{spawn_blocking, JoinError},
};
use tokio_stream::wrappers::{ReceiverStream, SignalStream};

use crate::{
    driver::{Session, SessionConfig},
    hid::HidapiTransport,
    retry::RetryPolicy,
    sink::{ChannelSink, OutputEvent, VirtualGamepad},
    thread::{backoff, duration_from_str, log_outcome},
};

enum JoyconEvent {
    Frame(Vec<OutputEvent>),
    SessionEnded(std::result::Result<Result<()>, JoinError>),
    Exit,
}

/// Userspace driver exposing Joy-Cons and Pro Controllers as a virtual gamepad
#[derive(Debug, Parser)]
pub struct JoyconDriver {
    /// Maximum attempts for bring-up and SPI flash exchanges
    #[clap(long, default_value = "2000")]
    max_attempts: u32,

    /// Duration in seconds to wait between bring-up and SPI flash attempts
    #[clap(long, parse(try_from_str = duration_from_str), default_value = "0")]
    retry_backoff: Duration,

    /// Maximum polls for the right controller's input reply
    #[clap(long, default_value = "2000")]
    poll_attempts: u32,

    /// Duration in seconds to wait between input polls
    #[clap(long, parse(try_from_str = duration_from_str), default_value = "0.0001")]
    poll_backoff: Duration,

    /// Timeout in milliseconds for blocking HID reads
    #[clap(long, default_value = "100")]
    read_timeout: i32,

    /// Duration in seconds to wait between discovery attempts after a disconnect
    #[clap(long, parse(try_from_str = duration_from_str), default_value = "1.0")]
    rediscover_delay: Duration,

    /// Lower bound of the virtual device's stick axes
    #[clap(long, default_value = "32")]
    axis_min: i32,

    /// Upper bound of the virtual device's stick axes
    #[clap(long, default_value = "223")]
    axis_max: i32,

    /// Name of the virtual device
    #[clap(long, default_value = "joycon")]
    name: String,
}

impl JoyconDriver {
    pub fn run(self) -> Result<()> {
        let runtime = Runtime::new()?;
        let _guard = runtime.enter();
        runtime.block_on(self.run_async())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            policy: RetryPolicy::new(self.max_attempts, backoff(self.retry_backoff)),
            poll_policy: RetryPolicy::new(self.poll_attempts, backoff(self.poll_backoff)),
            rediscover_delay: self.rediscover_delay,
        }
    }

    pub async fn run_async(self) -> Result<()> {
        let mut gamepad = VirtualGamepad::new(&self.name, self.axis_min, self.axis_max).await?;

        // Setup session thread
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<OutputEvent>>(8);
        let stop = Arc::new(AtomicBool::new(false));

        let config = self.session_config();
        let read_timeout = self.read_timeout;
        let session_stop = stop.clone();
        let session_handle = spawn_blocking(move || -> Result<()> {
            let transport = HidapiTransport::new(read_timeout)?;
            let mut session =
                Session::new(transport, ChannelSink::new(frame_tx), config, session_stop);

            info!("Discovering controllers");
            session.connect()?;
            session.run()?;
            Ok(())
        });

        // Create event streams
        let frames = ReceiverStream::new(frame_rx).map(JoyconEvent::Frame);
        let session_ended = futures::stream::once(session_handle).map(JoyconEvent::SessionEnded);

        let exit = futures::stream_select!(
            SignalStream::new(unix::signal(SignalKind::interrupt())?),
            SignalStream::new(unix::signal(SignalKind::hangup())?),
            SignalStream::new(unix::signal(SignalKind::terminate())?),
        )
        .map(|_| JoyconEvent::Exit);

        // Main loop
        info!("Entering main loop");
        let mut events = futures::stream_select!(frames, session_ended, exit);

        while let Some(event) = events.next().await {
            match event {
                JoyconEvent::Frame(frame) => {
                    if let Err(e) = gamepad.write(frame).await {
                        stop.store(true, Ordering::Release);
                        return Err(e);
                    }
                }
                JoyconEvent::Exit => {
                    info!("Stopping session");
                    stop.store(true, Ordering::Release);
                }
                JoyconEvent::SessionEnded(result) => {
                    let result = result?;
                    log_outcome("Session", &result);
                    return result;
                }
            }
        }

        debug!("Event streams ended");
        Ok(())
    }
}
