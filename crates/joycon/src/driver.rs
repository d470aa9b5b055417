//! The poll loop: request input, decode it, forward it, and rebuild the pair
//! whenever a half drops out.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::sleep,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    connection::{discover, teardown_pair},
    error::{Error, Result},
    hid::{
        command::{GET_INPUT, USB_GET_INPUT},
        frame::{encode_command, Mode},
        Transport,
    },
    input::{decode_bytes, Sides},
    pair::{ControllerPair, Role},
    retry::RetryPolicy,
    sink::{EventSink, OutputEvent},
    sync,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound for bring-up and SPI exchanges
    pub policy: RetryPolicy,
    /// Bound for polling the right half's input reply
    pub poll_policy: RetryPolicy,
    pub rediscover_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            policy: RetryPolicy::default(),
            poll_policy: RetryPolicy::new(2000, Some(Duration::from_micros(100))),
            rediscover_delay: Duration::from_secs(1),
        }
    }
}

/// Input request frame for the given link
pub fn input_request(mode: Mode) -> Result<Vec<u8>> {
    match mode {
        Mode::Usb => Ok(USB_GET_INPUT.to_vec()),
        Mode::Bluetooth => encode_command(mode, GET_INPUT, &[]),
    }
}

pub struct Session<T: Transport, S> {
    transport: T,
    sink: S,
    pair: ControllerPair<T::Handle>,
    config: SessionConfig,
    stop: Arc<AtomicBool>,
}

impl<T, S> Session<T, S>
where
    T: Transport,
    S: EventSink,
{
    pub fn new(transport: T, sink: S, config: SessionConfig, stop: Arc<AtomicBool>) -> Self {
        Session {
            transport,
            sink,
            pair: ControllerPair::default(),
            config,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Initial discovery. Failure here is fatal to the caller.
    pub fn connect(&mut self) -> Result<()> {
        discover(&mut self.transport, &mut self.pair, &self.config.policy)
    }

    /// Drop the current pair and keep rediscovering until a primary half is back
    /// or a stop is requested
    pub fn reconnect(&mut self) -> Result<()> {
        self.pair.reset();

        while !self.stopped() {
            sleep(self.config.rediscover_delay);
            info!("Rediscovering controllers");

            match discover(&mut self.transport, &mut self.pair, &self.config.policy) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Rediscovery failed: {e:}");
                    self.pair.reset();
                }
            }
        }

        Ok(())
    }

    /// Which halves of a report received on `role` belong to it
    fn sides(&self, role: Role) -> Sides {
        match role {
            Role::Left => Sides::Left,
            Role::Right if self.pair.charging_grip => Sides::Right,
            Role::Right => Sides::Both,
        }
    }

    fn forward(&mut self, role: Role, report: &[u8]) -> Result<bool> {
        match decode_bytes(report, self.sides(role)) {
            Some(state) => {
                for event in state.events() {
                    self.sink.send(event)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// One request/decode/forward cycle; returns how many input reports were decoded
    pub fn poll(&mut self) -> Result<usize> {
        let start = Instant::now();
        let mode = self.pair.mode().ok_or(Error::NoPrimaryController)?;
        let request = input_request(mode)?;

        let left = self.pair.left.is_some().then(|| request.as_slice());
        let right = self.pair.right.is_some().then(|| request.as_slice());

        let (left_reply, right_reply) =
            sync::exchange(&mut self.pair, left, right, &self.config.poll_policy)?;

        let mut decoded = 0;
        for (role, reply) in [(Role::Right, right_reply), (Role::Left, left_reply)] {
            let reports = reply
                .into_iter()
                .chain(sync::drain(&mut self.pair, role)?)
                .collect::<Vec<_>>();

            for report in reports {
                if self.forward(role, &report)? {
                    decoded += 1;
                }
            }
        }

        self.sink.send(OutputEvent::Sync)?;
        debug!(
            "Decoded {decoded:} reports in {:.3} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(decoded)
    }

    /// Poll until stopped, rebuilding the pair after every disconnect
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_inner();
        teardown_pair(&mut self.pair);
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        while !self.stopped() {
            match self.poll() {
                Ok(_) => (),
                Err(e) if e.is_disconnect() || self.pair.is_disconnected() => {
                    warn!("Lost controller: {e:}");
                    self.reconnect()?;
                }
                Err(Error::NoPrimaryController) => self.reconnect()?,
                Err(e) => return Err(e),
            }
        }

        info!("Session stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        hid::{command::RESUME_BLUETOOTH, PID_CHARGING_GRIP, PID_PRO_CONTROLLER},
        input::{Axis, Button},
        mock::{MockDevice, MockTransport},
        sink::VecSink,
    };

    const BUTTONS_RIGHT: usize = 13;

    fn config() -> SessionConfig {
        SessionConfig {
            policy: RetryPolicy::default(),
            poll_policy: RetryPolicy::new(10, None),
            rediscover_delay: Duration::ZERO,
        }
    }

    fn session(transport: MockTransport) -> Session<MockTransport, VecSink> {
        let mut session = Session::new(
            transport,
            VecSink::default(),
            config(),
            Arc::new(AtomicBool::new(false)),
        );
        session.connect().unwrap();
        session
    }

    fn pro_controller(mode: Mode) -> (MockTransport, Arc<Mutex<MockDevice>>) {
        let mut transport = MockTransport::new();
        let device = transport.add(PID_PRO_CONTROLLER, 0, mode);
        (transport, device)
    }

    #[test]
    fn input_request_frames() {
        assert_eq!(
            input_request(Mode::Usb).unwrap(),
            [0x80, 0x92, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x1f]
        );
        assert_eq!(input_request(Mode::Bluetooth).unwrap(), [0x1f]);
    }

    #[test]
    fn pro_controller_decodes_both_sides() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        device.lock().unwrap().input[BUTTONS_RIGHT] = 0b0000_1000;
        let mut session = session(transport);

        assert_eq!(session.poll().unwrap(), 1);

        let events = &session.sink.events;
        assert_eq!(events.len(), 2 * (9 + 2) + 1);
        assert!(events.contains(&OutputEvent::Button {
            button: Button::South,
            pressed: true
        }));
        assert!(events.contains(&OutputEvent::Axis {
            axis: Axis::LeftX,
            value: 0
        }));
        assert_eq!(events.last(), Some(&OutputEvent::Sync));
    }

    #[test]
    fn usb_session_sends_enveloped_request() {
        let (transport, device) = pro_controller(Mode::Usb);
        let mut session = session(transport);

        session.poll().unwrap();

        assert_eq!(
            device.lock().unwrap().writes.last().map(Vec::as_slice),
            Some(USB_GET_INPUT)
        );
    }

    #[test]
    fn grip_halves_decode_their_own_side() {
        let mut transport = MockTransport::new();
        transport.add(PID_CHARGING_GRIP, 0, Mode::Usb);
        transport.add(PID_CHARGING_GRIP, 1, Mode::Usb);
        let mut session = session(transport);

        assert_eq!(session.poll().unwrap(), 2);

        let axes = session
            .sink
            .events
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Axis { axis, .. } => Some(*axis),
                _ => None,
            })
            .collect::<Vec<_>>();
        // Right half drained first
        assert_eq!(axes, [Axis::RightX, Axis::RightY, Axis::LeftX, Axis::LeftY]);
    }

    #[test]
    fn unanswered_request_still_syncs() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        let mut session = session(transport);
        device.lock().unwrap().silent = true;

        assert_eq!(session.poll().unwrap(), 0);
        assert_eq!(session.sink.events, [OutputEvent::Sync]);
        assert!(!session.pair.is_disconnected());
    }

    #[test]
    fn silent_right_half_keeps_left_input() {
        let mut transport = MockTransport::new();
        let right = transport.add(PID_CHARGING_GRIP, 0, Mode::Usb);
        transport.add(PID_CHARGING_GRIP, 1, Mode::Usb);
        let mut session = session(transport);
        right.lock().unwrap().silent = true;

        assert_eq!(session.poll().unwrap(), 1);

        let events = &session.sink.events;
        assert_eq!(events.len(), 9 + 2 + 1);
        assert!(events.contains(&OutputEvent::Axis {
            axis: Axis::LeftX,
            value: 0
        }));
        assert!(!events.iter().any(|event| matches!(
            event,
            OutputEvent::Axis {
                axis: Axis::RightX | Axis::RightY,
                ..
            }
        )));
    }

    #[test]
    fn foreign_reports_are_skipped() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        device.lock().unwrap().input[5] = 0x3f;
        let mut session = session(transport);

        assert_eq!(session.poll().unwrap(), 0);
        assert_eq!(session.sink.events, [OutputEvent::Sync]);
    }

    #[test]
    fn disconnect_triggers_rediscovery() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        let mut session = session(transport);

        device.lock().unwrap().fail_reads = true;
        let err = session.poll().unwrap_err();
        assert!(err.is_disconnect());
        assert!(session.pair.is_disconnected());

        device.lock().unwrap().fail_reads = false;
        session.reconnect().unwrap();

        assert!(!session.pair.is_disconnected());
        assert!(session.pair.right.is_some());
        assert_eq!(session.transport.opened.len(), 2);
        assert_eq!(session.pair.counter.get(), 4);
    }

    #[test]
    fn stop_tears_down_the_pair() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        let mut session = session(transport);
        session.stop.store(true, Ordering::Release);

        session.run().unwrap();

        assert!(session.pair.right.is_none());
        assert_eq!(
            device.lock().unwrap().writes.last().map(Vec::as_slice),
            Some(RESUME_BLUETOOTH)
        );
    }

    #[test]
    fn stop_interrupts_rediscovery() {
        let (transport, device) = pro_controller(Mode::Bluetooth);
        let mut session = session(transport);
        device.lock().unwrap().fail_writes = true;
        session.stop.store(true, Ordering::Release);

        session.reconnect().unwrap();
        assert!(session.pair.right.is_none());
    }
}
