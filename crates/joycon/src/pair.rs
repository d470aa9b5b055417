use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};

use log::{info, warn};

use crate::{
    connection::ConnectionState,
    error::{Error, Result},
    hid::{
        self,
        command::RUMBLE_AND_SUBCOMMAND,
        frame::{encode_command, encode_subcommand, Mode, SUBCOMMAND_CAPACITY},
        HidHandle,
    },
    retry::RetryPolicy,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Left,
    Right,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Left => "left",
            Role::Right => "right",
        })
    }
}

/// 4-bit packet counter shared by every subcommand sent through either half of a pair
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    /// Advance and return the new value, wrapping 15 -> 0
    pub fn advance(&self) -> u8 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                Some(value.wrapping_add(1) & 0x0f)
            })
            .unwrap_or_else(|value| value);
        previous.wrapping_add(1) & 0x0f
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// An opened device bound to its role in the pair and the link it was detected on
#[derive(Debug)]
pub struct Joycon<H> {
    pub handle: H,
    pub role: Role,
    pub mode: Mode,
    pub name: &'static str,
    pub serial_number: Option<String>,
    pub state: ConnectionState,
}

impl<H> Joycon<H> {
    pub fn new(handle: H, role: Role, mode: Mode, name: &'static str) -> Self {
        Joycon {
            handle,
            role,
            mode,
            name,
            serial_number: None,
            state: ConnectionState::Discovered,
        }
    }
}

/// Up to two halves presented as one logical controller
#[derive(Debug)]
pub struct ControllerPair<H> {
    pub left: Option<Joycon<H>>,
    pub right: Option<Joycon<H>>,
    pub charging_grip: bool,
    pub counter: SequenceCounter,
    disconnected: AtomicBool,
}

impl<H> Default for ControllerPair<H> {
    fn default() -> Self {
        ControllerPair {
            left: None,
            right: None,
            charging_grip: false,
            counter: SequenceCounter::default(),
            disconnected: AtomicBool::new(false),
        }
    }
}

impl<H> ControllerPair<H> {
    pub fn slot(&self, role: Role) -> Option<&Joycon<H>> {
        match role {
            Role::Left => self.left.as_ref(),
            Role::Right => self.right.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, role: Role) -> &mut Option<Joycon<H>> {
        match role {
            Role::Left => &mut self.left,
            Role::Right => &mut self.right,
        }
    }

    /// Assign a brought-up half. A live handle in the slot is never replaced.
    pub fn assign(&mut self, joycon: Joycon<H>) -> bool {
        let slot = self.slot_mut(joycon.role);
        if slot.is_some() {
            warn!("{} slot already taken, ignoring {}", joycon.role, joycon.name);
            false
        } else {
            *slot = Some(joycon);
            true
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.right
            .as_ref()
            .or(self.left.as_ref())
            .map(|joycon| joycon.mode)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub fn set_disconnected(&self) {
        if !self.disconnected.swap(true, Ordering::AcqRel) {
            info!("Controller disconnected");
        }
    }

    /// Drop both handles and start over
    pub fn reset(&mut self) {
        self.left = None;
        self.right = None;
        self.charging_grip = false;
        self.counter.reset();
        self.disconnected.store(false, Ordering::Release);
    }

    /// Borrow one half together with the pair context needed to talk to it
    pub fn link<'a>(&'a mut self, role: Role, policy: &'a RetryPolicy) -> Option<Link<'a, H>> {
        let counter = &self.counter;
        let joycon = match role {
            Role::Left => self.left.as_mut(),
            Role::Right => self.right.as_mut(),
        }?;

        Some(Link {
            handle: &mut joycon.handle,
            mode: joycon.mode,
            counter,
            policy,
        })
    }
}

/// A single handle plus the shared counter and retry policy used for its exchanges
pub struct Link<'a, H> {
    pub handle: &'a mut H,
    pub mode: Mode,
    pub counter: &'a SequenceCounter,
    pub policy: &'a RetryPolicy,
}

impl<'a, H: HidHandle> Link<'a, H> {
    pub fn new(
        handle: &'a mut H,
        mode: Mode,
        counter: &'a SequenceCounter,
        policy: &'a RetryPolicy,
    ) -> Self {
        Link {
            handle,
            mode,
            counter,
            policy,
        }
    }

    /// Write a prebuilt frame and wait for the reply
    pub fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        hid::request(&mut *self.handle, frame)
    }

    pub fn command(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_command(self.mode, command, payload)?;
        self.exchange(&frame)
    }

    /// Send a subcommand under the next sequence value
    pub fn subcommand(&mut self, subcommand: u8, payload: &[u8]) -> Result<Vec<u8>> {
        // Check capacity first so a rejected payload doesn't consume a counter value
        if payload.len() > SUBCOMMAND_CAPACITY {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                capacity: SUBCOMMAND_CAPACITY,
            });
        }

        let counter = self.counter.advance();
        let frame = encode_subcommand(
            self.mode,
            counter,
            RUMBLE_AND_SUBCOMMAND,
            subcommand,
            payload,
        )?;
        self.exchange(&frame)
    }
}
