//! Write/read exchanges against the one or two handles of a pair.
//!
//! The right handle is the timing reference: its reply is polled for until it
//! arrives or the poll bound runs out. The left handle takes whatever is already
//! waiting. Any transport failure marks the whole pair disconnected and ends the
//! exchange on the spot.

use log::{debug, warn};

use crate::{
    error::Result,
    hid::{HidHandle, READ_LENGTH},
    pair::{ControllerPair, Role},
    retry::RetryPolicy,
};

pub type Responses = (Option<Vec<u8>>, Option<Vec<u8>>);

/// Mark the pair disconnected if `result` carries a transport failure
fn track<T, H>(pair: &ControllerPair<H>, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_disconnect() {
            pair.set_disconnected();
        }
    }
    result
}

fn write<H: HidHandle>(pair: &mut ControllerPair<H>, role: Role, frame: &[u8]) -> Result<bool> {
    let result = match pair.slot_mut(role) {
        Some(joycon) => joycon.handle.write(frame).map(|_| true),
        None => return Ok(false),
    };
    let sent = track(pair, result)?;
    debug!("Sent {role:} {:02x?}", frame);
    Ok(sent)
}

fn read<H: HidHandle>(pair: &mut ControllerPair<H>, role: Role) -> Result<Option<Vec<u8>>> {
    let mut buffer = [0; READ_LENGTH];
    let result = match pair.slot_mut(role) {
        Some(joycon) => joycon.handle.read(&mut buffer, true),
        None => return Ok(None),
    };

    let len = track(pair, result)?;
    if len == 0 {
        return Ok(None);
    }

    let response = buffer[..len.min(READ_LENGTH)].to_vec();
    debug!("Received {role:} {:02x?}", response);
    Ok(Some(response))
}

/// Send to each present half and collect its reply.
///
/// A right half that stays silent for the whole poll bound yields `None`
/// without discarding the left reply.
pub fn exchange<H: HidHandle>(
    pair: &mut ControllerPair<H>,
    left: Option<&[u8]>,
    right: Option<&[u8]>,
    policy: &RetryPolicy,
) -> Result<Responses> {
    let mut responses = (None, None);

    if let Some(frame) = left {
        if write(pair, Role::Left, frame)? {
            responses.0 = read(pair, Role::Left)?;
        }
    }

    if let Some(frame) = right {
        if write(pair, Role::Right, frame)? {
            match policy.run(|_| read(pair, Role::Right))? {
                Ok(response) => responses.1 = Some(response),
                Err(attempts) => warn!("No reply from right after {attempts:} polls"),
            }
        }
    }

    Ok(responses)
}

/// Send to each present half without waiting for a reply
pub fn dual_write<H: HidHandle>(
    pair: &mut ControllerPair<H>,
    left: Option<&[u8]>,
    right: Option<&[u8]>,
) -> Result<()> {
    if let Some(frame) = left {
        write(pair, Role::Left, frame)?;
    }
    if let Some(frame) = right {
        write(pair, Role::Right, frame)?;
    }
    Ok(())
}

/// Collect every report already waiting on one half
pub fn drain<H: HidHandle>(pair: &mut ControllerPair<H>, role: Role) -> Result<Vec<Vec<u8>>> {
    let mut reports = vec![];
    while let Some(report) = read(pair, role)? {
        reports.push(report);
    }
    Ok(reports)
}
