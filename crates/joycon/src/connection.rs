//! Device discovery, per-handle bring-up and teardown.
//!
//! A half moves through `Discovered -> ModeDetected -> Handshaking ->
//! FeaturesEnabled -> Ready`. Handshaking only happens on the USB serial link.
//! Any failure drops that half alone into `Failed` and its handle is released.

use std::fmt::Display;

use log::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    hid::{
        command::{
            BAUDRATE_3M, FEATURE_IMU, FEATURE_REPORT_RATE, FEATURE_VIBRATION, GET_MAC, HANDSHAKE,
            HID_ONLY, RESUME_BLUETOOTH, SERIAL_NUMBER_ADDRESS, SERIAL_NUMBER_LENGTH,
            STATUS_DISCONNECTED, STATUS_OFFSET,
        },
        frame::Mode,
        DeviceDescriptor, HidHandle, Transport, PID_CHARGING_GRIP, PID_JOYCON_L, PID_JOYCON_R,
        PID_PRO_CONTROLLER, PRODUCT_IDS, VID,
    },
    pair::{ControllerPair, Joycon, Link, Role, SequenceCounter},
    retry::RetryPolicy,
    spi::spi_read,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Discovered,
    ModeDetected,
    Handshaking,
    FeaturesEnabled,
    Ready,
    Failed,
    Closed,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Discovered => "discovered",
            ConnectionState::ModeDetected => "mode detected",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::FeaturesEnabled => "features enabled",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        })
    }
}

fn enter<H>(joycon: &mut Joycon<H>, state: ConnectionState) {
    info!(
        "{} ({}): {} -> {}",
        joycon.name, joycon.role, joycon.state, state
    );
    joycon.state = state;
}

/// A matching device that hasn't been opened yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub descriptor: DeviceDescriptor,
    pub role: Role,
    pub mode: Mode,
    pub name: &'static str,
    pub charging_grip: bool,
}

/// Role a device takes in the pair, or `None` for interfaces we don't talk to
fn identify(product_id: u16, interface_number: i32) -> Option<(Role, &'static str)> {
    match (product_id, interface_number) {
        (PID_JOYCON_L, -1 | 0) => Some((Role::Left, "Joy-Con (L)")),
        (PID_JOYCON_R, -1 | 0) => Some((Role::Right, "Joy-Con (R)")),
        (PID_PRO_CONTROLLER, -1 | 0) => Some((Role::Right, "Pro Controller")),
        (PID_CHARGING_GRIP, -1 | 0) => Some((Role::Right, "Joy-Con (R) in charging grip")),
        (PID_CHARGING_GRIP, 1) => Some((Role::Left, "Joy-Con (L) in charging grip")),
        _ => None,
    }
}

/// Enumerate every known product, keeping every match for an unclaimed role in scan order
pub fn scan<T: Transport>(
    transport: &mut T,
    pair: &ControllerPair<T::Handle>,
) -> Result<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = vec![];

    for product_id in PRODUCT_IDS {
        for descriptor in transport.enumerate(VID, product_id)? {
            if descriptor.product_id != product_id {
                continue;
            }
            info!("Found {descriptor:}");

            let (role, name) = match identify(descriptor.product_id, descriptor.interface_number) {
                Some(identity) => identity,
                None => continue,
            };

            if pair.slot(role).is_some() {
                warn!("{role:} slot already claimed, ignoring {name:}");
                continue;
            }

            let mode = Mode::from_serial(descriptor.serial_number.as_deref());
            candidates.push(Candidate {
                descriptor,
                role,
                mode,
                name,
                charging_grip: product_id == PID_CHARGING_GRIP,
            });
        }
    }

    Ok(candidates)
}

/// Fill the empty slots of `pair` with every controller that comes up.
///
/// Candidates are tried in scan order; a role whose device fails to open or
/// come up falls through to the next match for that role.
///
/// Fails with `ModeConflict` before anything is opened if the halves disagree
/// on their link, and with `NoPrimaryController` if no right half is usable.
pub fn discover<T: Transport>(
    transport: &mut T,
    pair: &mut ControllerPair<T::Handle>,
    policy: &RetryPolicy,
) -> Result<()> {
    let candidates = scan(transport, pair)?;

    let mut modes = candidates.iter().map(|c| c.mode).chain(pair.mode());
    if let Some(first) = modes.next() {
        if modes.any(|mode| mode != first) {
            error!("Can't mix USB HID with Bluetooth HID");
            return Err(Error::ModeConflict);
        }
    }

    for candidate in candidates {
        if pair.slot(candidate.role).is_some() {
            debug!("{} slot already filled, skipping {}", candidate.role, candidate.name);
            continue;
        }

        let handle = match transport.open(&candidate.descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to open {}: {e:}", candidate.name);
                continue;
            }
        };

        let mut joycon = Joycon::new(handle, candidate.role, candidate.mode, candidate.name);
        enter(&mut joycon, ConnectionState::ModeDetected);
        info!("{} is using {} mode", joycon.name, joycon.mode);

        match bring_up(&mut joycon, &pair.counter, policy) {
            Ok(()) => {
                pair.charging_grip |= candidate.charging_grip;
                pair.assign(joycon);
            }
            Err(e) => {
                error!("Failed to bring up {}: {e:}", joycon.name);
                enter(&mut joycon, ConnectionState::Failed);
            }
        }
    }

    if pair.right.is_none() {
        return Err(Error::NoPrimaryController);
    }

    if pair.charging_grip && pair.left.is_none() {
        warn!("Charging grip is missing its left Joy-Con, continuing with the right one only");
    }

    Ok(())
}

/// Take a freshly opened half from `ModeDetected` to `Ready`
pub fn bring_up<H: HidHandle>(
    joycon: &mut Joycon<H>,
    counter: &SequenceCounter,
    policy: &RetryPolicy,
) -> Result<()> {
    if joycon.mode == Mode::Usb {
        enter(joycon, ConnectionState::Handshaking);
        let mut link = Link::new(&mut joycon.handle, joycon.mode, counter, policy);
        usb_handshake(&mut link)?;
    }

    enable_features(&mut Link::new(&mut joycon.handle, joycon.mode, counter, policy))?;
    enter(joycon, ConnectionState::FeaturesEnabled);

    let serial =
        read_serial_number(&mut Link::new(&mut joycon.handle, joycon.mode, counter, policy))?;

    info!("{} serial number: {serial:}", joycon.name);
    joycon.serial_number = Some(serial);
    enter(joycon, ConnectionState::Ready);

    Ok(())
}

/// Bring the serial link up to 3 Mbit and switch it to HID-only talking
pub fn usb_handshake<H: HidHandle>(link: &mut Link<H>) -> Result<()> {
    let reply = link.exchange(GET_MAC)?;
    match reply.get(STATUS_OFFSET) {
        None => {
            return Err(Error::ProtocolTimeout {
                operation: "get_mac",
                address: 0,
                length: 0,
                attempts: 1,
            })
        }
        Some(&STATUS_DISCONNECTED) => {
            return Err(Error::transport("get_mac", "device reports itself disconnected"))
        }
        Some(_) => (),
    }

    if let Some(mac) = reply.get(4..10) {
        let mac = mac
            .iter()
            .rev()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        info!("Found controller with MAC {mac:}");
    }

    for frame in [HANDSHAKE, BAUDRATE_3M, HANDSHAKE, HID_ONLY] {
        link.exchange(frame)?;
    }

    Ok(())
}

/// Enable vibration and IMU, and on Bluetooth switch to full-rate input reports
pub fn enable_features<H: HidHandle>(link: &mut Link<H>) -> Result<()> {
    let mut features = vec![FEATURE_VIBRATION, FEATURE_IMU];
    if link.mode == Mode::Bluetooth {
        features.push(FEATURE_REPORT_RATE);
    }

    for (subcommand, argument) in features {
        link.subcommand(subcommand, &argument)?;
    }

    Ok(())
}

pub fn read_serial_number<H: HidHandle>(link: &mut Link<H>) -> Result<String> {
    let raw = spi_read(link, SERIAL_NUMBER_ADDRESS, SERIAL_NUMBER_LENGTH)?;
    Ok(String::from_utf8_lossy(&raw)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_owned())
}

/// Release one half. Bluetooth devices are told to go back to advertising.
///
/// Never fails; transport errors are logged.
pub fn teardown<H: HidHandle>(joycon: &mut Joycon<H>) {
    if joycon.mode == Mode::Bluetooth {
        match joycon.handle.write(RESUME_BLUETOOTH) {
            Ok(_) => info!("{} resumed Bluetooth advertising", joycon.name),
            Err(e) => warn!("Failed to hand {} back to Bluetooth: {e:}", joycon.name),
        }
    }
    enter(joycon, ConnectionState::Closed);
}

/// Tear down both halves, left first, and drop their handles
pub fn teardown_pair<H: HidHandle>(pair: &mut ControllerPair<H>) {
    for role in [Role::Left, Role::Right] {
        if let Some(joycon) = pair.slot_mut(role).as_mut() {
            teardown(joycon);
        }
    }
    pair.reset();
}
