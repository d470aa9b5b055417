use std::fmt::Display;

use anyhow::anyhow;
use log::debug;
use tokio::sync::mpsc;
use uinput_tokio::{
    device,
    event::{
        absolute::Position,
        controller::{DPad, GamePad},
    },
    Event,
};

use crate::{
    error::{Error, Result},
    input::{Axis, Button},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: u8 },
    /// End of one decoded frame
    Sync,
}

/// Consumer of decoded controller events
pub trait EventSink {
    fn send(&mut self, event: OutputEvent) -> Result<()>;
}

/// Records every event
#[derive(Debug, Default)]
pub struct VecSink {
    pub events: Vec<OutputEvent>,
}

impl EventSink for VecSink {
    fn send(&mut self, event: OutputEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Batches events per frame and hands each batch to an async consumer
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<OutputEvent>>,
    buffer: Vec<OutputEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Vec<OutputEvent>>) -> Self {
        ChannelSink { tx, buffer: vec![] }
    }
}

impl EventSink for ChannelSink {
    /// Must not be called from within an async context
    fn send(&mut self, event: OutputEvent) -> Result<()> {
        self.buffer.push(event);
        if event == OutputEvent::Sync {
            self.tx
                .blocking_send(self.buffer.drain(..).collect())
                .map_err(|_| Error::SinkClosed)?;
        }
        Ok(())
    }
}

pub fn button_event(button: Button) -> Event {
    match button {
        Button::DpadUp => DPad::Up.into(),
        Button::DpadDown => DPad::Down.into(),
        Button::DpadLeft => DPad::Left.into(),
        Button::DpadRight => DPad::Right.into(),
        Button::West => GamePad::West.into(),
        Button::North => GamePad::North.into(),
        Button::East => GamePad::East.into(),
        Button::South => GamePad::South.into(),
        Button::L => GamePad::TL.into(),
        Button::ZL => GamePad::TL2.into(),
        Button::R => GamePad::TR.into(),
        Button::ZR => GamePad::TR2.into(),
        Button::Select => GamePad::Select.into(),
        Button::Start => GamePad::Start.into(),
        Button::Mode => GamePad::Mode.into(),
        Button::Z => GamePad::Z.into(),
        Button::ThumbL => GamePad::ThumbL.into(),
        Button::ThumbR => GamePad::ThumbR.into(),
    }
}

pub fn axis_event(axis: Axis) -> Event {
    match axis {
        Axis::LeftX => Position::X.into(),
        Axis::LeftY => Position::Y.into(),
        Axis::RightX => Position::RX.into(),
        Axis::RightY => Position::RY.into(),
    }
}

const BUTTONS: [Button; 18] = [
    Button::DpadUp,
    Button::DpadDown,
    Button::DpadLeft,
    Button::DpadRight,
    Button::West,
    Button::North,
    Button::East,
    Button::South,
    Button::L,
    Button::ZL,
    Button::R,
    Button::ZR,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::Z,
    Button::ThumbL,
    Button::ThumbR,
];

const AXES: [Axis; 4] = [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY];

/// OS-level virtual gamepad backed by uinput
pub struct VirtualGamepad {
    device: device::Device,
}

impl VirtualGamepad {
    pub async fn new(name: &str, axis_min: i32, axis_max: i32) -> anyhow::Result<Self> {
        debug!("Setting up uinput");
        let mut builder = uinput_tokio::default()
            .map_err(map_uinput_error)?
            .bus(3)
            .vendor(0x1)
            .product(0x1)
            .name(name)
            .map_err(map_uinput_error)?;

        for button in BUTTONS {
            builder = builder
                .event(button_event(button))
                .map_err(uinput_failure("registering button"))?;
        }

        for axis in AXES {
            builder = builder
                .event(axis_event(axis))
                .map_err(uinput_failure("registering axis"))?
                .min(axis_min)
                .max(axis_max)
                .flat(0)
                .fuzz(0);
        }

        debug!("Creating uinput device");
        let device = builder
            .create()
            .await
            .map_err(uinput_failure("creating device"))?;
        Ok(VirtualGamepad { device })
    }

    /// Forward one frame's worth of events
    pub async fn write(&mut self, events: Vec<OutputEvent>) -> anyhow::Result<()> {
        for event in events {
            match event {
                OutputEvent::Button { button, pressed } => {
                    self.device
                        .send(button_event(button), i32::from(pressed))
                        .await
                        .map_err(uinput_failure("writing event"))?;
                }
                OutputEvent::Axis { axis, value } => {
                    self.device
                        .send(axis_event(axis), i32::from(value))
                        .await
                        .map_err(uinput_failure("writing event"))?;
                }
                OutputEvent::Sync => {
                    self.device
                        .synchronize()
                        .await
                        .map_err(uinput_failure("syncing"))?;
                }
            }
        }
        Ok(())
    }
}

fn uinput_failure<E: Display>(action: &'static str) -> impl FnOnce(E) -> anyhow::Error {
    move |e| anyhow!("uinput {action} failed: {e:}")
}

/// Printing `NotFound` through its own Display recurses, so every variant is spelled out
fn map_uinput_error(e: uinput_tokio::Error) -> anyhow::Error {
    match e {
        uinput_tokio::Error::Nix(e) => anyhow!("uinput syscall failed: {e:}"),
        uinput_tokio::Error::Nul(e) => anyhow!("Gamepad name contains a nul byte: {e:}"),
        uinput_tokio::Error::Udev(e) => anyhow!("udev lookup for uinput failed: {e:}"),
        uinput_tokio::Error::IoError(e) => anyhow!("Opening uinput failed: {e:}"),
        uinput_tokio::Error::NotFound => {
            anyhow!("No uinput device node, is the uinput module loaded?")
        }
    }
}
