//! Full input report (0x31) decoding into normalized button and stick state

use crate::{
    error::{Error, Result},
    hid::REPORT_LENGTH,
    sink::OutputEvent,
};

/// Report id marking a full input report
pub const FULL_INPUT_REPORT: u8 = 0x31;

const REPORT_ID_OFFSET: usize = 5;
const BUTTONS_RIGHT_OFFSET: usize = 13;
const BUTTONS_MIDDLE_OFFSET: usize = 14;
const BUTTONS_LEFT_OFFSET: usize = 15;
const STICKS_OFFSET: usize = 16;
const STICKS_LENGTH: usize = 6;

/// Shortest report that still carries every decoded field
pub const MIN_REPORT_LENGTH: usize = STICKS_OFFSET + STICKS_LENGTH;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    /// Y
    West,
    /// X
    North,
    /// A
    East,
    /// B
    South,
    L,
    ZL,
    R,
    ZR,
    /// Minus
    Select,
    /// Plus
    Start,
    /// Home
    Mode,
    /// Capture
    Z,
    ThumbL,
    ThumbR,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// Bit index to button, `None` for bits that carry no button
type BitMap = [Option<Button>; 8];

const LEFT_MAIN: BitMap = [
    Some(Button::DpadDown),
    Some(Button::DpadUp),
    Some(Button::DpadRight),
    Some(Button::DpadLeft),
    None,
    None,
    Some(Button::L),
    Some(Button::ZL),
];

const RIGHT_MAIN: BitMap = [
    Some(Button::West),
    Some(Button::North),
    Some(Button::East),
    Some(Button::South),
    None,
    None,
    Some(Button::R),
    Some(Button::ZR),
];

const LEFT_MIDDLE: BitMap = [
    Some(Button::Select),
    None,
    None,
    Some(Button::ThumbL),
    None,
    Some(Button::Z),
    None,
    None,
];

const RIGHT_MIDDLE: BitMap = [
    None,
    Some(Button::Start),
    Some(Button::ThumbR),
    None,
    Some(Button::Mode),
    None,
    None,
    None,
];

/// Which halves of the report to decode
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sides {
    Left,
    Right,
    Both,
}

impl Sides {
    fn left(self) -> bool {
        matches!(self, Sides::Left | Sides::Both)
    }

    fn right(self) -> bool {
        matches!(self, Sides::Right | Sides::Both)
    }
}

/// Raw report with named accessors over its fixed offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReport([u8; REPORT_LENGTH]);

impl TryFrom<&[u8]> for InputReport {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_REPORT_LENGTH {
            return Err(Error::MalformedReport {
                reason: "report shorter than its stick block",
            });
        }

        let mut report = [0; REPORT_LENGTH];
        let len = bytes.len().min(REPORT_LENGTH);
        report[..len].copy_from_slice(&bytes[..len]);
        Ok(InputReport(report))
    }
}

impl InputReport {
    pub fn report_id(&self) -> u8 {
        self.0[REPORT_ID_OFFSET]
    }

    pub fn is_full(&self) -> bool {
        self.report_id() == FULL_INPUT_REPORT
    }

    pub fn buttons_right(&self) -> u8 {
        self.0[BUTTONS_RIGHT_OFFSET]
    }

    pub fn buttons_middle(&self) -> u8 {
        self.0[BUTTONS_MIDDLE_OFFSET]
    }

    pub fn buttons_left(&self) -> u8 {
        self.0[BUTTONS_LEFT_OFFSET]
    }

    pub fn left_stick(&self) -> [u8; 3] {
        [
            self.0[STICKS_OFFSET],
            self.0[STICKS_OFFSET + 1],
            self.0[STICKS_OFFSET + 2],
        ]
    }

    pub fn right_stick(&self) -> [u8; 3] {
        [
            self.0[STICKS_OFFSET + 3],
            self.0[STICKS_OFFSET + 4],
            self.0[STICKS_OFFSET + 5],
        ]
    }
}

/// Stick position on the 0-255 axis range, Y pointing up
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Stick {
    pub x: u8,
    pub y: u8,
}

impl Stick {
    /// X takes the nibbles straddling bytes 0 and 1; Y is byte 2 flipped as `256 - raw`.
    ///
    /// A raw Y of 0 would give 256, which is clamped to 255.
    pub fn decode([b0, b1, b2]: [u8; 3]) -> Self {
        let x = ((b1 & 0x0f) << 4) | ((b0 & 0xf0) >> 4);
        let y = (256 - u16::from(b2)).min(255) as u8;
        Stick { x, y }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideState {
    /// Every mapped button, pressed or not
    pub buttons: Vec<(Button, bool)>,
    pub stick: Stick,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedState {
    pub left: Option<SideState>,
    pub right: Option<SideState>,
}

fn map_bits(bits: u8, map: &BitMap, out: &mut Vec<(Button, bool)>) {
    out.extend(
        map.iter()
            .enumerate()
            .filter_map(|(i, button)| button.map(|button| (button, bits & (1 << i) != 0))),
    );
}

/// Decode the requested halves of a report.
///
/// Anything other than a full input report yields `None`.
pub fn decode(report: &InputReport, sides: Sides) -> Option<NormalizedState> {
    if !report.is_full() {
        return None;
    }

    let mut state = NormalizedState::default();

    if sides.left() {
        let mut buttons = vec![];
        map_bits(report.buttons_left(), &LEFT_MAIN, &mut buttons);
        map_bits(report.buttons_middle(), &LEFT_MIDDLE, &mut buttons);
        state.left = Some(SideState {
            buttons,
            stick: Stick::decode(report.left_stick()),
        });
    }

    if sides.right() {
        let mut buttons = vec![];
        map_bits(report.buttons_right(), &RIGHT_MAIN, &mut buttons);
        map_bits(report.buttons_middle(), &RIGHT_MIDDLE, &mut buttons);
        state.right = Some(SideState {
            buttons,
            stick: Stick::decode(report.right_stick()),
        });
    }

    Some(state)
}

/// Decode raw bytes, treating short or foreign reports as background traffic
pub fn decode_bytes(bytes: &[u8], sides: Sides) -> Option<NormalizedState> {
    InputReport::try_from(bytes)
        .ok()
        .and_then(|report| decode(&report, sides))
}

impl NormalizedState {
    /// Flatten into sink events, buttons before axes, left before right
    pub fn events(&self) -> Vec<OutputEvent> {
        let mut events = vec![];

        for (side, (axis_x, axis_y)) in [
            (&self.left, (Axis::LeftX, Axis::LeftY)),
            (&self.right, (Axis::RightX, Axis::RightY)),
        ] {
            if let Some(side) = side {
                events.extend(
                    side.buttons
                        .iter()
                        .map(|&(button, pressed)| OutputEvent::Button { button, pressed }),
                );
                events.push(OutputEvent::Axis {
                    axis: axis_x,
                    value: side.stick.x,
                });
                events.push(OutputEvent::Axis {
                    axis: axis_y,
                    value: side.stick.y,
                });
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn report() -> [u8; REPORT_LENGTH] {
        let mut bytes = [0; REPORT_LENGTH];
        bytes[REPORT_ID_OFFSET] = FULL_INPUT_REPORT;
        bytes
    }

    #[test]
    fn stick_extremes() {
        assert_eq!(Stick::decode([0xf0, 0x0f, 0x00]), Stick { x: 255, y: 255 });
        assert_eq!(Stick::decode([0x00, 0x00, 0xff]), Stick { x: 0, y: 1 });
        assert_eq!(Stick::decode([0x80, 0x07, 0x80]), Stick { x: 0x78, y: 128 });
    }

    proptest! {
        #[test]
        fn stick_decode_takes_nibbles_and_flips_y(
            b0 in any::<u8>(),
            b1 in any::<u8>(),
            b2 in any::<u8>()
        ) {
            let stick = Stick::decode([b0, b1, b2]);
            prop_assert_eq!(u16::from(stick.x), u16::from(b1 & 0x0f) * 16 + u16::from(b0 >> 4));
            prop_assert!(stick.y >= 1);
            if b2 == 0 {
                prop_assert_eq!(stick.y, 255);
            } else {
                prop_assert_eq!(u16::from(stick.y), 256 - u16::from(b2));
            }
        }
    }

    #[test]
    fn other_report_ids_are_ignored() {
        let mut bytes = report();
        bytes[REPORT_ID_OFFSET] = 0x21;
        assert_eq!(decode_bytes(&bytes, Sides::Both), None);
    }

    #[test]
    fn short_reports_are_malformed() {
        assert!(matches!(
            InputReport::try_from(&report()[..MIN_REPORT_LENGTH - 1]),
            Err(Error::MalformedReport { .. })
        ));
        assert!(InputReport::try_from(&report()[..MIN_REPORT_LENGTH]).is_ok());
    }

    #[test]
    fn decodes_only_requested_sides() {
        let bytes = report();
        let left = decode_bytes(&bytes, Sides::Left).unwrap();
        assert!(left.left.is_some() && left.right.is_none());

        let right = decode_bytes(&bytes, Sides::Right).unwrap();
        assert!(right.left.is_none() && right.right.is_some());
    }

    #[test]
    fn unmapped_bits_produce_no_buttons() {
        let state = decode_bytes(&report(), Sides::Both).unwrap();
        // 6 main + 3 middle per side
        assert_eq!(state.left.unwrap().buttons.len(), 9);
        assert_eq!(state.right.unwrap().buttons.len(), 9);
    }

    #[test]
    fn button_bits_map_to_buttons() {
        let mut bytes = report();
        bytes[BUTTONS_LEFT_OFFSET] = 0b1000_0010;
        bytes[BUTTONS_RIGHT_OFFSET] = 0b0000_1000;
        bytes[BUTTONS_MIDDLE_OFFSET] = 0b0001_0001;

        let state = decode_bytes(&bytes, Sides::Both).unwrap();
        let pressed = |side: Option<SideState>| {
            side.unwrap()
                .buttons
                .into_iter()
                .filter(|(_, pressed)| *pressed)
                .map(|(button, _)| button)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            pressed(state.left.clone()),
            [Button::DpadUp, Button::ZL, Button::Select]
        );
        assert_eq!(pressed(state.right), [Button::South, Button::Mode]);
    }

    #[test]
    fn sticks_read_from_their_own_block() {
        let mut bytes = report();
        bytes[STICKS_OFFSET..STICKS_OFFSET + 6].copy_from_slice(&[0xf0, 0x0f, 0xff, 0x00, 0x00, 0x01]);

        let state = decode_bytes(&bytes, Sides::Both).unwrap();
        assert_eq!(state.left.unwrap().stick, Stick { x: 255, y: 1 });
        assert_eq!(state.right.unwrap().stick, Stick { x: 0, y: 255 });
    }

    #[test]
    fn events_follow_state() {
        let state = decode_bytes(&report(), Sides::Right).unwrap();
        let events = state.events();
        assert_eq!(events.len(), 9 + 2);
        assert_eq!(
            events[9..],
            [
                OutputEvent::Axis {
                    axis: Axis::RightX,
                    value: 0
                },
                OutputEvent::Axis {
                    axis: Axis::RightY,
                    value: 255
                },
            ]
        );
    }
}
