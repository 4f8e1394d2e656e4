//! Commands exchanged with the M8.
//!
//! The device sends the commands described by [`Command`], each in its own SLIP packet. The first
//! byte of a packet is the command tag:
//!
//! | tag  | command        | length   | layout after the tag
//! |------|----------------|----------|---------------------
//! | 0xFB | joypad state   | 2        | key mask
//! | 0xFC | draw waveform  | 4..=324  | r, g, b, up to 320 samples
//! | 0xFD | draw character | 12       | char, i16 x, i16 y, r, g, b, background r, g, b
//! | 0xFE | draw rectangle | 12       | i16 x, i16 y, i16 width, i16 height, r, g, b
//!
//! All integers are little endian. The host talks back with [`HostCommand`]s, which are sent as
//! plain bytes.

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

pub const JOYPAD_STATE: u8 = 0xFB;
pub const DRAW_WAVEFORM: u8 = 0xFC;
pub const DRAW_CHARACTER: u8 = 0xFD;
pub const DRAW_RECTANGLE: u8 = 0xFE;

const JOYPAD_STATE_LEN: usize = 2;
const DRAW_CHARACTER_LEN: usize = 12;
const DRAW_RECTANGLE_LEN: usize = 12;
const DRAW_WAVEFORM_MIN_LEN: usize = 1 + 3;
const DRAW_WAVEFORM_MAX_LEN: usize = 1 + 3 + WAVEFORM_SAMPLES;

/// The number of samples in an oscilloscope waveform. One sample per horizontal pixel.
pub const WAVEFORM_SAMPLES: usize = 320;

/// The length of the longest packet the device sends, a full waveform.
pub const MAX_PACKET_LEN: usize = DRAW_WAVEFORM_MAX_LEN;

/// The highest theme color slot the device accepts.
pub const MAX_THEME_COLOR_INDEX: u8 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: i16,
    pub height: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub pos: Position,
    pub size: Size,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Character {
    pub code: u8,
    pub pos: Position,
    pub foreground: Color,
    pub background: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waveform {
    pub color: Color,
    pub samples: [u8; WAVEFORM_SAMPLES],
}

bitflags! {
    /// The joypad keys, in the order of the device's hardware pins.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Keys: u8 {
        const LEFT = 1 << 7;
        const UP = 1 << 6;
        const DOWN = 1 << 5;
        const SELECT = 1 << 4;
        const START = 1 << 3;
        const RIGHT = 1 << 2;
        const OPT = 1 << 1;
        const EDIT = 1;
    }
}

/// A command sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DrawRectangle(Rectangle),
    DrawCharacter(Character),
    DrawWaveform(Waveform),
    /// Keys pressed on the device itself. Only the hardware M8 sends this.
    JoypadState(Keys),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedLen {
    Exactly(usize),
    Between(usize, usize),
}

impl fmt::Display for ExpectedLen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Exactly(len) => write!(f, "length {}", len),
            Self::Between(min, max) => write!(f, "length between {} and {}", min, max),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid packet: missing command")]
    MissingCommand,
    #[error("invalid {command} packet: expected {expected}, got {actual}")]
    LengthMismatch {
        command: &'static str,
        expected: ExpectedLen,
        actual: usize,
    },
    #[error("unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),
}

impl DecodeError {
    /// Whether the stream is still usable after this error.
    ///
    /// Newer firmware may introduce commands we don't know about, those packets can be skipped.
    /// Anything else means that we lost track of the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownCommand(_))
    }
}

fn read_i16(data: &[u8]) -> i16 {
    i16::from_le_bytes([data[0], data[1]])
}

fn read_position(data: &[u8]) -> Position {
    Position {
        x: read_i16(&data[0..2]),
        y: read_i16(&data[2..4]),
    }
}

fn read_size(data: &[u8]) -> Size {
    Size {
        width: read_i16(&data[0..2]),
        height: read_i16(&data[2..4]),
    }
}

fn read_color(data: &[u8]) -> Color {
    Color::rgb(data[0], data[1], data[2])
}

fn expect_len(command: &'static str, expected: usize, data: &[u8]) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::LengthMismatch {
            command,
            expected: ExpectedLen::Exactly(expected),
            actual: data.len(),
        });
    }
    Ok(())
}

impl Command {
    /// Decodes a single unescaped packet.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let tag = *data.first().ok_or(DecodeError::MissingCommand)?;
        match tag {
            DRAW_CHARACTER => {
                expect_len("draw character", DRAW_CHARACTER_LEN, data)?;
                Ok(Command::DrawCharacter(Character {
                    code: data[1],
                    pos: read_position(&data[2..6]),
                    foreground: read_color(&data[6..9]),
                    background: read_color(&data[9..12]),
                }))
            }
            DRAW_RECTANGLE => {
                expect_len("draw rectangle", DRAW_RECTANGLE_LEN, data)?;
                Ok(Command::DrawRectangle(Rectangle {
                    pos: read_position(&data[1..5]),
                    size: read_size(&data[5..9]),
                    color: read_color(&data[9..12]),
                }))
            }
            DRAW_WAVEFORM => {
                if data.len() < DRAW_WAVEFORM_MIN_LEN || data.len() > DRAW_WAVEFORM_MAX_LEN {
                    return Err(DecodeError::LengthMismatch {
                        command: "draw oscilloscope waveform",
                        expected: ExpectedLen::Between(DRAW_WAVEFORM_MIN_LEN, DRAW_WAVEFORM_MAX_LEN),
                        actual: data.len(),
                    });
                }
                // The device sends no samples at all when the scope is off.
                let mut samples = [0u8; WAVEFORM_SAMPLES];
                let received = &data[DRAW_WAVEFORM_MIN_LEN..];
                samples[..received.len()].copy_from_slice(received);
                Ok(Command::DrawWaveform(Waveform {
                    color: read_color(&data[1..4]),
                    samples,
                }))
            }
            JOYPAD_STATE => {
                expect_len("joypad key pressed state", JOYPAD_STATE_LEN, data)?;
                Ok(Command::JoypadState(Keys::from_bits_retain(data[1])))
            }
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("theme color index {0} is out of range, the last slot is {}", MAX_THEME_COLOR_INDEX)]
    ThemeColorIndex(u8),
}

/// A command sent by the host to the device.
///
/// The mirror itself only sends the controller state and the display commands. Theme colors and
/// key jazz are there for other hosts built on this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// The full set of currently held keys.
    Controller(Keys),
    /// Asks the device to start streaming and to redraw the whole screen.
    EnableAndResetDisplay,
    /// Asks the device to redraw the whole screen.
    ResetDisplay,
    /// Tells the device that the host goes away.
    Disconnect,
    /// Overrides one of the theme colors.
    ThemeColor { index: u8, color: Color },
    /// Plays a note. A zero note stops the playing one.
    KeyJazz { note: u8, velocity: u8 },
}

impl HostCommand {
    /// Appends the wire representation of this command to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match *self {
            Self::Controller(keys) => out.extend_from_slice(&[b'C', keys.bits()]),
            Self::EnableAndResetDisplay => out.extend_from_slice(b"ER"),
            Self::ResetDisplay => out.push(b'R'),
            Self::Disconnect => out.push(b'D'),
            Self::ThemeColor { index, color } => {
                if index > MAX_THEME_COLOR_INDEX {
                    return Err(EncodeError::ThemeColorIndex(index));
                }
                out.extend_from_slice(&[b'S', index, color.r, color.g, color.b]);
            }
            Self::KeyJazz { note: 0, .. } => out.extend_from_slice(&[b'K', 0]),
            Self::KeyJazz { note, velocity } => out.extend_from_slice(&[b'K', note, velocity]),
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(5);
        self.encode_into(&mut out)?;
        Ok(out)
    }
}
