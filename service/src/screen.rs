//! The host side reconstruction of the device screen.
//!
//! The device only ever sends what changed, so everything drawn so far has to be folded into a
//! persistent state that can be rendered at any moment.

use crate::command::{Character, Color, Command, Rectangle, Waveform};
use std::collections::VecDeque;
use thiserror::Error;

pub const CANVAS_WIDTH: i16 = 320;
pub const CANVAS_HEIGHT: i16 = 240;

/// Characters are placed on a grid of fixed size cells.
pub const CELL_WIDTH: i16 = 8;
pub const CELL_HEIGHT: i16 = 10;

// These match the firmware the mirror was written against. They are larger than the visible
// canvas strictly needs.
pub const COLUMNS: usize = 41;
pub const ROWS: usize = 48;

/// How many rectangles are kept around. The oldest ones are forgotten first.
pub const MAX_RECTANGLES: usize = 1024;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScreenError {
    #[error("character at ({x}, {y}) is outside of the {}x{} grid", COLUMNS, ROWS)]
    CellOutOfBounds { x: i16, y: i16 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screen {
    characters: Vec<Option<Character>>,
    background: Color,
    rectangles: VecDeque<Rectangle>,
    waveform: Option<Waveform>,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    /// Returns a blank, black screen.
    pub fn new() -> Self {
        Self {
            characters: vec![None; COLUMNS * ROWS],
            background: Color::BLACK,
            rectangles: VecDeque::new(),
            waveform: None,
        }
    }

    /// Applies a command and reports whether the screen needs to be redrawn.
    pub fn apply(&mut self, command: &Command) -> Result<bool, ScreenError> {
        match command {
            Command::DrawRectangle(rectangle) => {
                if is_full_canvas(rectangle) {
                    // Paints over everything drawn before it.
                    self.background = rectangle.color;
                    self.rectangles.clear();
                    return Ok(true);
                }
                if self.rectangles.len() == MAX_RECTANGLES {
                    self.rectangles.pop_front();
                }
                self.rectangles.push_back(*rectangle);
                Ok(true)
            }
            Command::DrawCharacter(character) => {
                let index = cell_index(character)?;
                self.characters[index] = Some(*character);
                Ok(true)
            }
            Command::DrawWaveform(waveform) => {
                // The device repeats the waveform even if nothing is playing.
                if self.waveform.as_ref() == Some(waveform) {
                    return Ok(false);
                }
                self.waveform = Some(*waveform);
                Ok(true)
            }
            Command::JoypadState(_) => Ok(false),
        }
    }

    /// The color of the last rectangle that covered the whole canvas.
    pub fn background(&self) -> Color {
        self.background
    }

    /// The rectangles drawn since the background was last set, oldest first.
    pub fn rectangles(&self) -> impl Iterator<Item = &Rectangle> {
        self.rectangles.iter()
    }

    pub fn character(&self, column: usize, row: usize) -> Option<&Character> {
        if column >= COLUMNS || row >= ROWS {
            return None;
        }
        self.characters[row * COLUMNS + column].as_ref()
    }

    /// Iterates over all cells that have been drawn to, row by row.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter().flatten()
    }

    pub fn waveform(&self) -> Option<&Waveform> {
        self.waveform.as_ref()
    }

    /// Returns a copy of the current state that can be handed over to a renderer.
    pub fn snapshot(&self) -> Screen {
        self.clone()
    }
}

fn is_full_canvas(rectangle: &Rectangle) -> bool {
    rectangle.pos.x == 0
        && rectangle.pos.y == 0
        && rectangle.size.width == CANVAS_WIDTH
        && rectangle.size.height == CANVAS_HEIGHT
}

fn cell_index(character: &Character) -> Result<usize, ScreenError> {
    let Character { pos, .. } = character;
    let out_of_bounds = ScreenError::CellOutOfBounds { x: pos.x, y: pos.y };
    if pos.x < 0 || pos.y < 0 {
        return Err(out_of_bounds);
    }
    let column = (pos.x / CELL_WIDTH) as usize;
    let row = (pos.y / CELL_HEIGHT) as usize;
    if column >= COLUMNS || row >= ROWS {
        return Err(out_of_bounds);
    }
    Ok(row * COLUMNS + column)
}
