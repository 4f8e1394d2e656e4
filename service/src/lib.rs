//! A crate that talks to an M8 tracker over its serial link, decodes the display stream and
//! reconstructs the screen it describes.

pub mod command;
mod config;
pub mod screen;
mod service;
pub mod slip;

pub use command::{Color, Command, HostCommand, Keys, Position, Size};
pub use config::Config;
pub use screen::Screen;
pub use service::{open, start, ConnectionState, Service, ServiceError, StatusReport};
