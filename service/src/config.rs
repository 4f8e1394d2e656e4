#[derive(Clone, Debug)]
pub struct Config {
    /// The path to the serial device node the M8 is attached to.
    pub device: String,
    /// The width of the window in pixels.
    pub window_width: u32,
    /// The height of the window in pixels.
    pub window_height: u32,
    /// The maximum number of frames presented per second.
    pub fps: u32,
    /// Should the app go fullscreen?
    pub fullscreen: bool,
    /// How many decoded commands may wait for the renderer before the reader blocks.
    pub queue_capacity: usize,
}
