use m8_oxide_service::Config;
use std::env;
use std::str::FromStr;

fn default_config() -> Config {
    // The defaults are selected in such a way that a device plugged into a typical linux box
    // works without any settings.
    Config {
        device: "/dev/ttyACM0".to_string(),
        window_width: 640,
        window_height: 480,
        fps: 30,
        fullscreen: false,
        queue_capacity: 1024,
    }
}

fn device() -> Option<String> {
    env::var("M8_DEVICE").ok()
}

fn is_positive_answer(var_text: &str) -> bool {
    match var_text {
        "0" | "false" | "no" | "n" => false,
        _ => true,
    }
}

fn flag(name: &str) -> Option<bool> {
    let mut var = env::var(name).ok()?;
    var.make_ascii_lowercase();
    Some(is_positive_answer(&var))
}

fn number<T: FromStr>(name: &str) -> Option<T> {
    let var = env::var(name).ok()?;
    match parse_number(&var) {
        Some(value) => Some(value),
        None => {
            log::warn!("Ignoring {}={:?}, expected a positive number", name, var);
            None
        }
    }
}

fn parse_number<T: FromStr>(var_text: &str) -> Option<T> {
    var_text.trim().parse().ok()
}

/// Read the config.
pub fn obtain() -> Config {
    // First, make sure that we've loaded configuration from the .env file.
    let _ = dotenv::dotenv();

    // Read the config or use the defaults.
    let defaults = default_config();
    Config {
        device: device().unwrap_or(defaults.device),
        window_width: number("WINDOW_WIDTH").unwrap_or(defaults.window_width),
        window_height: number("WINDOW_HEIGHT").unwrap_or(defaults.window_height),
        fps: number::<u32>("FPS")
            .filter(|&fps| fps > 0)
            .unwrap_or(defaults.fps),
        fullscreen: flag("FULLSCREEN").unwrap_or(defaults.fullscreen),
        queue_capacity: number("QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
    }
}
