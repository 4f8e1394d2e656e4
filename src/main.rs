use anyhow::anyhow;
use input::Action;
use log::{debug, info, warn};
use m8_oxide_service::{Command, HostCommand, Screen};
use std::thread;
use std::time::{Duration, Instant};

mod config;
mod input;
mod render;

// The device node has to be in raw mode, e.g.
//
//    stty -F /dev/ttyACM0 raw
//

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = config::obtain();
    debug!("{:?}", config);

    let sdl_context = sdl2::init().map_err(|msg| anyhow!(msg))?;
    let video_subsystem = sdl_context.video().map_err(|msg| anyhow!(msg))?;
    let mut renderer = render::Renderer::new(
        &video_subsystem,
        config.window_width,
        config.window_height,
        config.fullscreen,
    )?;
    let mut event_pump = sdl_context.event_pump().map_err(|msg| anyhow!(msg))?;

    let mut service = m8_oxide_service::open(&config)?;
    let mut screen = Screen::new();
    let mut input = input::Input::new();

    let frame_time = Duration::from_secs(1) / config.fps;
    let mut last_render: Option<Instant> = None;
    // A change that arrived too early for the frame rate is drawn with the next frame.
    let mut render_pending = true;
    let mut frames = 0u32;
    let mut fps_reported_at = Instant::now();

    'running: loop {
        for event in event_pump.poll_iter() {
            match input.handle(&event) {
                Some(Action::Quit) => break 'running,
                Some(Action::ToggleFullscreen) => {
                    renderer.toggle_fullscreen()?;
                    service.send(&HostCommand::ResetDisplay)?;
                }
                Some(Action::Controller(keys)) => service.send(&HostCommand::Controller(keys))?,
                None => {}
            }
        }

        while let Some(command) = service.poll() {
            if let Command::JoypadState(keys) = command {
                debug!("device keys: {:?}", keys);
            }
            match screen.apply(&command) {
                Ok(changed) => render_pending |= changed,
                Err(err) => warn!("Dropping {:?}: {}", command, err),
            }
        }
        if service.is_finished() {
            info!("The stream is over: {:?}", service.status_report());
            break 'running;
        }

        let due = last_render.map_or(true, |at| at.elapsed() >= frame_time);
        if render_pending && due {
            renderer.draw(&screen.snapshot())?;
            render_pending = false;
            last_render = Some(Instant::now());
            frames += 1;
        }

        if fps_reported_at.elapsed() >= Duration::from_secs(1) {
            debug!("FPS: {}", frames);
            frames = 0;
            fps_reported_at = Instant::now();
        }

        thread::sleep(Duration::from_millis(1));
    }

    info!("Quit");
    service.disconnect()?;
    Ok(())
}
