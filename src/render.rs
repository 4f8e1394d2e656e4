//! Draws the reconstructed screen into an sdl2 window.
//!
//! The canvas uses the device resolution as its logical size and lets sdl2 do the scaling.

use anyhow::anyhow;
use embedded_graphics::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::{Rgb888, RgbColor},
    text::{Baseline, Text},
    Drawable, Pixel,
};
use m8_oxide_service::command::{Character, Rectangle, Waveform};
use m8_oxide_service::screen::{CANVAS_HEIGHT, CANVAS_WIDTH, CELL_HEIGHT, CELL_WIDTH};
use m8_oxide_service::{Color, Screen};
use sdl2::pixels::Color as SdlColor;
use sdl2::rect::{Point as SdlPoint, Rect};
use sdl2::render::Canvas;
use sdl2::video::{FullscreenType, Window};
use sdl2::VideoSubsystem;

fn sdl_color(color: Color) -> SdlColor {
    SdlColor::RGB(color.r, color.g, color.b)
}

/// Lets embedded-graphics rasterize glyphs straight onto the canvas.
struct CanvasTarget<'a>(&'a mut Canvas<Window>);

impl DrawTarget for CanvasTarget<'_> {
    type Color = Rgb888;
    type Error = String;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.0
                .set_draw_color(SdlColor::RGB(color.r(), color.g(), color.b()));
            self.0.draw_point(SdlPoint::new(point.x, point.y))?;
        }
        Ok(())
    }
}

impl OriginDimensions for CanvasTarget<'_> {
    fn size(&self) -> Size {
        Size::new(CANVAS_WIDTH as u32, CANVAS_HEIGHT as u32)
    }
}

pub struct Renderer {
    canvas: Canvas<Window>,
    fullscreen: bool,
}

impl Renderer {
    pub fn new(
        video_subsystem: &VideoSubsystem,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> anyhow::Result<Self> {
        let mut window = video_subsystem
            .window("M8", width, height)
            .position_centered()
            .resizable()
            .build()?;
        if fullscreen {
            window
                .set_fullscreen(FullscreenType::Desktop)
                .map_err(|msg| anyhow!(msg))?;
        }

        let mut canvas = window.into_canvas().build()?;
        canvas.set_logical_size(CANVAS_WIDTH as u32, CANVAS_HEIGHT as u32)?;
        canvas.set_draw_color(SdlColor::RGB(0, 0, 0));
        canvas.clear();
        canvas.present();

        Ok(Self { canvas, fullscreen })
    }

    pub fn toggle_fullscreen(&mut self) -> anyhow::Result<()> {
        self.fullscreen = !self.fullscreen;
        let mode = if self.fullscreen {
            FullscreenType::Desktop
        } else {
            FullscreenType::Off
        };
        self.canvas
            .window_mut()
            .set_fullscreen(mode)
            .map_err(|msg| anyhow!(msg))
    }

    pub fn draw(&mut self, screen: &Screen) -> anyhow::Result<()> {
        self.canvas.set_draw_color(sdl_color(screen.background()));
        self.canvas.clear();

        for rectangle in screen.rectangles() {
            self.draw_rectangle(rectangle)?;
        }
        if let Some(waveform) = screen.waveform() {
            self.draw_waveform(waveform)?;
        }
        for character in screen.characters() {
            self.draw_character(character)?;
        }

        self.canvas.present();
        Ok(())
    }

    fn draw_rectangle(&mut self, rectangle: &Rectangle) -> anyhow::Result<()> {
        let Rectangle { pos, size, color } = *rectangle;
        if size.width <= 0 || size.height <= 0 {
            return Ok(());
        }
        self.canvas.set_draw_color(sdl_color(color));
        self.canvas
            .fill_rect(Rect::new(
                i32::from(pos.x),
                i32::from(pos.y),
                size.width as u32,
                size.height as u32,
            ))
            .map_err(|msg| anyhow!(msg))
    }

    fn draw_waveform(&mut self, waveform: &Waveform) -> anyhow::Result<()> {
        let points: Vec<SdlPoint> = waveform
            .samples
            .iter()
            .enumerate()
            .map(|(x, &y)| SdlPoint::new(x as i32, i32::from(y)))
            .collect();
        self.canvas.set_draw_color(sdl_color(waveform.color));
        self.canvas
            .draw_points(&points[..])
            .map_err(|msg| anyhow!(msg))
    }

    fn draw_character(&mut self, character: &Character) -> anyhow::Result<()> {
        let x = i32::from(character.pos.x);
        let y = i32::from(character.pos.y);

        // Equal colors mark a transparent background.
        if character.background != character.foreground {
            self.canvas.set_draw_color(sdl_color(character.background));
            self.canvas
                .fill_rect(Rect::new(x, y, CELL_WIDTH as u32, CELL_HEIGHT as u32))
                .map_err(|msg| anyhow!(msg))?;
        }
        if character.code == b' ' {
            return Ok(());
        }

        let mut buf = [0u8; 4];
        let text = char::from(character.code).encode_utf8(&mut buf);
        let foreground = character.foreground;
        let style = MonoTextStyle::new(
            &FONT_6X10,
            Rgb888::new(foreground.r, foreground.g, foreground.b),
        );
        Text::with_baseline(text, Point::new(x + 1, y), style, Baseline::Top)
            .draw(&mut CanvasTarget(&mut self.canvas))
            .map_err(|msg| anyhow!(msg))?;
        Ok(())
    }
}
