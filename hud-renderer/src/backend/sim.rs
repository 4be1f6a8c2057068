//! Desktop preview backend.
//!
//! Blits into a private RGB buffer and mirrors it into an SDL window each
//! tick. Key presses are written to stdout as the rotary/button control
//! tokens the producer scripts understand (digits for short presses, the
//! letter row for long presses, arrows for the rotary), so a preview
//! session drives page switches the same way the vehicle controls would.

use std::io::Write;

use anyhow::Result;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::sdl2::Keycode;
use embedded_graphics_simulator::{
    OutputSettingsBuilder,
    SimulatorDisplay,
    SimulatorEvent,
    Window,
};
use hud_core::{DstView, PixelFormat};

use super::{BackendEvent, DisplayBackend};

const SIM_WIDTH: u32 = 800;
const SIM_HEIGHT: u32 = 480;

const SIM_FORMAT: PixelFormat =
    PixelFormat { bpp: 24, r_len: 8, g_len: 8, b_len: 8, r_off: 0, g_off: 8, b_off: 16 };

/// Control token for a key, or None for keys the producer protocol does
/// not know.
fn control_token(key: Keycode) -> Option<&'static str> {
    Some(match key {
        Keycode::Num1 => "muw",
        Keycode::Num2 => "muk",
        Keycode::Num3 => "muc",
        Keycode::Num4 => "mub",
        Keycode::Num5 => "mug",
        Keycode::Num6 => "mur",
        Keycode::Q => "muwl",
        Keycode::W => "mukl",
        Keycode::E => "mucl",
        Keycode::R => "mubl",
        Keycode::T => "mugl",
        Keycode::Y => "murl",
        Keycode::Right => "muu",
        Keycode::Left => "mud",
        Keycode::Down => "muc",
        _ => return None,
    })
}

pub struct SimBackend {
    display: SimulatorDisplay<Rgb888>,
    window: Window,
    buf: Vec<u8>,
}

impl SimBackend {
    pub fn open() -> Self {
        let display = SimulatorDisplay::new(Size::new(SIM_WIDTH, SIM_HEIGHT));
        let output_settings = OutputSettingsBuilder::new().scale(1).build();
        let mut window = Window::new("HUD preview", &output_settings);
        window.update(&display);

        Self {
            display,
            window,
            buf: vec![0; (SIM_WIDTH * SIM_HEIGHT * 3) as usize],
        }
    }
}

impl DisplayBackend for SimBackend {
    fn size(&self) -> (u32, u32) {
        (SIM_WIDTH, SIM_HEIGHT)
    }

    fn format(&self) -> PixelFormat {
        SIM_FORMAT
    }

    fn poll(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        for ev in self.window.events() {
            match ev {
                SimulatorEvent::Quit => events.push(BackendEvent::Quit),
                SimulatorEvent::KeyDown { keycode: Keycode::Escape, .. } => {
                    events.push(BackendEvent::Quit);
                }
                SimulatorEvent::KeyDown { keycode, repeat: false, .. } => {
                    if let Some(token) = control_token(keycode) {
                        // The producer reads these from a pipe.
                        println!("{token}");
                        std::io::stdout().flush().ok();
                    }
                }
                _ => {}
            }
        }
        events
    }

    fn dst(&mut self) -> DstView<'_> {
        DstView::new(&mut self.buf, SIM_WIDTH as usize * 3, SIM_HEIGHT, false)
    }

    fn present(&mut self) -> Result<()> {
        let area = self.display.bounding_box();
        let pixels = self.buf.chunks_exact(3).map(|px| Rgb888::new(px[0], px[1], px[2]));
        self.display.fill_contiguous(&area, pixels).ok();
        self.window.update(&self.display);
        Ok(())
    }
}
