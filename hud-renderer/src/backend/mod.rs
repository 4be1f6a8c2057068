//! Display backends.
//!
//! A backend owns the destination pixels and whatever platform machinery
//! comes with them (framebuffer mapping, VT ownership, preview window).
//! The frame loop talks to it through [`DisplayBackend`] only.

use hud_core::{DstView, PixelFormat};

pub mod fbdev;
#[cfg(feature = "simulator")]
pub mod sim;

/// Events a backend surfaces to the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The display was taken away (VT switch); stop touching it.
    Suspend,
    /// The display is ours again; repaint everything.
    Resume,
    /// Shut down cleanly.
    Quit,
}

pub trait DisplayBackend {
    /// Visible resolution in pixels.
    fn size(&self) -> (u32, u32);

    /// Physical pixel layout of the destination.
    fn format(&self) -> PixelFormat;

    /// Drain pending platform events. Called once per tick.
    fn poll(&mut self) -> Vec<BackendEvent>;

    /// Destination pixels for this tick's blit.
    fn dst(&mut self) -> DstView<'_>;

    /// Push the blitted frame out, where the platform needs a push at all.
    fn present(&mut self) -> anyhow::Result<()>;
}
