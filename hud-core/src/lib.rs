//! Core compositor for the shared-memory vehicle HUD.
//!
//! A producer process (the vehicle data scripts) maintains a widget table
//! in a small shared-memory region; this crate is the consumer side. It
//! takes consistency-checked snapshots of that table, tracks which 16x16
//! screen tiles changed each tick, repaints only the dirty runs into an
//! internal surface and converts them into whatever pixel format the
//! destination display reports.
//!
//! Platform concerns — mapping the region, owning a framebuffer or a
//! simulator window, the 20 Hz tick — live in the renderer binary. This
//! crate has no OS dependencies and every stage is testable against an
//! in-memory region.
//!
//! # Pipeline
//!
//! ```text
//! shared region --(snapshot)--> widget table copy
//!                                  |  change detection
//!                                  v
//!                            dirty tile bitmap
//!                                  |  runs
//!                                  v
//!                  paint (embedded-graphics) --> surface --> blit --> display
//! ```

pub mod blit;
pub mod compositor;
pub mod dirty;
pub mod render;
pub mod shm;
pub mod snapshot;
pub mod surface;
pub mod tile;
pub mod widget;

#[cfg(test)]
mod testutil;

pub use blit::{BlitError, BlitSpec, DstView, PixelFormat, select_spec};
pub use compositor::{Compositor, FrameStats};
pub use shm::{SHM_SIZE, SharedRegion};
pub use surface::Surface;
pub use widget::VIS_DUMP_FRAME;
