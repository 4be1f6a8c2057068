//! hud-renderer - framebuffer renderer for the shared-memory vehicle HUD
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               20 Hz frame loop              │
//! ├─────────────────────────────────────────────┤
//! │  shared region  →  Compositor (hud-core)    │
//! │                          ↓                  │
//! │            dirty-run blit → backend         │
//! │        (fbdev / plain file / preview)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The producer scripts own the shared widget table; this process only
//! reads it, repaints what changed and writes the dirty runs into the
//! display. VT ownership (when `-v` is given) suspends the loop while
//! another program holds the console.

mod backend;
mod cli;
mod dump;
mod shmmap;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use hud_core::{Compositor, select_spec};
use log::{info, warn};

use crate::backend::{BackendEvent, DisplayBackend};
use crate::cli::{Options, ParsedArgs};
use crate::shmmap::ShmMapping;

/// Frame period: 20 Hz.
const TICK: Duration = Duration::from_millis(50);

/// Interval of the unconditional full repaint, papering over any dirt the
/// change tracking missed and any corruption on the display itself.
const FULL_REFRESH: Duration = Duration::from_secs(20);

fn open_backend(opts: &Options) -> Result<Box<dyn DisplayBackend>> {
    if opts.simulator {
        #[cfg(feature = "simulator")]
        return Ok(Box::new(backend::sim::SimBackend::open()));
        #[cfg(not(feature = "simulator"))]
        return Err(anyhow!("built without the `simulator` feature"));
    }
    Ok(Box::new(backend::fbdev::FbdevBackend::open(opts)?))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match cli::parse_args(&args) {
        Ok(ParsedArgs::Help) => {
            cli::print_help();
            return Ok(());
        }
        Ok(ParsedArgs::Run(opts)) => opts,
        Err(msg) => {
            eprintln!("hud-renderer: {msg}");
            eprintln!("Try 'hud-renderer --help'.");
            std::process::exit(2);
        }
    };

    let mapping = ShmMapping::open(&opts.shm_path)?;
    let region = mapping.region();

    let mut backend = open_backend(&opts)?;
    let (width, height) = backend.size();
    let spec = select_spec(&backend.format()).map_err(|e| anyhow!(e))?;
    info!("display {width}x{height}, blitting as {}", spec.name);

    let mut comp = Compositor::new(width, height);
    let mut suspended = false;
    let mut next_tick = Instant::now() + TICK;
    let mut last_full = Instant::now();

    loop {
        for event in backend.poll() {
            match event {
                BackendEvent::Quit => {
                    info!("shutting down");
                    return Ok(());
                }
                BackendEvent::Suspend => {
                    suspended = true;
                    info!("display released");
                }
                BackendEvent::Resume => {
                    suspended = false;
                    // Whoever had the console scribbled on the framebuffer.
                    comp.mark_all_dirty();
                    last_full = Instant::now();
                    info!("display reacquired");
                }
            }
        }

        if !suspended {
            if last_full.elapsed() >= FULL_REFRESH {
                comp.mark_all_dirty();
                last_full = Instant::now();
            }

            let stats = comp.compose(&region);
            if stats.dump_requested {
                match dump::save_frame(comp.surface()) {
                    Ok(path) => info!("frame dumped to {}", path.display()),
                    Err(err) => warn!("frame dump failed: {err:#}"),
                }
            }

            {
                let mut dst = backend.dst();
                comp.blit_dirty(spec, &mut dst);
            }
            backend.present().context("presenting frame")?;
        }

        // Absolute deadlines: a slow frame shortens the next sleep instead
        // of drifting the whole schedule.
        next_tick += TICK;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }
}
