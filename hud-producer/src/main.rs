//! hud-producer - demo widget-table producer
//!
//! Stands in for the vehicle data scripts: publishes a small dashboard
//! (speed, RPM, coolant) into the shared region and updates the readouts
//! at 2 Hz with deterministic waveforms. A "CHECK ENGINE" widget is gated
//! on visibility bit 0 and raised whenever the simulated coolant runs hot,
//! exercising the renderer's partial-repaint paths end to end.

mod writer;

use std::ffi::CString;
use std::io;
use std::ptr;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hud_core::{SHM_SIZE, VIS_DUMP_FRAME};
use log::info;

use crate::writer::{ShmWriter, WidgetDef, write_table};

/// Update period of the demo readouts.
const TICK: Duration = Duration::from_millis(500);

const WHITE: u32 = 0xFFFFFF;
const GREY: u32 = 0x808080;
const RED: u32 = 0xE00000;

const ALIGN_RIGHT: u32 = 1;

/// Warning widgets share visibility bit 0.
const VIS_WARNING: u32 = 1;

fn demo_table() -> Vec<WidgetDef> {
    let label = |x, y, text| WidgetDef {
        fg: GREY,
        x,
        y,
        w: 200,
        h: 30,
        text_size: 16,
        text_cap: 16,
        text,
        ..WidgetDef::default()
    };
    let value = |x, y| WidgetDef {
        flags: ALIGN_RIGHT,
        fg: WHITE,
        x,
        y,
        w: 180,
        h: 60,
        yo: 50,
        text_size: 40,
        text_cap: 8,
        text: "0",
        ..WidgetDef::default()
    };

    vec![
        label(40, 60, "SPEED km/h"),
        value(40, 100),
        label(320, 60, "RPM"),
        value(320, 100),
        label(600, 60, "COOLANT \u{b0}C"),
        value(600, 100),
        WidgetDef {
            vis_group: VIS_WARNING,
            vis_mask: VIS_WARNING,
            fg: WHITE,
            bg: RED,
            x: 250,
            y: 380,
            w: 300,
            h: 60,
            xo: 40,
            yo: 40,
            text_size: 24,
            text_cap: 16,
            text: "CHECK ENGINE",
            ..WidgetDef::default()
        },
    ]
}

// Slot positions of the updatable readouts in demo_table().
const SLOT_SPEED: usize = 1;
const SLOT_RPM: usize = 3;
const SLOT_COOLANT: usize = 5;

fn open_region(path: &str) -> Result<ShmWriter> {
    let cpath = CString::new(path).context("shared file path contains NUL")?;
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o644) };
    if fd < 0 {
        return Err(io::Error::last_os_error()).with_context(|| format!("creating {path}"));
    }
    if unsafe { libc::ftruncate(fd, SHM_SIZE as libc::off_t) } != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        bail!("sizing {path}: {err}");
    }

    let mem = unsafe {
        libc::mmap(
            ptr::null_mut(),
            SHM_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    let mmap_err = io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if mem == libc::MAP_FAILED {
        bail!("mapping {path}: {mmap_err}");
    }

    // The mapping is leaked on purpose: it lives until process exit.
    Ok(unsafe { ShmWriter::from_raw(mem as *mut u8, SHM_SIZE) })
}

fn print_help() {
    println!(
        r#"hud-producer {} - demo widget-table producer

USAGE:
    hud-producer [OPTIONS]

OPTIONS:
    -h, --help    Print this help message
    -s <PATH>     Shared widget-table file [default: /dev/shm/hud]
    -d            Request one PNG frame dump from the renderer
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut shm_path = "/dev/shm/hud".to_owned();
    let mut dump = false;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-s" => match it.next() {
                Some(path) => shm_path = path.clone(),
                None => bail!("-s requires a value"),
            },
            "-d" => dump = true,
            other => bail!("unknown argument: {other}"),
        }
    }

    let mut shm = open_region(&shm_path)?;
    let slots = write_table(&mut shm, &demo_table());
    info!("published {} widgets to {shm_path}", slots.len());

    let mut tick = 0u64;
    loop {
        // Deterministic waveforms, so captures are reproducible.
        let speed = (tick * 7) % 240;
        let rpm = 800 + (tick * 430) % 6200;
        let coolant = 70 + (tick % 60);

        shm.update_text(&slots[SLOT_SPEED], &speed.to_string());
        shm.update_text(&slots[SLOT_RPM], &rpm.to_string());
        shm.update_text(&slots[SLOT_COOLANT], &coolant.to_string());

        let mut visibility = if coolant > 110 { VIS_WARNING } else { 0 };
        if dump && tick == 4 {
            // The renderer captures every tick it sees the bit, so it is
            // held for one update period only.
            visibility |= VIS_DUMP_FRAME;
            info!("requesting frame dump");
        }
        shm.set_visibility(visibility);

        tick += 1;
        thread::sleep(TICK);
    }
}
