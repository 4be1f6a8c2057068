//! Linux framebuffer backend.
//!
//! Maps the fbdev device and blits straight into it, with optional VT
//! ownership: when a VT number is given, the kernel is asked to route VT
//! switches through SIGUSR1/SIGUSR2 so the renderer can stop touching the
//! framebuffer while another program (getty, X) holds the console, and
//! repaint everything when it comes back.
//!
//! `--fb-file` swaps the device for a plain file with a fixed 800x480 RGB
//! layout. Same code path, no hardware; headless test rigs read the file.

use std::ffi::CString;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use hud_core::{DstView, PixelFormat};
use log::{debug, info};

use super::{BackendEvent, DisplayBackend};
use crate::cli::Options;

// --- fbdev ioctl interface (linux/fb.h) ---

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

// Full kernel struct; only the geometry and color fields are read.
#[allow(dead_code)]
#[repr(C)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[allow(dead_code)]
#[repr(C)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

// --- VT ioctl interface (linux/vt.h) ---

const VT_GETMODE: libc::c_ulong = 0x5601;
const VT_SETMODE: libc::c_ulong = 0x5602;
const VT_RELDISP: libc::c_ulong = 0x5605;
const VT_ACTIVATE: libc::c_ulong = 0x5606;

const VT_AUTO: libc::c_char = 0;
const VT_PROCESS: libc::c_char = 1;
const VT_ACKACQ: libc::c_long = 2;

#[allow(dead_code)]
#[repr(C)]
struct VtMode {
    mode: libc::c_char,
    waitv: libc::c_char,
    relsig: libc::c_short,
    acqsig: libc::c_short,
    frsig: libc::c_short,
}

// Set from the signal handlers, drained by poll(). One renderer process,
// one VT: plain flags are enough.
static RELEASE_REQ: AtomicBool = AtomicBool::new(false);
static ACQUIRE_REQ: AtomicBool = AtomicBool::new(false);
static QUIT_REQ: AtomicBool = AtomicBool::new(false);

extern "C" fn on_release(_sig: libc::c_int) {
    RELEASE_REQ.store(true, Ordering::SeqCst);
}

extern "C" fn on_acquire(_sig: libc::c_int) {
    ACQUIRE_REQ.store(true, Ordering::SeqCst);
}

extern "C" fn on_quit(_sig: libc::c_int) {
    QUIT_REQ.store(true, Ordering::SeqCst);
}

/// Route SIGINT/SIGTERM through the event loop so Drop runs: the VT must
/// be handed back to the kernel and the mapping released on the way out.
fn install_quit_handlers() -> Result<()> {
    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_sigaction = on_quit as usize;
        if libc::sigaction(libc::SIGINT, &sa, ptr::null_mut()) != 0
            || libc::sigaction(libc::SIGTERM, &sa, ptr::null_mut()) != 0
        {
            return Err(last_err("installing termination handlers"));
        }
    }
    Ok(())
}

fn last_err(what: &str) -> anyhow::Error {
    anyhow::anyhow!("{what}: {}", io::Error::last_os_error())
}

/// Open file descriptor for the owned VT, with the kernel switched into
/// process-controlled mode. Dropping it hands VT switching back to the
/// kernel.
struct VtGuard {
    fd: libc::c_int,
}

impl VtGuard {
    fn acquire(vtno: i32) -> Result<Self> {
        let path = CString::new(format!("/dev/tty{vtno}")).context("VT path")?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(last_err(&format!("opening /dev/tty{vtno}")));
        }
        let guard = Self { fd };

        unsafe {
            let mut sa: libc::sigaction = mem::zeroed();
            libc::sigemptyset(&mut sa.sa_mask);
            sa.sa_sigaction = on_release as usize;
            if libc::sigaction(libc::SIGUSR1, &sa, ptr::null_mut()) != 0 {
                return Err(last_err("installing SIGUSR1 handler"));
            }
            sa.sa_sigaction = on_acquire as usize;
            if libc::sigaction(libc::SIGUSR2, &sa, ptr::null_mut()) != 0 {
                return Err(last_err("installing SIGUSR2 handler"));
            }
        }

        let mut mode: VtMode = unsafe { mem::zeroed() };
        if unsafe { libc::ioctl(fd, VT_GETMODE, &mut mode) } != 0 {
            return Err(last_err("VT_GETMODE"));
        }
        mode.mode = VT_PROCESS;
        mode.relsig = libc::SIGUSR1 as libc::c_short;
        mode.acqsig = libc::SIGUSR2 as libc::c_short;
        if unsafe { libc::ioctl(fd, VT_SETMODE, &mode) } != 0 {
            return Err(last_err("VT_SETMODE"));
        }
        if unsafe { libc::ioctl(fd, VT_ACTIVATE, vtno as libc::c_long) } != 0 {
            return Err(last_err("VT_ACTIVATE"));
        }

        info!("owning VT {vtno}");
        Ok(guard)
    }

    fn ack_release(&self) {
        unsafe { libc::ioctl(self.fd, VT_RELDISP, 1 as libc::c_long) };
    }

    fn ack_acquire(&self) {
        unsafe { libc::ioctl(self.fd, VT_RELDISP, VT_ACKACQ) };
    }
}

impl Drop for VtGuard {
    fn drop(&mut self) {
        let mut mode: VtMode = unsafe { mem::zeroed() };
        mode.mode = VT_AUTO;
        unsafe {
            libc::ioctl(self.fd, VT_SETMODE, &mode);
            libc::close(self.fd);
        }
    }
}

// --- the backend proper ---

/// Dimensions of the `--fb-file` layout.
const FILE_FB_WIDTH: u32 = 800;
const FILE_FB_HEIGHT: u32 = 480;

const FILE_FB_FORMAT: PixelFormat =
    PixelFormat { bpp: 24, r_len: 8, g_len: 8, b_len: 8, r_off: 0, g_off: 8, b_off: 16 };

pub struct FbdevBackend {
    mem: *mut u8,
    map_len: usize,
    stride: usize,
    width: u32,
    height: u32,
    format: PixelFormat,
    flip: bool,
    vt: Option<VtGuard>,
}

impl FbdevBackend {
    pub fn open(opts: &Options) -> Result<Self> {
        install_quit_handlers()?;
        if opts.fb_file {
            Self::open_file(&opts.fb_path, opts.flip)
        } else {
            Self::open_device(opts)
        }
    }

    fn open_device(opts: &Options) -> Result<Self> {
        let cpath = CString::new(opts.fb_path.as_str()).context("framebuffer path")?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(last_err(&format!("opening {}", opts.fb_path)));
        }

        let mut var: FbVarScreeninfo = unsafe { mem::zeroed() };
        let mut fix: FbFixScreeninfo = unsafe { mem::zeroed() };
        let var_ok = unsafe { libc::ioctl(fd, FBIOGET_VSCREENINFO, &mut var) } == 0;
        let fix_ok = unsafe { libc::ioctl(fd, FBIOGET_FSCREENINFO, &mut fix) } == 0;
        if !var_ok || !fix_ok {
            let err = last_err("querying framebuffer geometry");
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let map_len = fix.smem_len as usize;
        let stride = fix.line_length as usize;
        if map_len < stride * var.yres as usize {
            unsafe { libc::close(fd) };
            bail!(
                "framebuffer advertises {map_len} bytes for {} rows of {stride}",
                var.yres
            );
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        let mmap_err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            bail!("mapping {}: {mmap_err}", opts.fb_path);
        }

        let format = PixelFormat {
            bpp: var.bits_per_pixel,
            r_len: var.red.length,
            g_len: var.green.length,
            b_len: var.blue.length,
            r_off: var.red.offset,
            g_off: var.green.offset,
            b_off: var.blue.offset,
        };
        debug!(
            "{}: {}x{} {}bpp, stride {stride}",
            opts.fb_path, var.xres, var.yres, var.bits_per_pixel
        );

        let vt = match opts.vt {
            Some(vtno) => Some(VtGuard::acquire(vtno)?),
            None => None,
        };

        Ok(Self {
            mem: mem as *mut u8,
            map_len,
            stride,
            width: var.xres,
            height: var.yres,
            format,
            flip: opts.flip,
            vt,
        })
    }

    fn open_file(path: &str, flip: bool) -> Result<Self> {
        let cpath = CString::new(path).context("framebuffer file path")?;
        let stride = FILE_FB_WIDTH as usize * 3;
        let map_len = stride * FILE_FB_HEIGHT as usize;

        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o644) };
        if fd < 0 {
            return Err(last_err(&format!("creating {path}")));
        }
        if unsafe { libc::ftruncate(fd, map_len as libc::off_t) } != 0 {
            let err = last_err(&format!("sizing {path}"));
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
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

        info!("file framebuffer at {path}: {FILE_FB_WIDTH}x{FILE_FB_HEIGHT} rgb24");
        Ok(Self {
            mem: mem as *mut u8,
            map_len,
            stride,
            width: FILE_FB_WIDTH,
            height: FILE_FB_HEIGHT,
            format: FILE_FB_FORMAT,
            flip,
            vt: None,
        })
    }
}

impl DisplayBackend for FbdevBackend {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn poll(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        if QUIT_REQ.swap(false, Ordering::SeqCst) {
            events.push(BackendEvent::Quit);
        }
        if let Some(vt) = &self.vt {
            if RELEASE_REQ.swap(false, Ordering::SeqCst) {
                vt.ack_release();
                events.push(BackendEvent::Suspend);
            }
            if ACQUIRE_REQ.swap(false, Ordering::SeqCst) {
                vt.ack_acquire();
                events.push(BackendEvent::Resume);
            }
        }
        events
    }

    fn dst(&mut self) -> DstView<'_> {
        // The mapping is private to this backend and lives until Drop.
        let buf = unsafe { core::slice::from_raw_parts_mut(self.mem, self.map_len) };
        DstView::new(buf, self.stride, self.height, self.flip)
    }

    fn present(&mut self) -> Result<()> {
        // Writes hit the framebuffer directly.
        Ok(())
    }
}

impl Drop for FbdevBackend {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.map_len) };
    }
}
