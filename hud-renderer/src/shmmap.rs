//! Read-only mapping of the producer's shared widget table.

use std::ffi::CString;
use std::io;
use std::ptr;

use anyhow::{Context, Result, bail};
use hud_core::{SHM_SIZE, SharedRegion};

/// An mmap'd view of the shared file. The producer owns the file and every
/// byte in it; this side never writes.
pub struct ShmMapping {
    ptr: *mut libc::c_void,
    len: usize,
}

impl ShmMapping {
    pub fn open(path: &str) -> Result<Self> {
        let cpath = CString::new(path).context("shared file path contains NUL")?;

        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("opening {path} (is the producer running?)"));
        }

        let ptr = unsafe {
            libc::mmap(ptr::null_mut(), SHM_SIZE, libc::PROT_READ, libc::MAP_SHARED, fd, 0)
        };
        let mmap_err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            bail!("mapping {path}: {mmap_err}");
        }

        Ok(Self { ptr, len: SHM_SIZE })
    }

    pub fn region(&self) -> SharedRegion {
        // The mapping outlives every use of the region: both live until the
        // end of main.
        unsafe { SharedRegion::from_raw(self.ptr as *const u8, self.len) }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr, self.len) };
    }
}
