//! Test-only builder for producer-side shared regions.
//!
//! Writes the [`crate::shm`] byte layout the way the real producer does,
//! over an 8-byte-aligned backing buffer, so the consumer-side view can be
//! exercised without a live shared mapping. Writes are volatile for the
//! concurrency tests that race a writer thread against the snapshot
//! reader.

use core::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::shm::{
    H_NUM_WIDGETS,
    H_VERSION,
    H_VISIBILITY,
    HEADER_SIZE,
    SHM_SIZE,
    SharedRegion,
    W_BG,
    W_FG,
    W_FLAGS,
    W_FONT,
    W_H,
    W_KIND,
    W_STRIKE,
    W_TEXT_LEN,
    W_TEXT_SIZE,
    W_VERSION,
    W_VIS_GROUP,
    W_VIS_MASK,
    W_W,
    W_X,
    W_XSCALE,
    W_Y,
    WIDGET_STRIDE,
};

pub struct RegionBuilder {
    // u64 backing keeps the base 8-byte aligned.
    buf: Vec<u64>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self { buf: vec![0; SHM_SIZE / 8] }
    }

    pub fn new_shared() -> SharedBuilder {
        SharedBuilder(Arc::new(Mutex::new(Self::new())))
    }

    fn base(&mut self) -> *mut u8 {
        self.buf.as_mut_ptr() as *mut u8
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        assert!(offset + 4 <= SHM_SIZE);
        unsafe { ptr::write_volatile(self.base().add(offset) as *mut u32, value) };
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        assert!(offset + 2 <= SHM_SIZE);
        unsafe { ptr::write_volatile(self.base().add(offset) as *mut u16, value) };
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        assert!(offset < SHM_SIZE);
        unsafe { ptr::write_volatile(self.base().add(offset), value) };
    }

    pub fn write_f64(&mut self, offset: usize, value: f64) {
        assert!(offset + 8 <= SHM_SIZE);
        unsafe { ptr::write_unaligned(self.base().add(offset) as *mut f64, value) };
    }

    pub fn header(&mut self, version: u32, num_widgets: u32, visibility: u32) {
        self.write_u32(H_VERSION, version);
        self.write_u32(H_NUM_WIDGETS, num_widgets);
        self.write_u32(H_VISIBILITY, visibility);
    }

    pub fn set_visibility(&mut self, visibility: u32) {
        self.write_u32(H_VISIBILITY, visibility);
    }

    pub fn bump_version(&mut self) {
        let v = unsafe { ptr::read_volatile(self.base().add(H_VERSION) as *const u32) };
        self.write_u32(H_VERSION, v.wrapping_add(1));
    }

    pub fn widget(&mut self, index: usize) -> WidgetWriter<'_> {
        let base = HEADER_SIZE + index * WIDGET_STRIDE;
        assert!(base + WIDGET_STRIDE <= SHM_SIZE);
        WidgetWriter { b: self, base }
    }

    pub fn text(&mut self, offset: usize, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.write_u8(offset + i, byte);
        }
    }

    pub fn region(&self) -> SharedRegion {
        unsafe { SharedRegion::from_raw(self.buf.as_ptr() as *const u8, SHM_SIZE) }
    }

    /// A view over only the first `len` bytes, for truncation tests.
    pub fn region_prefix(&self, len: usize) -> SharedRegion {
        unsafe { SharedRegion::from_raw(self.buf.as_ptr() as *const u8, len) }
    }
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder shared with a writer thread.
#[derive(Clone)]
pub struct SharedBuilder(Arc<Mutex<RegionBuilder>>);

impl SharedBuilder {
    pub fn lock(&self) -> MutexGuard<'_, RegionBuilder> {
        self.0.lock().expect("builder lock poisoned")
    }
}

pub struct WidgetWriter<'a> {
    b: &'a mut RegionBuilder,
    base: usize,
}

impl WidgetWriter<'_> {
    pub fn version(self, v: u32) -> Self {
        self.b.write_u32(self.base + W_VERSION, v);
        self
    }

    pub fn visibility(self, vis_group: u32, vis_mask: u32) -> Self {
        self.b.write_u32(self.base + W_VIS_GROUP, vis_group);
        self.b.write_u32(self.base + W_VIS_MASK, vis_mask);
        self
    }

    pub fn geometry(self, x: i16, y: i16, w: u16, h: u16) -> Self {
        self.b.write_u16(self.base + W_X, x as u16);
        self.b.write_u16(self.base + W_Y, y as u16);
        self.b.write_u16(self.base + W_W, w);
        self.b.write_u16(self.base + W_H, h);
        self
    }

    pub fn colors(self, fg: u32, bg: u32, strike: u32) -> Self {
        self.b.write_u32(self.base + W_FG, fg);
        self.b.write_u32(self.base + W_BG, bg);
        self.b.write_u32(self.base + W_STRIKE, strike);
        self
    }

    pub fn text_meta(self, text_size: u8, font: u8, text_len: u8) -> Self {
        self.b.write_u8(self.base + W_TEXT_SIZE, text_size);
        self.b.write_u8(self.base + W_FONT, font);
        self.b.write_u8(self.base + W_TEXT_LEN, text_len);
        self
    }

    pub fn flags(self, flags: u32) -> Self {
        self.b.write_u32(self.base + W_FLAGS, flags);
        self
    }

    pub fn xscale(self, xscale: f64) -> Self {
        self.b.write_f64(self.base + W_XSCALE, xscale);
        self
    }

    pub fn kind(self, kind: u8) -> Self {
        self.b.write_u8(self.base + W_KIND, kind);
        self
    }
}
