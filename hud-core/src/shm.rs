//! Shared-memory widget table contract.
//!
//! One fixed-size region is shared between the producer (vehicle data
//! scripts) and this renderer. The producer owns every byte; the renderer
//! only ever reads. There are no locks: consistency comes from the header
//! version field, re-checked after every table copy (see
//! [`crate::snapshot`]).
//!
//! Memory layout:
//!   - Header (12 bytes): table version, widget count, visibility word
//!   - Widget records ([`WIDGET_STRIDE`] bytes x `num_widgets`)
//!   - Packed text blob: widget text, concatenated in widget order
//!
//! All fields are little-endian. Field positions are fixed by the offset
//! constants below; the producer and renderer must agree on them exactly.

use core::ptr;

use crate::widget::{WidgetFlags, WidgetKind, WidgetRecord};

/// Total size of the shared region in bytes.
pub const SHM_SIZE: usize = 32768;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 12;

// --- Header field offsets ---
pub const H_VERSION: usize = 0;
pub const H_NUM_WIDGETS: usize = 4;
pub const H_VISIBILITY: usize = 8;

/// Bytes per widget record.
pub const WIDGET_STRIDE: usize = 56;

// --- Widget record field offsets ---
pub const W_VERSION: usize = 0;
pub const W_VIS_GROUP: usize = 4;
pub const W_VIS_MASK: usize = 8;
pub const W_FLAGS: usize = 12;
pub const W_XSCALE: usize = 16; // f64
pub const W_FG: usize = 24;
pub const W_BG: usize = 28;
pub const W_STRIKE: usize = 32;
pub const W_X: usize = 36; // i16
pub const W_Y: usize = 38; // i16
pub const W_W: usize = 40; // u16
pub const W_H: usize = 42; // u16
pub const W_XO: usize = 44; // i16
pub const W_YO: usize = 46; // i16
pub const W_TEXT_SIZE: usize = 48; // u8 (49 is alignment padding)
pub const W_TEXT_PTR: usize = 50; // u16
pub const W_KIND: usize = 52; // u8
pub const W_TEXT_LEN: usize = 53; // u8
pub const W_FONT: usize = 54; // u8
// 55 reserved

/// Decoded copy of the shared header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub num_widgets: u32,
    pub visibility: u32,
}

/// Read-only, bounds-checked view over the mapped producer region.
///
/// Every accessor validates its offset against the mapped length instead of
/// trusting producer-supplied counts, so a corrupt widget table can at worst
/// yield garbage field values, never an out-of-bounds read. The region may
/// be mutated concurrently by the producer; torn values are expected and
/// are handled by the snapshot version protocol.
pub struct SharedRegion {
    ptr: *const u8,
    len: usize,
}

// Single consumer thread; the raw pointer is only ever read.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Wrap a mapped region.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + len` must stay readable for the lifetime of the view.
    /// `ptr` must be at least 4-byte aligned (mmap hands out page-aligned
    /// memory) and `len` must cover the header.
    pub unsafe fn from_raw(ptr: *const u8, len: usize) -> Self {
        assert!(ptr as usize % 4 == 0, "shared region must be 4-byte aligned");
        assert!(len >= HEADER_SIZE, "shared region smaller than its header");
        Self { ptr, len }
    }

    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // Volatile so the compiler cannot cache or elide the version re-reads
    // the snapshot protocol depends on. Header and widget word fields are
    // all 4-byte aligned relative to the region base.
    #[inline]
    fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.len && offset % 4 == 0);
        unsafe { ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    #[inline]
    fn read_u16(&self, offset: usize) -> u16 {
        debug_assert!(offset + 2 <= self.len && offset % 2 == 0);
        unsafe { ptr::read_volatile(self.ptr.add(offset) as *const u16) }
    }

    #[inline]
    fn read_u8(&self, offset: usize) -> u8 {
        debug_assert!(offset < self.len);
        unsafe { ptr::read_volatile(self.ptr.add(offset)) }
    }

    // The scale field sits at an 8-byte-misaligned offset (header is 12
    // bytes), so it cannot go through read_volatile.
    #[inline]
    fn read_f64(&self, offset: usize) -> f64 {
        debug_assert!(offset + 8 <= self.len);
        unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const f64) }
    }

    /// Current table version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.read_u32(H_VERSION)
    }

    /// Producer-reported widget count. May exceed what the region can hold;
    /// the snapshot reader rejects oversized counts.
    #[inline]
    pub fn num_widgets(&self) -> u32 {
        self.read_u32(H_NUM_WIDGETS)
    }

    /// Global visibility word (bit 31 doubles as the frame dump trigger).
    #[inline]
    pub fn visibility(&self) -> u32 {
        self.read_u32(H_VISIBILITY)
    }

    /// Decoded header.
    pub fn header(&self) -> Header {
        Header {
            version: self.version(),
            num_widgets: self.num_widgets(),
            visibility: self.visibility(),
        }
    }

    /// Byte offset of widget record `index`, if it fits in the region.
    #[inline]
    fn widget_offset(&self, index: usize) -> Option<usize> {
        let offset = HEADER_SIZE + index * WIDGET_STRIDE;
        (offset + WIDGET_STRIDE <= self.len).then_some(offset)
    }

    /// Byte offset where the packed text blob starts for a table of
    /// `num_widgets` records.
    #[inline]
    pub fn text_base(num_widgets: usize) -> usize {
        HEADER_SIZE + num_widgets * WIDGET_STRIDE
    }

    /// Live read of one widget's version field.
    ///
    /// Widget versions bump without a header version bump when only the
    /// widget's content changed, so per-frame change detection reads them
    /// straight from the region.
    pub fn widget_version(&self, index: usize) -> Option<u32> {
        let base = self.widget_offset(index)?;
        Some(self.read_u32(base + W_VERSION))
    }

    /// Decode one widget record.
    pub fn widget(&self, index: usize) -> Option<WidgetRecord> {
        let base = self.widget_offset(index)?;
        Some(WidgetRecord {
            version: self.read_u32(base + W_VERSION),
            vis_group: self.read_u32(base + W_VIS_GROUP),
            vis_mask: self.read_u32(base + W_VIS_MASK),
            flags: WidgetFlags::from_bits_truncate(self.read_u32(base + W_FLAGS)),
            xscale: self.read_f64(base + W_XSCALE),
            fg: self.read_u32(base + W_FG),
            bg: self.read_u32(base + W_BG),
            strike: self.read_u32(base + W_STRIKE),
            x: self.read_u16(base + W_X) as i16,
            y: self.read_u16(base + W_Y) as i16,
            w: self.read_u16(base + W_W),
            h: self.read_u16(base + W_H),
            xo: self.read_u16(base + W_XO) as i16,
            yo: self.read_u16(base + W_YO) as i16,
            text_size: self.read_u8(base + W_TEXT_SIZE),
            font: self.read_u8(base + W_FONT),
            text_ptr: self.read_u16(base + W_TEXT_PTR),
            kind: WidgetKind::from(self.read_u8(base + W_KIND)),
            text_len: self.read_u8(base + W_TEXT_LEN),
        })
    }

    /// Copy `dst.len()` text bytes starting at `offset` into `dst`.
    ///
    /// Returns false (copying nothing) when the slice would leave the
    /// region; the caller treats such a widget as textless.
    pub fn copy_text(&self, offset: usize, dst: &mut [u8]) -> bool {
        let Some(end) = offset.checked_add(dst.len()) else {
            return false;
        };
        if end > self.len {
            return false;
        }
        // Plain copy: a torn read here is caught by the version re-check.
        unsafe { ptr::copy_nonoverlapping(self.ptr.add(offset), dst.as_mut_ptr(), dst.len()) };
        true
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
