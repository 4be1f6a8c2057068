//! Producer-side writer for the shared widget table.
//!
//! The renderer never locks: it relies on the header version moving while a
//! table write is in flight. Every table rewrite therefore goes through
//! [`ShmWriter::begin_table_update`] / [`ShmWriter::end_table_update`],
//! bumping the version on both sides of the write. In-place text updates
//! skip the header and bump only the widget's own version field, which the
//! renderer polls every tick.
//!
//! Each widget reserves a fixed text capacity in the blob, NUL padded, so
//! values can change length without moving anyone else's slice.

use core::ptr;

use hud_core::shm::{
    H_NUM_WIDGETS,
    H_VERSION,
    H_VISIBILITY,
    HEADER_SIZE,
    SHM_SIZE,
    W_BG,
    W_FG,
    W_FLAGS,
    W_FONT,
    W_H,
    W_KIND,
    W_STRIKE,
    W_TEXT_LEN,
    W_TEXT_PTR,
    W_TEXT_SIZE,
    W_VERSION,
    W_VIS_GROUP,
    W_VIS_MASK,
    W_W,
    W_X,
    W_XO,
    W_XSCALE,
    W_Y,
    W_YO,
    WIDGET_STRIDE,
};

/// Static description of one widget; [`write_table`] turns a list of these
/// into the wire layout.
pub struct WidgetDef {
    pub vis_group: u32,
    pub vis_mask: u32,
    pub flags: u32,
    pub xscale: f64,
    pub fg: u32,
    pub bg: u32,
    pub strike: u32,
    pub x: i16,
    pub y: i16,
    pub w: u16,
    pub h: u16,
    pub xo: i16,
    pub yo: i16,
    pub text_size: u8,
    pub font: u8,
    pub kind: u8,
    /// Blob bytes reserved for this widget (text plus NUL padding).
    pub text_cap: u8,
    pub text: &'static str,
}

impl Default for WidgetDef {
    fn default() -> Self {
        Self {
            vis_group: 0,
            vis_mask: 0,
            flags: 0,
            xscale: 1.0,
            fg: 0xFFFFFF,
            bg: 0,
            strike: 0,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            xo: 0,
            yo: 0,
            text_size: 16,
            font: 0,
            kind: 0,
            text_cap: 0,
            text: "",
        }
    }
}

/// Handle to one widget's reserved blob slice, for in-place text updates.
#[derive(Debug, Clone, Copy)]
pub struct TextSlot {
    record: usize,
    blob: usize,
    cap: u8,
}

/// Raw writer over the mapped region.
pub struct ShmWriter {
    ptr: *mut u8,
    len: usize,
}

impl ShmWriter {
    /// Wrap a writable mapping.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + len` must stay writable for the lifetime of the writer,
    /// with `ptr` at least 4-byte aligned.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        assert!(ptr as usize % 4 == 0, "shared region must be 4-byte aligned");
        assert!(len >= HEADER_SIZE, "shared region smaller than its header");
        Self { ptr, len }
    }

    // Volatile for the same reason the reader side reads volatile: version
    // writes must hit memory in program order around the table writes.
    fn write_u32(&mut self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.len && offset % 4 == 0);
        unsafe { ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) };
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        assert!(offset + 2 <= self.len && offset % 2 == 0);
        unsafe { ptr::write_volatile(self.ptr.add(offset) as *mut u16, value) };
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        assert!(offset < self.len);
        unsafe { ptr::write_volatile(self.ptr.add(offset), value) };
    }

    fn write_f64(&mut self, offset: usize, value: f64) {
        assert!(offset + 8 <= self.len);
        unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut f64, value) };
    }

    fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.len && offset % 4 == 0);
        unsafe { ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    fn bump_header_version(&mut self) {
        let v = self.read_u32(H_VERSION);
        self.write_u32(H_VERSION, v.wrapping_add(1));
    }

    /// Open a table rewrite: the version moves, so any renderer snapshot
    /// taken from here on fails its consistency re-check.
    pub fn begin_table_update(&mut self) {
        self.bump_header_version();
    }

    /// Close a table rewrite.
    pub fn end_table_update(&mut self) {
        self.bump_header_version();
    }

    /// Replace the global visibility word.
    pub fn set_visibility(&mut self, visibility: u32) {
        self.write_u32(H_VISIBILITY, visibility);
    }

    /// Rewrite a widget's text in place (truncated to its capacity, NUL
    /// padded) and bump its version so the renderer picks it up.
    pub fn update_text(&mut self, slot: &TextSlot, text: &str) {
        let cap = usize::from(slot.cap);
        let bytes = text.as_bytes();
        for i in 0..cap {
            self.write_u8(slot.blob + i, bytes.get(i).copied().unwrap_or(0));
        }
        let v = self.read_u32(slot.record + W_VERSION);
        self.write_u32(slot.record + W_VERSION, v.wrapping_add(1));
    }
}

/// Serialize the whole table, bracketed by a version bump pair. Returns one
/// [`TextSlot`] per widget, in table order.
pub fn write_table(shm: &mut ShmWriter, widgets: &[WidgetDef]) -> Vec<TextSlot> {
    let table_end = HEADER_SIZE + widgets.len() * WIDGET_STRIDE;
    let blob_len: usize = widgets.iter().map(|w| usize::from(w.text_cap)).sum();
    assert!(table_end + blob_len <= SHM_SIZE, "widget table does not fit the region");

    shm.begin_table_update();
    shm.write_u32(H_NUM_WIDGETS, widgets.len() as u32);

    let mut slots = Vec::with_capacity(widgets.len());
    let mut blob = table_end;
    for (i, def) in widgets.iter().enumerate() {
        let record = HEADER_SIZE + i * WIDGET_STRIDE;
        shm.write_u32(record + W_VERSION, 1);
        shm.write_u32(record + W_VIS_GROUP, def.vis_group);
        shm.write_u32(record + W_VIS_MASK, def.vis_mask);
        shm.write_u32(record + W_FLAGS, def.flags);
        shm.write_f64(record + W_XSCALE, def.xscale);
        shm.write_u32(record + W_FG, def.fg);
        shm.write_u32(record + W_BG, def.bg);
        shm.write_u32(record + W_STRIKE, def.strike);
        shm.write_u16(record + W_X, def.x as u16);
        shm.write_u16(record + W_Y, def.y as u16);
        shm.write_u16(record + W_W, def.w);
        shm.write_u16(record + W_H, def.h);
        shm.write_u16(record + W_XO, def.xo as u16);
        shm.write_u16(record + W_YO, def.yo as u16);
        shm.write_u8(record + W_TEXT_SIZE, def.text_size);
        shm.write_u8(record + W_FONT, def.font);
        shm.write_u16(record + W_TEXT_PTR, 0);
        shm.write_u8(record + W_KIND, def.kind);
        shm.write_u8(record + W_TEXT_LEN, def.text_cap);

        let slot = TextSlot { record, blob, cap: def.text_cap };
        let bytes = def.text.as_bytes();
        for j in 0..usize::from(def.text_cap) {
            shm.write_u8(blob + j, bytes.get(j).copied().unwrap_or(0));
        }
        blob += usize::from(def.text_cap);
        slots.push(slot);
    }

    shm.end_table_update();
    slots
}

// =============================================================================
// Unit Tests
// =============================================================================
