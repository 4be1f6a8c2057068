//! Consistency-checked snapshots of the producer's widget table.
//!
//! The producer mutates the shared region without locks; the only guard is
//! the header version, bumped after every table write. Reading is therefore
//! optimistic: capture everything, re-read the version, and throw the copy
//! away if it moved (a seqlock, from the reader side). Retries are bounded —
//! a producer rewriting the table faster than we can copy it would
//! otherwise livelock the render loop — and on failure the previous
//! snapshot simply stays authoritative for another tick.
//!
//! Capture goes into staging buffers and is committed by swap, so a failed
//! load never corrupts the snapshot currently being painted. All buffers
//! are allocated once, up front.

use core::fmt;

use crate::shm::{SHM_SIZE, SharedRegion};
use crate::tile::{TileGrid, TileSpan};
use crate::widget::WidgetRecord;

/// Hard cap on the widget table length.
pub const MAX_WIDGETS: usize = 256;

/// Capture attempts per load before reporting staleness.
pub const MAX_READ_RETRIES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The producer advertises more widgets than the table supports. The
    /// previous snapshot stays authoritative; retried once the producer
    /// corrects the header.
    TooManyWidgets(u32),
    /// Every capture attempt raced a producer write.
    Torn { attempts: u32 },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyWidgets(n) => {
                write!(f, "widget table advertises {n} widgets (max {MAX_WIDGETS})")
            }
            Self::Torn { attempts } => {
                write!(f, "no stable widget table in {attempts} read attempts")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Consumer-side state for one widget, 1:1 with the shared table.
#[derive(Debug, Clone, Copy)]
pub struct WidgetState {
    /// Decoded record as of the snapshot (version field tracks live bumps).
    pub rec: WidgetRecord,
    /// Last widget version a repaint was issued for.
    pub last_version: u32,
    /// Whether the widget was drawn by the last paint pass.
    pub visible: bool,
    /// Cached tile coverage of the bounding box.
    pub span: TileSpan,
    /// Cached dirty-column mask for the span.
    pub col_mask: u16,
    /// This widget's slice of the private text blob.
    text_off: u32,
    text_len: u16,
    /// Where the slice came from in the shared region, for re-copies when
    /// the widget's content version bumps.
    shm_text_off: u32,
}

/// One committed, self-consistent copy of the shared widget table.
pub struct Snapshot {
    version: u32,
    visibility: u32,
    loaded: bool,
    widgets: Vec<WidgetState>,
    text: Vec<u8>,
    staging_widgets: Vec<WidgetState>,
    staging_text: Vec<u8>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            version: 0,
            visibility: 0,
            loaded: false,
            widgets: Vec::with_capacity(MAX_WIDGETS),
            text: Vec::with_capacity(SHM_SIZE),
            staging_widgets: Vec::with_capacity(MAX_WIDGETS),
            staging_text: Vec::with_capacity(SHM_SIZE),
        }
    }

    /// Whether any snapshot has ever been committed.
    #[inline]
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Header version this snapshot was taken at.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Visibility word the last paint pass completed under.
    #[inline]
    pub fn visibility(&self) -> u32 {
        self.visibility
    }

    /// Advance the cached visibility; called after a paint pass.
    #[inline]
    pub fn set_visibility(&mut self, visibility: u32) {
        self.visibility = visibility;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    #[inline]
    pub fn widgets(&self) -> &[WidgetState] {
        &self.widgets
    }

    #[inline]
    pub fn widgets_mut(&mut self) -> &mut [WidgetState] {
        &mut self.widgets
    }

    /// The widget's text as of its last content change.
    ///
    /// The private blob holds the raw producer bytes; the view stops at the
    /// first NUL and at the last valid UTF-8 boundary, so producer garbage
    /// degrades to a shorter string instead of a paint failure.
    pub fn text(&self, w: &WidgetState) -> &str {
        let start = w.text_off as usize;
        let bytes = &self.text[start..start + usize::from(w.text_len)];
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Re-copy one widget's text slice from the region. Used when a widget
    /// version bump signals new content without a table rewrite.
    pub fn refresh_text(&mut self, index: usize, region: &SharedRegion) {
        let w = &self.widgets[index];
        if w.text_len == 0 {
            return;
        }
        let start = w.text_off as usize;
        let end = start + usize::from(w.text_len);
        let shm_off = w.shm_text_off as usize;
        region.copy_text(shm_off, &mut self.text[start..end]);
    }

    /// Capture a stable snapshot of the table, retrying torn reads up to
    /// [`MAX_READ_RETRIES`] times. On success the staging copy is committed
    /// and the cached visibility resets to zero (the next change-detection
    /// pass re-derives every widget's visible flag from scratch).
    pub fn load(&mut self, region: &SharedRegion, grid: &TileGrid) -> Result<(), SnapshotError> {
        for _ in 0..MAX_READ_RETRIES {
            let v1 = region.version();
            let num_widgets = region.num_widgets();
            if num_widgets as usize > MAX_WIDGETS {
                return Err(SnapshotError::TooManyWidgets(num_widgets));
            }

            self.capture(region, grid, num_widgets as usize);

            if region.version() == v1 {
                core::mem::swap(&mut self.widgets, &mut self.staging_widgets);
                core::mem::swap(&mut self.text, &mut self.staging_text);
                self.version = v1;
                self.visibility = 0;
                self.loaded = true;
                return Ok(());
            }
        }
        Err(SnapshotError::Torn { attempts: MAX_READ_RETRIES })
    }

    fn capture(&mut self, region: &SharedRegion, grid: &TileGrid, num_widgets: usize) {
        self.staging_widgets.clear();
        self.staging_text.clear();

        // Text is packed after the table, concatenated in widget order.
        let mut blob = SharedRegion::text_base(num_widgets);

        for i in 0..num_widgets {
            let Some(rec) = region.widget(i) else {
                // Table runs past the mapped region; keep what we have.
                break;
            };

            let span = grid.span(i32::from(rec.x), i32::from(rec.y), rec.w, rec.h);

            let mut text_len = usize::from(rec.text_len);
            let text_off = self.staging_text.len();
            let shm_text_off = blob;
            if blob + text_len > region.len() {
                // Truncated blob: textless for this snapshot, and the blob
                // cursor stays put for the widgets after it.
                text_len = 0;
            } else if text_len > 0 {
                self.staging_text.resize(text_off + text_len, 0);
                region.copy_text(blob, &mut self.staging_text[text_off..text_off + text_len]);
                blob += text_len;
            }

            self.staging_widgets.push(WidgetState {
                rec,
                // Force the first paint to treat the widget as changed.
                last_version: rec.version.wrapping_sub(1),
                visible: false,
                span,
                col_mask: span.col_mask(),
                text_off: text_off as u32,
                text_len: text_len as u16,
                shm_text_off: shm_text_off as u32,
            });
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RegionBuilder;

    fn grid() -> TileGrid {
        TileGrid::new(800, 480)
    }

    #[test]
    fn test_load_commits_widgets_and_text() {
        let mut b = RegionBuilder::new();
        b.header(5, 2, 0);
        b.widget(0).version(9).geometry(10, 10, 100, 40).text_meta(24, 0, 6);
        b.widget(1).version(2).geometry(200, 100, 80, 30).text_meta(24, 0, 4);
        b.text(SharedRegion::text_base(2), b"SPEED\0RPM\0");
        let region = b.region();

        let mut snap = Snapshot::new();
        snap.load(&region, &grid()).unwrap();

        assert!(snap.loaded());
        assert_eq!(snap.version(), 5);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.text(&snap.widgets()[0]), "SPEED");
        assert_eq!(snap.text(&snap.widgets()[1]), "RPM");
        // First paint must treat every widget as changed.
        assert_eq!(snap.widgets()[0].last_version, 8);
        assert_eq!(snap.widgets()[1].last_version, 1);
        assert!(!snap.widgets()[0].visible);
    }

    #[test]
    fn test_oversized_table_keeps_previous_snapshot() {
        let mut b = RegionBuilder::new();
        b.header(1, 1, 0);
        b.widget(0).version(1).geometry(0, 0, 10, 10);
        let region = b.region();

        let mut snap = Snapshot::new();
        snap.load(&region, &grid()).unwrap();

        b.header(2, MAX_WIDGETS as u32 + 1, 0);
        let err = snap.load(&region, &grid()).unwrap_err();
        assert_eq!(err, SnapshotError::TooManyWidgets(MAX_WIDGETS as u32 + 1));
        // Previous snapshot stays authoritative.
        assert_eq!(snap.version(), 1);
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_truncated_text_degrades_to_textless() {
        let mut b = RegionBuilder::new();
        b.header(1, 1, 0);
        b.widget(0)
            .version(1)
            .geometry(0, 0, 10, 10)
            .text_meta(24, 0, 255);

        // View only 16 bytes past the blob base, so the 255-byte slice
        // would cross the region end.
        let short = b.region_prefix(SharedRegion::text_base(1) + 16);
        let mut snap = Snapshot::new();
        snap.load(&short, &grid()).unwrap();
        assert_eq!(snap.text(&snap.widgets()[0]), "");
    }

    #[test]
    fn test_non_utf8_text_truncates_at_valid_boundary() {
        let mut b = RegionBuilder::new();
        b.header(1, 1, 0);
        b.widget(0).version(1).geometry(0, 0, 10, 10).text_meta(24, 0, 4);
        b.text(SharedRegion::text_base(1), &[b'o', b'k', 0xFF, b'x']);
        let region = b.region();

        let mut snap = Snapshot::new();
        snap.load(&region, &grid()).unwrap();
        assert_eq!(snap.text(&snap.widgets()[0]), "ok");
    }

    #[test]
    fn test_refresh_text_picks_up_new_content() {
        let mut b = RegionBuilder::new();
        b.header(1, 1, 0);
        b.widget(0).version(1).geometry(0, 0, 10, 10).text_meta(24, 0, 4);
        b.text(SharedRegion::text_base(1), b"100\0");
        let region = b.region();

        let mut snap = Snapshot::new();
        snap.load(&region, &grid()).unwrap();
        assert_eq!(snap.text(&snap.widgets()[0]), "100");

        b.text(SharedRegion::text_base(1), b"240\0");
        snap.refresh_text(0, &region);
        assert_eq!(snap.text(&snap.widgets()[0]), "240");
    }

    #[test]
    fn test_concurrent_writer_never_yields_mixed_snapshot() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        // A writer thread rewrites the whole table under the version
        // protocol; every field of every widget carries the generation
        // number, so a committed snapshot mixing two generations is
        // detectable. Torn results are allowed, mixed ones are not.
        let b = RegionBuilder::new_shared();
        {
            let mut g = b.lock();
            g.header(0, 4, 0);
            for i in 0..4 {
                g.widget(i).version(0).colors(0, 0, 0).geometry(0, 0, 10, 10);
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let b = b.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut generation = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    generation += 1;
                    let mut g = b.lock();
                    g.bump_version();
                    for i in 0..4 {
                        g.widget(i).version(generation).colors(generation, generation, generation);
                    }
                    g.bump_version();
                    drop(g);
                    // Leave the table stable long enough for commits.
                    std::thread::sleep(std::time::Duration::from_micros(50));
                }
            })
        };

        let grid = grid();
        let mut snap = Snapshot::new();
        let mut committed = 0;
        for _ in 0..500 {
            let region = b.lock().region();
            if snap.load(&region, &grid).is_ok() {
                committed += 1;
                let first = snap.widgets()[0].rec.fg;
                for w in snap.widgets() {
                    assert_eq!(w.rec.fg, first);
                    assert_eq!(w.rec.bg, first);
                    assert_eq!(w.rec.strike, first);
                }
            }
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        assert!(committed > 0, "reader never committed a snapshot");
    }
}
