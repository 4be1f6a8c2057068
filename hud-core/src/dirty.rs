//! Per-frame dirty bitmap.
//!
//! One 16-bit word per tile row; bit `c` set means tile column `c` of that
//! row must be repainted this frame. The bitmap has no identity across
//! frames beyond its bits: it is re-derived every tick and cleared after a
//! successful paint + blit pass.

use heapless::Vec;

use crate::tile::{GRID, TileSpan};

/// Upper bound on dirty runs per frame: at most 8 disjoint runs fit in a
/// 16-column row.
pub const MAX_RUNS: usize = GRID * 8;

/// A maximal horizontal sequence of contiguous dirty tile columns within
/// one row. Repainted (and blitted) as a single clipped rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub row: u8,
    pub c1: u8,
    pub c2: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyMap {
    rows: [u16; GRID],
}

impl DirtyMap {
    pub const fn new() -> Self {
        Self { rows: [0; GRID] }
    }

    /// Mark every tile of every row.
    pub fn mark_all(&mut self) {
        self.rows = [0xFFFF; GRID];
    }

    /// OR a widget's cached column mask into its cached tile rows. This is
    /// the only partial-dirt path; everything else marks the whole screen.
    pub fn mark_rows(&mut self, mask: u16, ty1: u8, ty2: u8) {
        for ty in ty1..=ty2 {
            self.rows[usize::from(ty)] |= mask;
        }
    }

    /// Mark the tiles covering a span.
    pub fn mark_span(&mut self, span: &TileSpan) {
        self.mark_rows(span.col_mask(), span.ty1, span.ty2);
    }

    pub fn clear(&mut self) {
        self.rows = [0; GRID];
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.rows.iter().all(|&m| m == 0)
    }

    #[inline]
    pub fn row(&self, row: usize) -> u16 {
        self.rows[row]
    }

    /// Extract the dirty runs, row by row, columns left to right. The same
    /// run list drives the paint pass and the blit pass.
    pub fn runs(&self) -> Vec<Run, MAX_RUNS> {
        let mut runs = Vec::new();
        for (row, &mask) in self.rows.iter().enumerate() {
            let mut c = 0u8;
            let mut open: Option<u8> = None;
            let mut bits = mask;
            while bits != 0 || open.is_some() {
                let dirty = bits & 1 != 0;
                match (open, dirty) {
                    (None, true) => open = Some(c),
                    (Some(c1), false) => {
                        // Capacity matches the worst case exactly.
                        let _ = runs.push(Run { row: row as u8, c1, c2: c - 1 });
                        open = None;
                    }
                    _ => {}
                }
                if c as usize == GRID - 1 && open.is_some() && bits <= 1 {
                    let c1 = open.take().unwrap_or(c);
                    let _ = runs.push(Run { row: row as u8, c1, c2: c });
                }
                bits >>= 1;
                c += 1;
            }
        }
        runs
    }
}

impl Default for DirtyMap {
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

    #[test]
    fn test_mark_rows_is_minimal() {
        let mut d = DirtyMap::new();
        d.mark_rows(0b0110, 3, 4);
        assert_eq!(d.row(3), 0b0110);
        assert_eq!(d.row(4), 0b0110);
        for r in [0, 1, 2, 5, 15] {
            assert_eq!(d.row(r), 0, "row {r} must stay untouched");
        }
    }

    #[test]
    fn test_single_run() {
        let mut d = DirtyMap::new();
        d.mark_rows(0b0011_1000, 2, 2);
        let runs = d.runs();
        assert_eq!(runs.as_slice(), &[Run { row: 2, c1: 3, c2: 5 }]);
    }

    #[test]
    fn test_split_runs_in_one_row() {
        let mut d = DirtyMap::new();
        d.mark_rows(0b1000_0000_0000_0101, 0, 0);
        let runs = d.runs();
        assert_eq!(
            runs.as_slice(),
            &[
                Run { row: 0, c1: 0, c2: 0 },
                Run { row: 0, c1: 2, c2: 2 },
                Run { row: 0, c1: 15, c2: 15 },
            ]
        );
    }

    #[test]
    fn test_full_rows() {
        let mut d = DirtyMap::new();
        d.mark_all();
        let runs = d.runs();
        assert_eq!(runs.len(), GRID);
        for (row, run) in runs.iter().enumerate() {
            assert_eq!(*run, Run { row: row as u8, c1: 0, c2: 15 });
        }
        d.clear();
        assert!(d.is_clean());
        assert!(d.runs().is_empty());
    }

    #[test]
    fn test_alternating_columns_worst_case() {
        let mut d = DirtyMap::new();
        for r in 0..GRID as u8 {
            d.mark_rows(0x5555, r, r);
        }
        let runs = d.runs();
        assert_eq!(runs.len(), MAX_RUNS);
    }
}
