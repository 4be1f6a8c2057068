//! Widget records and the visibility rule.

use bitflags::bitflags;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Bit 31 of the visibility word: dump the composed frame to a PNG this
/// tick. Not a visibility bit; widgets must not use it in their masks.
pub const VIS_DUMP_FRAME: u32 = 0x8000_0000;

bitflags! {
    /// Per-widget layout flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WidgetFlags: u32 {
        /// Right-align text against the widget box.
        const ALIGN_RIGHT = 1;
        /// Center text within the widget box.
        const ALIGN_CENTER = 2;
    }
}

/// Draw routine discriminator.
///
/// Unknown kinds are carried through and resolve to a no-op draw, so a
/// newer producer never aborts a frame on an older renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Mono-font text, optionally aligned and struck through.
    Text,
    /// Reserved icon slot; draws nothing.
    Icon,
    /// Anything this renderer does not know. Skipped, not an error.
    Unknown(u8),
}

impl From<u8> for WidgetKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Text,
            1 => Self::Icon,
            other => Self::Unknown(other),
        }
    }
}

/// One decoded widget record from the shared table.
///
/// Geometry is signed pixel offsets from the screen origin; the paint pass
/// clips, so off-screen boxes are harmless.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetRecord {
    pub version: u32,
    pub vis_group: u32,
    pub vis_mask: u32,
    pub flags: WidgetFlags,
    /// Horizontal scale applied to the measured text advance.
    pub xscale: f64,
    pub fg: u32,
    pub bg: u32,
    /// Strikethrough color; zero disables the strike line.
    pub strike: u32,
    pub x: i16,
    pub y: i16,
    pub w: u16,
    pub h: u16,
    /// Text origin offset within the widget box.
    pub xo: i16,
    pub yo: i16,
    pub text_size: u8,
    pub font: u8,
    pub text_ptr: u16,
    pub kind: WidgetKind,
    pub text_len: u8,
}

impl WidgetRecord {
    /// The visibility rule: shown iff the masked visibility word equals the
    /// widget's group. A `{vis_group: 0, vis_mask: 0}` widget is therefore
    /// visible under any visibility value.
    #[inline]
    pub fn is_visible(&self, visibility: u32) -> bool {
        self.vis_group == (visibility & self.vis_mask)
    }

    /// Bounding box as a drawing rectangle.
    #[inline]
    pub fn rect(&self) -> Rectangle {
        Rectangle::new(
            Point::new(i32::from(self.x), i32::from(self.y)),
            Size::new(u32::from(self.w), u32::from(self.h)),
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(vis_group: u32, vis_mask: u32) -> WidgetRecord {
        WidgetRecord {
            version: 0,
            vis_group,
            vis_mask,
            flags: WidgetFlags::empty(),
            xscale: 1.0,
            fg: 0xFFFFFF,
            bg: 0,
            strike: 0,
            x: 0,
            y: 0,
            w: 10,
            h: 10,
            xo: 0,
            yo: 0,
            text_size: 24,
            font: 0,
            text_ptr: 0,
            kind: WidgetKind::Text,
            text_len: 0,
        }
    }

    #[test]
    fn test_visibility_rule() {
        let w = widget(0x4, 0xC);
        assert!(w.is_visible(0x4));
        assert!(w.is_visible(0x14)); // bits outside the mask are ignored
        assert!(!w.is_visible(0x8));
        assert!(!w.is_visible(0));
    }

    #[test]
    fn test_unmasked_widget_always_visible() {
        let w = widget(0, 0);
        for visibility in [0, 1, 0xFFFF_FFFF, VIS_DUMP_FRAME] {
            assert!(w.is_visible(visibility));
        }
    }

    #[test]
    fn test_kind_from_u8() {
        assert_eq!(WidgetKind::from(0), WidgetKind::Text);
        assert_eq!(WidgetKind::from(1), WidgetKind::Icon);
        assert_eq!(WidgetKind::from(77), WidgetKind::Unknown(77));
    }
}
