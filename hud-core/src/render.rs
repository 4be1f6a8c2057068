//! Per-kind draw routines.
//!
//! The producer picks a font slot and a nominal pixel size; this renderer
//! maps both onto the ProFont family (slot 0 is the UI face, slot 1 the
//! numeric/monospace face — with a mono-font stack they resolve to the
//! same family). Unpopulated slots skip the widget, matching the renderer's
//! general "degrade, never abort" policy.

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle};
use embedded_graphics::text::{Baseline, Text};
use profont::{
    PROFONT_7_POINT,
    PROFONT_9_POINT,
    PROFONT_10_POINT,
    PROFONT_12_POINT,
    PROFONT_14_POINT,
    PROFONT_18_POINT,
    PROFONT_24_POINT,
};

use crate::widget::{WidgetFlags, WidgetRecord};

/// Populated font slots. Slots 2.. are reserved; widgets naming them are
/// skipped for the frame.
const FONT_SLOTS: usize = 2;

/// Stroke width of the strikethrough line.
const STRIKE_WIDTH: u32 = 3;

/// Nearest ProFont size for a nominal pixel text size.
fn font_for_size(size: u8) -> &'static MonoFont<'static> {
    match size {
        0..=10 => &PROFONT_7_POINT,
        11..=13 => &PROFONT_9_POINT,
        14..=15 => &PROFONT_10_POINT,
        16..=19 => &PROFONT_12_POINT,
        20..=23 => &PROFONT_14_POINT,
        24..=31 => &PROFONT_18_POINT,
        _ => &PROFONT_24_POINT,
    }
}

/// 0x00RRGGBB word to a drawing color. The producer's alpha byte (if any)
/// is ignored; the surface has no alpha channel.
#[inline]
pub fn color(c: u32) -> Rgb888 {
    Rgb888::new((c >> 16) as u8, (c >> 8) as u8, c as u8)
}

/// Text widget draw routine.
///
/// The target arrives already clipped to the dirty run intersected with the
/// widget box, so this only positions and paints. Alignment shifts the text
/// origin by the measured advance (scaled by the producer's `xscale`), the
/// way the producer lays out right-aligned numeric readouts.
pub fn draw_text<D>(target: &mut D, rec: &WidgetRecord, text: &str)
where
    D: DrawTarget<Color = Rgb888>,
{
    if rec.font as usize >= FONT_SLOTS {
        return;
    }
    if !text.is_empty() {
        let font = font_for_size(rec.text_size);
        let style = MonoTextStyle::new(font, color(rec.fg));

        let mut xo = i32::from(rec.xo);
        if rec.flags.intersects(WidgetFlags::ALIGN_RIGHT | WidgetFlags::ALIGN_CENTER) {
            let glyph = font.character_size.width + font.character_spacing;
            let advance = f64::from(glyph) * text.chars().count() as f64 * rec.xscale;
            let slack = f64::from(rec.w) - advance;
            if rec.flags.contains(WidgetFlags::ALIGN_CENTER) {
                xo += (slack / 2.0) as i32;
            } else {
                xo += slack as i32;
            }
        }

        let origin = Point::new(i32::from(rec.x) + xo, i32::from(rec.y) + i32::from(rec.yo));
        Text::with_baseline(text, origin, style, Baseline::Alphabetic)
            .draw(target)
            .ok();
    }

    if rec.strike != 0 {
        let y = i32::from(rec.y) + i32::from(rec.h / 2);
        Line::new(
            Point::new(i32::from(rec.x), y),
            Point::new(i32::from(rec.x) + i32::from(rec.w), y),
        )
        .into_styled(PrimitiveStyle::with_stroke(color(rec.strike), STRIKE_WIDTH))
        .draw(target)
        .ok();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
