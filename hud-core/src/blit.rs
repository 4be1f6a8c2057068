//! Pixel-format conversion into the destination buffer.
//!
//! The destination reports its physical layout once at startup; it must
//! bit-exactly match one entry of the static spec table or the renderer
//! cannot drive that display at all (a configuration-fatal error, the only
//! kind this core has). After every paint pass the dirty-run scan invokes
//! the selected converter once per run rectangle, touching only those
//! scanlines and columns. The full frame is never copied.

use core::fmt;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::surface::Surface;

/// Physical pixel layout of a destination buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bpp: u32,
    pub r_len: u32,
    pub g_len: u32,
    pub b_len: u32,
    pub r_off: u32,
    pub g_off: u32,
    pub b_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitError {
    /// The destination's layout matches no supported spec.
    UnsupportedFormat(PixelFormat),
}

impl fmt::Display for BlitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(pf) => write!(
                f,
                "no blit spec for {}bpp R{}/{} G{}/{} B{}/{}",
                pf.bpp, pf.r_len, pf.r_off, pf.g_len, pf.g_off, pf.b_len, pf.b_off
            ),
        }
    }
}

impl std::error::Error for BlitError {}

/// Writable view of the destination pixel memory.
///
/// `flipped` mirrors the output vertically for panels mounted upside down:
/// surface row `y` lands on destination row `height - 1 - y`.
pub struct DstView<'a> {
    buf: &'a mut [u8],
    stride: usize,
    height: u32,
    flipped: bool,
}

impl<'a> DstView<'a> {
    pub fn new(buf: &'a mut [u8], stride: usize, height: u32, flipped: bool) -> Self {
        debug_assert!(buf.len() >= stride * height as usize);
        Self { buf, stride, height, flipped }
    }

    /// Destination bytes for `len` bytes starting `x_bytes` into row `y`.
    #[inline]
    fn row_mut(&mut self, y: u32, x_bytes: usize, len: usize) -> &mut [u8] {
        let y = if self.flipped { self.height - 1 - y } else { y };
        let start = y as usize * self.stride + x_bytes;
        &mut self.buf[start..start + len]
    }
}

type ConvertFn = fn(&Surface, &Rectangle, &mut DstView<'_>);

/// One supported destination layout plus its conversion routine.
#[derive(Debug)]
pub struct BlitSpec {
    pub name: &'static str,
    pub format: PixelFormat,
    convert: ConvertFn,
}

impl BlitSpec {
    /// Convert one run rectangle from the surface into the destination.
    /// The rectangle must already be clamped to the screen.
    pub fn blit(&self, surface: &Surface, rect: &Rectangle, dst: &mut DstView<'_>) {
        if rect.size.width == 0 || rect.size.height == 0 {
            return;
        }
        (self.convert)(surface, rect, dst);
    }
}

fn blit_rgb24(surface: &Surface, rect: &Rectangle, dst: &mut DstView<'_>) {
    let (x0, y0) = (rect.top_left.x as u32, rect.top_left.y as u32);
    for yy in 0..rect.size.height {
        let row = dst.row_mut(y0 + yy, x0 as usize * 3, rect.size.width as usize * 3);
        for (xx, px) in row.chunks_exact_mut(3).enumerate() {
            let v = surface.pixel(x0 + xx as u32, y0 + yy);
            px[0] = (v >> 16) as u8;
            px[1] = (v >> 8) as u8;
            px[2] = v as u8;
        }
    }
}

fn blit_bgr24(surface: &Surface, rect: &Rectangle, dst: &mut DstView<'_>) {
    let (x0, y0) = (rect.top_left.x as u32, rect.top_left.y as u32);
    for yy in 0..rect.size.height {
        let row = dst.row_mut(y0 + yy, x0 as usize * 3, rect.size.width as usize * 3);
        for (xx, px) in row.chunks_exact_mut(3).enumerate() {
            let v = surface.pixel(x0 + xx as u32, y0 + yy);
            px[0] = v as u8;
            px[1] = (v >> 8) as u8;
            px[2] = (v >> 16) as u8;
        }
    }
}

fn blit_rgbx32(surface: &Surface, rect: &Rectangle, dst: &mut DstView<'_>) {
    let (x0, y0) = (rect.top_left.x as u32, rect.top_left.y as u32);
    for yy in 0..rect.size.height {
        let row = dst.row_mut(y0 + yy, x0 as usize * 4, rect.size.width as usize * 4);
        for (xx, px) in row.chunks_exact_mut(4).enumerate() {
            let v = surface.pixel(x0 + xx as u32, y0 + yy);
            px.copy_from_slice(&v.to_le_bytes());
        }
    }
}

fn blit_rgb565(surface: &Surface, rect: &Rectangle, dst: &mut DstView<'_>) {
    let (x0, y0) = (rect.top_left.x as u32, rect.top_left.y as u32);
    for yy in 0..rect.size.height {
        let row = dst.row_mut(y0 + yy, x0 as usize * 2, rect.size.width as usize * 2);
        for (xx, px) in row.chunks_exact_mut(2).enumerate() {
            let v = surface.pixel(x0 + xx as u32, y0 + yy);
            let (r, g, b) = ((v >> 16) & 0xFF, (v >> 8) & 0xFF, v & 0xFF);
            let packed = (((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)) as u16;
            px.copy_from_slice(&packed.to_le_bytes());
        }
    }
}

/// Every destination layout this renderer can drive.
pub static BLIT_SPECS: [BlitSpec; 4] = [
    BlitSpec {
        name: "rgb24",
        format: PixelFormat { bpp: 24, r_len: 8, g_len: 8, b_len: 8, r_off: 0, g_off: 8, b_off: 16 },
        convert: blit_rgb24,
    },
    BlitSpec {
        name: "bgr24",
        format: PixelFormat { bpp: 24, r_len: 8, g_len: 8, b_len: 8, r_off: 16, g_off: 8, b_off: 0 },
        convert: blit_bgr24,
    },
    BlitSpec {
        name: "rgbx32",
        format: PixelFormat { bpp: 32, r_len: 8, g_len: 8, b_len: 8, r_off: 16, g_off: 8, b_off: 0 },
        convert: blit_rgbx32,
    },
    BlitSpec {
        name: "rgb565",
        format: PixelFormat { bpp: 16, r_len: 5, g_len: 6, b_len: 5, r_off: 11, g_off: 5, b_off: 0 },
        convert: blit_rgb565,
    },
];

/// Select the one spec bit-exactly matching the destination layout.
pub fn select_spec(format: &PixelFormat) -> Result<&'static BlitSpec, BlitError> {
    BLIT_SPECS
        .iter()
        .find(|spec| spec.format == *format)
        .ok_or(BlitError::UnsupportedFormat(*format))
}

/// Bytes per destination pixel for a supported spec.
#[inline]
pub fn bytes_per_pixel(format: &PixelFormat) -> usize {
    (format.bpp as usize).div_ceil(8)
}

// =============================================================================
// Unit Tests
// =============================================================================
