//! Internal drawing surface.
//!
//! One 32-bit `0x00RRGGBB` word per pixel, allocated once at startup. The
//! paint pass draws into it through [`embedded_graphics`]' `DrawTarget`
//! (clipped per dirty run); the blit layer reads it back out when
//! converting dirty regions into the destination pixel format.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

#[inline]
fn encode(color: Rgb888) -> u32 {
    (u32::from(color.r()) << 16) | (u32::from(color.g()) << 8) | u32::from(color.b())
}

pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel words, row-major.
    #[inline]
    pub fn data(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixel at `(x, y)`, or black when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize]
        } else {
            0
        }
    }

    /// Reset every pixel to black without going through the draw path.
    pub fn clear_black(&mut self) {
        self.pixels.fill(0);
    }

    #[inline]
    fn set(&mut self, x: u32, y: u32, value: u32) {
        self.pixels[(y * self.width + x) as usize] = value;
    }
}

impl OriginDimensions for Surface {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Surface {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < self.width
                && (point.y as u32) < self.height
            {
                self.set(point.x as u32, point.y as u32, encode(color));
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(()); // degenerate rectangle
        };
        let value = encode(color);
        for y in area.top_left.y..=bottom_right.y {
            let row = y as u32 * self.width;
            let start = (row + area.top_left.x as u32) as usize;
            let end = (row + bottom_right.x as u32) as usize;
            self.pixels[start..=end].fill(value);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.pixels.fill(encode(color));
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_solid_clamps_to_bounds() {
        let mut s = Surface::new(8, 8);
        s.fill_solid(&Rectangle::new(Point::new(-2, 6), Size::new(4, 10)), Rgb888::new(1, 2, 3))
            .unwrap();
        assert_eq!(s.pixel(0, 7), 0x010203);
        assert_eq!(s.pixel(1, 7), 0x010203);
        assert_eq!(s.pixel(2, 7), 0);
        assert_eq!(s.pixel(0, 5), 0);
    }

    #[test]
    fn test_clipped_drawing_stays_inside_clip() {
        let mut s = Surface::new(16, 16);
        let clip = Rectangle::new(Point::new(4, 4), Size::new(4, 4));
        s.clipped(&clip).clear(Rgb888::new(0xAA, 0, 0)).unwrap();
        assert_eq!(s.pixel(4, 4), 0xAA0000);
        assert_eq!(s.pixel(7, 7), 0xAA0000);
        assert_eq!(s.pixel(3, 4), 0);
        assert_eq!(s.pixel(8, 4), 0);
    }

    #[test]
    fn test_out_of_bounds_pixel_reads_black() {
        let s = Surface::new(4, 4);
        assert_eq!(s.pixel(4, 0), 0);
        assert_eq!(s.pixel(0, 4), 0);
    }
}
