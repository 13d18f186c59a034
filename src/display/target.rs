//! `embedded-graphics` draw target over a pixel buffer.
//!
//! The buffer holds one rectangle of the screen, row-major with the
//! rectangle's width as stride. Drawing uses screen coordinates and anything
//! outside the rectangle is dropped, so the same target serves the whole
//! frame buffer and a single draw-buffer strip.

use super::rgb_panel::{Pixel, color};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::{Dimensions, DrawTarget, Point};
use embedded_graphics::primitives::{ContainsPoint, Rectangle};
use std::convert::Infallible;

pub struct BufferTarget<'a> {
    area: Rectangle,
    pixels: &'a mut [Pixel],
}

impl<'a> BufferTarget<'a> {
    pub fn new(area: Rectangle, pixels: &'a mut [Pixel]) -> Self {
        Self { area, pixels }
    }

    fn index(&self, point: Point) -> Option<usize> {
        if !self.area.contains(point) {
            return None;
        }
        let offset = point - self.area.top_left;
        Some(offset.y as usize * self.area.size.width as usize + offset.x as usize)
    }
}

impl Dimensions for BufferTarget<'_> {
    fn bounding_box(&self) -> Rectangle {
        self.area
    }
}

impl DrawTarget for BufferTarget<'_> {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for embedded_graphics::Pixel(point, c) in pixels {
            if let Some(slot) = self.index(point).and_then(|i| self.pixels.get_mut(i)) {
                *slot = color::raw(c);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, c: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.area);
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };

        let raw = color::raw(c);
        let stride = self.area.size.width as usize;
        let x0 = (area.top_left.x - self.area.top_left.x) as usize;
        let width = area.size.width as usize;

        for y in area.top_left.y..=bottom_right.y {
            let start = (y - self.area.top_left.y) as usize * stride + x0;
            if let Some(row) = self.pixels.get_mut(start..start + width) {
                row.fill(raw);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn test_fill_is_clipped_to_area() {
        let area = Rectangle::new(Point::new(10, 10), Size::new(4, 2));
        let mut buf = [0u16; 8];
        let mut target = BufferTarget::new(area, &mut buf);

        Rectangle::new(Point::new(0, 0), Size::new(12, 11))
            .into_styled(PrimitiveStyle::with_fill(color::RED))
            .draw(&mut target)
            .unwrap();

        let red = color::raw(color::RED);
        assert_eq!(buf, [red, red, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pixels_outside_area_are_dropped() {
        let area = Rectangle::new(Point::new(5, 5), Size::new(2, 2));
        let mut buf = [0u16; 4];
        let mut target = BufferTarget::new(area, &mut buf);

        let pixels = [
            embedded_graphics::Pixel(Point::new(6, 6), color::WHITE),
            embedded_graphics::Pixel(Point::new(7, 5), color::WHITE),
            embedded_graphics::Pixel(Point::new(-1, 5), color::WHITE),
        ];
        target.draw_iter(pixels).unwrap();
        assert_eq!(buf, [0, 0, 0, 0xFFFF]);
    }

    #[test]
    fn test_short_buffer_does_not_panic() {
        let area = Rectangle::new(Point::zero(), Size::new(4, 4));
        let mut buf = [0u16; 6];
        let mut target = BufferTarget::new(area, &mut buf);
        target.clear(color::BLUE).unwrap();

        let blue = color::raw(color::BLUE);
        assert_eq!(buf, [blue, blue, blue, blue, 0, 0]);
    }
}
