use embedded_graphics::prelude::Point;
use embedded_graphics::primitives::Rectangle;

/// Inclusive screen rectangle that needs to be flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl DirtyRegion {
    pub const fn new(x1: u16, y1: u16, x2: u16, y2: u16) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Inclusive view of a rectangle. `None` when it is empty or does not
    /// fit in screen coordinates.
    pub fn from_rectangle(rect: &Rectangle) -> Option<Self> {
        let bottom_right = rect.bottom_right()?;
        Some(Self::new(
            u16::try_from(rect.top_left.x).ok()?,
            u16::try_from(rect.top_left.y).ok()?,
            u16::try_from(bottom_right.x).ok()?,
            u16::try_from(bottom_right.y).ok()?,
        ))
    }

    pub fn width(&self) -> u16 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u16 {
        self.y2 - self.y1 + 1
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Split into horizontal strips of at most `max_pixels` pixels each
    pub fn strips(&self, max_pixels: usize) -> impl Iterator<Item = DirtyRegion> + use<> {
        let area = *self;
        let rows = (max_pixels / area.width() as usize).clamp(1, area.height() as usize) as u16;
        (area.y1..=area.y2)
            .step_by(rows as usize)
            .map(move |y| DirtyRegion::new(area.x1, y, area.x2, (y + rows - 1).min(area.y2)))
    }

    /// Exclusive end coordinates, as the hardware blit expects
    pub fn exclusive_end(&self) -> (u16, u16) {
        (self.x2 + 1, self.y2 + 1)
    }
}

impl From<DirtyRegion> for Rectangle {
    fn from(area: DirtyRegion) -> Self {
        Rectangle::with_corners(
            Point::new(i32::from(area.x1), i32::from(area.y1)),
            Point::new(i32::from(area.x2), i32::from(area.y2)),
        )
    }
}

impl std::fmt::Display for DirtyRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::Size;

    #[test]
    fn test_inclusive_dimensions() {
        let area = DirtyRegion::new(10, 20, 19, 29);
        assert_eq!(area.width(), 10);
        assert_eq!(area.height(), 10);
        assert_eq!(area.pixel_count(), 100);
        assert_eq!(area.exclusive_end(), (20, 30));
    }

    #[test]
    fn test_rectangle_conversion() {
        let area = DirtyRegion::new(10, 20, 19, 29);
        let rect = Rectangle::from(area);
        assert_eq!(rect, Rectangle::new(Point::new(10, 20), Size::new(10, 10)));
        assert_eq!(DirtyRegion::from_rectangle(&rect), Some(area));

        assert_eq!(DirtyRegion::from_rectangle(&Rectangle::zero()), None);
        let negative = Rectangle::new(Point::new(-1, 0), Size::new(4, 4));
        assert_eq!(DirtyRegion::from_rectangle(&negative), None);
    }

    #[test]
    fn test_strips_cover_area() {
        let area = DirtyRegion::new(0, 0, 799, 479);
        let strips: Vec<_> = area.strips(800 * 50).collect();
        assert_eq!(strips.len(), 10);
        assert_eq!(strips[0], DirtyRegion::new(0, 0, 799, 49));
        assert_eq!(strips[9], DirtyRegion::new(0, 450, 799, 479));
        let rows: usize = strips.iter().map(|s| s.height() as usize).sum();
        assert_eq!(rows, 480);
    }

    #[test]
    fn test_strips_short_tail() {
        let area = DirtyRegion::new(5, 10, 14, 16);
        let strips: Vec<_> = area.strips(30).collect();
        assert_eq!(
            strips,
            vec![
                DirtyRegion::new(5, 10, 14, 12),
                DirtyRegion::new(5, 13, 14, 15),
                DirtyRegion::new(5, 16, 14, 16),
            ]
        );
    }
}
