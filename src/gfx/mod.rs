//! Retained-mode scene.
//!
//! Holds a background color and a stack of filled rectangles. Every change
//! invalidates the screen area it touches; the render task drains those
//! areas and asks the scene to paint them into draw buffers.

mod area;

pub use area::DirtyRegion;

use crate::display::{BufferTarget, Pixel};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::{DrawTarget, Drawable, Point, Primitive, Size};
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

/// Positions are clamped to this range so rectangle corners never overflow
const COORD_LIMIT: i32 = 1 << 24;

/// Identifier of a scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

#[derive(Debug, Clone)]
struct Object {
    id: ObjectId,
    /// Unclipped placement; may extend past the screen
    rect: Rectangle,
    color: Rgb565,
}

fn place(x: i32, y: i32, width: u16, height: u16) -> Rectangle {
    Rectangle::new(
        Point::new(
            x.clamp(-COORD_LIMIT, COORD_LIMIT),
            y.clamp(-COORD_LIMIT, COORD_LIMIT),
        ),
        Size::new(u32::from(width), u32::from(height)),
    )
}

/// Smallest rectangle covering both
fn envelope(a: &Rectangle, b: &Rectangle) -> Rectangle {
    match (a.bottom_right(), b.bottom_right()) {
        (Some(a_br), Some(b_br)) => Rectangle::with_corners(
            a.top_left.component_min(b.top_left),
            a_br.component_max(b_br),
        ),
        (Some(_), None) => *a,
        _ => *b,
    }
}

/// Scene state shared between the render task and foreground code
#[derive(Debug)]
pub struct Scene {
    screen: Rectangle,
    background: Rgb565,
    objects: Vec<Object>,
    next_id: u32,
    invalid: Vec<Rectangle>,
}

impl Scene {
    /// Create an empty scene; the whole screen starts invalid
    pub fn new(width: u16, height: u16, background: Rgb565) -> Self {
        let mut scene = Self {
            screen: place(0, 0, width, height),
            background,
            objects: Vec::new(),
            next_id: 1,
            invalid: Vec::new(),
        };
        scene.invalidate_all();
        scene
    }

    pub fn width(&self) -> u16 {
        self.screen.size.width as u16
    }

    pub fn height(&self) -> u16 {
        self.screen.size.height as u16
    }

    #[allow(dead_code)]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Mark the full screen for redraw
    pub fn invalidate_all(&mut self) {
        self.invalidate(self.screen);
    }

    /// Mark an area for redraw; clipped to the screen
    pub fn invalidate(&mut self, area: Rectangle) {
        let mut area = area.intersection(&self.screen);
        if area.is_zero_sized() {
            return;
        }

        // Fold in every overlapping area until nothing else overlaps
        while let Some(pos) = self
            .invalid
            .iter()
            .position(|other| !other.intersection(&area).is_zero_sized())
        {
            area = envelope(&area, &self.invalid.swap_remove(pos));
        }
        self.invalid.push(area);
    }

    /// Whether anything is waiting to be redrawn
    pub fn is_dirty(&self) -> bool {
        !self.invalid.is_empty()
    }

    /// Drain the areas waiting to be redrawn
    pub fn take_invalidated(&mut self) -> Vec<DirtyRegion> {
        let mut areas: Vec<DirtyRegion> = std::mem::take(&mut self.invalid)
            .iter()
            .filter_map(DirtyRegion::from_rectangle)
            .collect();
        areas.sort_by_key(|a| (a.y1, a.x1));
        areas
    }

    fn invalidate_object(&mut self, idx: usize) {
        self.invalidate(self.objects[idx].rect);
    }

    fn find(&self, id: ObjectId) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }

    #[allow(dead_code)]
    pub fn set_background(&mut self, color: Rgb565) {
        if self.background != color {
            self.background = color;
            self.invalidate_all();
        }
    }

    /// Add a filled rectangle on top of the existing objects
    pub fn create_rect(&mut self, x: i32, y: i32, width: u16, height: u16, color: Rgb565) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(Object {
            id,
            rect: place(x, y, width, height),
            color,
        });
        self.invalidate_object(self.objects.len() - 1);
        id
    }

    pub fn set_color(&mut self, id: ObjectId, color: Rgb565) -> bool {
        let Some(idx) = self.find(id) else {
            return false;
        };
        if self.objects[idx].color != color {
            self.objects[idx].color = color;
            self.invalidate_object(idx);
        }
        true
    }

    pub fn move_to(&mut self, id: ObjectId, x: i32, y: i32) -> bool {
        let Some(idx) = self.find(id) else {
            return false;
        };
        self.invalidate_object(idx);
        let size = self.objects[idx].rect.size;
        self.objects[idx].rect = place(x, y, size.width as u16, size.height as u16);
        self.invalidate_object(idx);
        true
    }

    #[allow(dead_code)]
    pub fn resize(&mut self, id: ObjectId, width: u16, height: u16) -> bool {
        let Some(idx) = self.find(id) else {
            return false;
        };
        self.invalidate_object(idx);
        self.objects[idx].rect.size = Size::new(u32::from(width), u32::from(height));
        self.invalidate_object(idx);
        true
    }

    #[allow(dead_code)]
    pub fn delete(&mut self, id: ObjectId) -> bool {
        let Some(idx) = self.find(id) else {
            return false;
        };
        self.invalidate_object(idx);
        self.objects.remove(idx);
        true
    }

    /// Paint `area` into `out`, row-major with a stride of the area width
    pub fn render(&self, area: &DirtyRegion, out: &mut [Pixel]) {
        let mut target = BufferTarget::new(Rectangle::from(*area), out);
        let Ok(()) = target.clear(self.background);

        for object in &self.objects {
            let Ok(()) = object
                .rect
                .into_styled(PrimitiveStyle::with_fill(object.color))
                .draw(&mut target);
        }
    }
}
