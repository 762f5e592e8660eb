/// A point in overlay-local logical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width/height of a drawable area in logical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in logical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    /// The same rectangle scaled into physical pixels, rounded outward-safe.
    pub fn to_physical(&self, dpi_scale: f64) -> PhysicalRect {
        PhysicalRect {
            left: (self.x * dpi_scale).floor() as i32,
            top: (self.y * dpi_scale).floor() as i32,
            right: ((self.x + self.width) * dpi_scale).ceil() as i32,
            bottom: ((self.y + self.height) * dpi_scale).ceil() as i32,
        }
    }
}

/// A rectangle in overlay physical-pixel space, as handed to the OS region
/// mask. Edges, not origin + extent, because that is what `CreateRectRgn`
/// consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysicalRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Client-area dimensions of a native window, in device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ClientSize {
    pub width: i32,
    pub height: i32,
}

impl ClientSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Logical size under the given DPI scale.
    pub fn to_logical(&self, dpi_scale: f64) -> Size {
        Size::new(self.width as f64 / dpi_scale, self.height as f64 / dpi_scale)
    }
}

/// Which edge or corner of the container a docked touch control rests on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    Left,
    Top,
    Right,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Symbolic dock position: a corner, or a fractional point along an edge.
///
/// `scale` is the normalized position along the edge (fraction of container
/// height for `Left`/`Right`, width for `Top`/`Bottom`) and is meaningful
/// only for those four edge values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchDockAnchor {
    pub corner: Corner,
    pub scale: f64,
}

impl TouchDockAnchor {
    pub fn corner(corner: Corner) -> Self {
        Self { corner, scale: 0.0 }
    }

    pub fn edge(corner: Corner, scale: f64) -> Self {
        Self { corner, scale }
    }
}
