pub mod dock;
pub mod types;

pub use dock::{TOUCH_SPACE, dock_rect, final_touch_position, is_beyond_boundary, last_dock_anchor};
pub use types::{ClientSize, Corner, PhysicalRect, Point, Rect, Size, TouchDockAnchor};
