pub mod binder;
pub mod dock;
pub mod window;

pub use binder::OverlayBinder;
pub use window::{OverlayOptions, register_overlay_class, spawn_overlay};
