pub mod process;
pub mod window;

pub use process::{DEFAULT_LAUNCH_TIMEOUT, GameProcess, launch_or_attach, resolve_target};
pub use window::{DEFAULT_SEARCH_TIMEOUT, ProcessView, WindowHandle, find_good_window};
