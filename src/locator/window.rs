//! Good-window search.
//!
//! A freshly launched game usually puts up a splash or placeholder window
//! before the real content window exists; we keep polling the process's
//! windows until one has a client area big enough to be the game itself.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{LaunchError, LaunchResult};
use crate::geometry::ClientSize;

/// Opaque native window identifier. Never owned by this crate; validity can
/// go stale at any moment, so every use must tolerate failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub fn hwnd(self) -> windows::Win32::Foundation::HWND {
        windows::Win32::Foundation::HWND(self.0 as *mut core::ffi::c_void)
    }

    pub fn from_hwnd(hwnd: windows::Win32::Foundation::HWND) -> Self {
        Self(hwnd.0 as isize)
    }
}

/// Read-only view of a running process's windows, so the search loop can be
/// exercised in tests without a live process.
pub trait ProcessView {
    fn is_alive(&self) -> bool;
    /// The process's primary (visible, unowned) top-level window, if any.
    fn main_window(&self) -> Option<WindowHandle>;
    /// Every top-level and child window currently belonging to the process.
    fn windows(&self) -> Vec<WindowHandle>;
    fn client_size(&self, window: WindowHandle) -> Option<ClientSize>;
}

/// Minimum client area for a window to count as the real game content
/// window rather than a splash screen.
const GOOD_MIN_WIDTH: i32 = 320;
const GOOD_MIN_HEIGHT: i32 = 240;

const POLL_INTERVAL: Duration = Duration::from_millis(16);

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

pub fn is_good_client_size(size: ClientSize) -> bool {
    size.width > GOOD_MIN_WIDTH && size.height > GOOD_MIN_HEIGHT
}

/// Find a content-sized window belonging to the process.
///
/// Checks the primary window first, then re-enumerates all of the process's
/// windows every 16 ms until one qualifies or `timeout` elapses. Liveness is
/// re-checked every iteration so a dead process fails fast instead of being
/// polled until the deadline.
pub fn find_good_window(view: &impl ProcessView, timeout: Duration) -> LaunchResult<WindowHandle> {
    let main = view.main_window().ok_or(LaunchError::ProcessPendingExit)?;

    if view.client_size(main).is_some_and(is_good_client_size) {
        return Ok(main);
    }

    let deadline = Instant::now() + timeout;
    loop {
        if !view.is_alive() {
            return Err(LaunchError::ProcessExited);
        }

        for window in view.windows() {
            if view.client_size(window).is_some_and(is_good_client_size) {
                return Ok(window);
            }
        }

        if Instant::now() >= deadline {
            return Err(LaunchError::WindowHandleNotFound);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
