//! The Win32 overlay window hosting the touch control.
//!
//! One overlay per bound game window, living on a dedicated background
//! thread that owns the message loop. That thread is the single UI thread of
//! the overlay: all style, region, and rect mutations happen here. Hook
//! callbacks never touch the window directly — they post `WM_APP_*` messages
//! that the loop drains.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use tracing::{error, info};
use windows::Win32::Foundation::{COLORREF, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, CreateSolidBrush, DeleteObject, Ellipse, EndPaint, FillRect, GetStockObject,
    HBRUSH, InvalidateRect, NULL_PEN, PAINTSTRUCT, SelectObject, UpdateWindow,
};
use windows::Win32::UI::HiDpi::GetDpiForWindow;
use windows::Win32::UI::Input::KeyboardAndMouse::{ReleaseCapture, SetCapture};
use windows::Win32::UI::WindowsAndMessaging::{
    CS_HREDRAW, CS_VREDRAW, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
    GWLP_USERDATA, GetMessageW, GetWindowLongPtrW, KillTimer, LWA_ALPHA, LWA_COLORKEY, MSG,
    PostMessageW, PostQuitMessage, RegisterClassW, SW_SHOW, SetLayeredWindowAttributes, SetTimer,
    SetWindowLongPtrW, ShowWindow, TranslateMessage, WM_APP, WM_CAPTURECHANGED, WM_CLOSE,
    WM_DESTROY, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MOUSEMOVE, WM_NCDESTROY, WM_PAINT, WM_RBUTTONUP,
    WM_TIMER, WNDCLASSW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_POPUP,
};
use windows::core::PCWSTR;

use crate::geometry::{ClientSize, Point, Rect};
use crate::locator::WindowHandle;
use crate::overlay::binder::OverlayBinder;
use crate::overlay::dock::{DockSurface, TouchDockController};

/// Posted by the size-change hook; `WPARAM`/`LPARAM` carry the new client
/// width/height in device pixels.
pub const WM_APP_TARGET_RESIZED: u32 = WM_APP + 1;
/// Posted by the destroy hook when the game window is gone.
pub const WM_APP_TARGET_DESTROYED: u32 = WM_APP + 2;

const ANIMATION_TIMER: usize = 1;
const ANIMATION_TICK_MS: u32 = 10;

/// Pixels of this color are fully transparent via the layered color key, so
/// only the touch control itself is ever visible.
const KEY_COLOR: COLORREF = COLORREF(0x00FF00FF);
const TOUCH_COLOR: COLORREF = COLORREF(0x00404040);
const OVERLAY_ALPHA: u8 = 210;

/// Global window class atom — registered once, reused by every overlay window.
static mut WINDOW_CLASS_ATOM: u16 = 0;

#[derive(Clone, Copy, Debug)]
pub struct OverlayOptions {
    /// Side length of the square touch control, logical pixels.
    pub touch_size: f64,
    /// Synthesize a release when a drag escapes the container.
    pub throw_on_boundary: bool,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            touch_size: 64.0,
            throw_on_boundary: false,
        }
    }
}

// ─── Dock surface backed by the live window ─────────────────────────────────

/// First fatal error raised on the overlay thread after a successful bind.
///
/// Shared between the surface (which records) and `run_overlay` (which
/// returns it once the message loop drains, so the process exits nonzero).
#[derive(Clone, Default)]
struct FatalError(Rc<RefCell<Option<anyhow::Error>>>);

impl FatalError {
    /// Record `err` unless an earlier fatal error is already pending.
    fn set(&self, err: anyhow::Error) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.0.borrow_mut().take()
    }
}

struct Win32Surface {
    overlay: WindowHandle,
    binder: Rc<RefCell<OverlayBinder>>,
    fatal: FatalError,
    /// DPI of the monitor the bound window currently occupies; refreshed on
    /// every target resize since the window may have changed monitors.
    dpi_scale: f64,
}

impl Win32Surface {
    /// Region failures leave the overlay half-masked, which is unrecoverable
    /// for this instance — record the error and tear the overlay down.
    fn abort(&self, err: anyhow::Error) {
        error!("observable region update failed: {err:#}");
        self.fatal.set(err.context("updating observable region"));
        unsafe {
            let _ = PostMessageW(Some(self.overlay.hwnd()), WM_CLOSE, WPARAM(0), LPARAM(0));
        }
    }
}

impl DockSurface for Win32Surface {
    fn invalidate(&mut self) {
        unsafe {
            let _ = InvalidateRect(Some(self.overlay.hwnd()), None, true);
        }
    }

    fn set_observable_region(&mut self, rect: Rect) {
        // DPI correction happens here and only here; the controller works in
        // logical units throughout.
        let physical = rect.to_physical(self.dpi_scale);
        if let Err(e) = self.binder.borrow().set_observable_region(physical) {
            self.abort(e);
        }
    }

    fn reset_observable_region(&mut self) {
        if let Err(e) = self.binder.borrow().reset_observable_region() {
            self.abort(e);
        }
    }

    fn set_pointer_capture(&mut self, captured: bool) {
        unsafe {
            if captured {
                let _ = SetCapture(self.overlay.hwnd());
            } else {
                let _ = ReleaseCapture();
            }
        }
    }

    fn set_animating(&mut self, active: bool) {
        unsafe {
            if active {
                let _ = SetTimer(
                    Some(self.overlay.hwnd()),
                    ANIMATION_TIMER,
                    ANIMATION_TICK_MS,
                    None,
                );
            } else {
                let _ = KillTimer(Some(self.overlay.hwnd()), ANIMATION_TIMER);
            }
        }
    }
}

/// Everything one overlay instance owns, boxed behind `GWLP_USERDATA`.
struct OverlayRuntime {
    binder: Rc<RefCell<OverlayBinder>>,
    controller: TouchDockController,
    surface: Win32Surface,
}

fn runtime_from(hwnd: HWND) -> Option<&'static mut OverlayRuntime> {
    let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut OverlayRuntime;
    unsafe { ptr.as_mut() }
}

fn mouse_point(lparam: LPARAM, dpi_scale: f64) -> Point {
    let x = (lparam.0 & 0xFFFF) as i16 as f64;
    let y = ((lparam.0 >> 16) & 0xFFFF) as i16 as f64;
    Point::new(x / dpi_scale, y / dpi_scale)
}

// ─── Window procedure ───────────────────────────────────────────────────────

unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_PAINT => {
            if let Some(runtime) = runtime_from(hwnd) {
                paint(hwnd, runtime);
            } else {
                unsafe {
                    let mut ps = PAINTSTRUCT::default();
                    let _ = BeginPaint(hwnd, &mut ps);
                    let _ = EndPaint(hwnd, &ps);
                }
            }
            LRESULT(0)
        }
        WM_LBUTTONDOWN => {
            if let Some(runtime) = runtime_from(hwnd) {
                let point = mouse_point(lparam, runtime.surface.dpi_scale);
                runtime.controller.on_press(point, &mut runtime.surface);
            }
            LRESULT(0)
        }
        WM_MOUSEMOVE => {
            if let Some(runtime) = runtime_from(hwnd) {
                let point = mouse_point(lparam, runtime.surface.dpi_scale);
                runtime
                    .controller
                    .on_move(point, &mut runtime.surface, Instant::now());
            }
            LRESULT(0)
        }
        WM_LBUTTONUP => {
            if let Some(runtime) = runtime_from(hwnd) {
                runtime
                    .controller
                    .on_release(&mut runtime.surface, Instant::now());
            }
            LRESULT(0)
        }
        WM_CAPTURECHANGED => {
            // Losing capture to another window ends the gesture like a
            // release would; idempotent when we released it ourselves.
            if let Some(runtime) = runtime_from(hwnd) {
                runtime
                    .controller
                    .on_release(&mut runtime.surface, Instant::now());
            }
            LRESULT(0)
        }
        WM_TIMER if wparam.0 == ANIMATION_TIMER => {
            if let Some(runtime) = runtime_from(hwnd) {
                runtime
                    .controller
                    .on_tick(&mut runtime.surface, Instant::now());
            }
            LRESULT(0)
        }
        // Right-click on the control is the user close gesture.
        WM_RBUTTONUP => {
            if let Some(runtime) = runtime_from(hwnd) {
                let point = mouse_point(lparam, runtime.surface.dpi_scale);
                if runtime.controller.touch_rect().contains(point) {
                    unsafe {
                        let _ = DestroyWindow(hwnd);
                    }
                }
            }
            LRESULT(0)
        }
        WM_APP_TARGET_RESIZED => {
            if let Some(runtime) = runtime_from(hwnd) {
                let size = ClientSize::new(wparam.0 as i32, lparam.0 as i32);
                runtime.surface.dpi_scale = dpi_scale_for(hwnd);
                if let Err(e) = runtime.binder.borrow().resize(size) {
                    error!("overlay resize failed: {e:#}");
                }
                let logical = size.to_logical(runtime.surface.dpi_scale);
                runtime
                    .controller
                    .on_container_resize(logical, &mut runtime.surface);
            }
            LRESULT(0)
        }
        WM_APP_TARGET_DESTROYED => {
            info!("game window destroyed, closing overlay");
            unsafe {
                let _ = DestroyWindow(hwnd);
            }
            LRESULT(0)
        }
        WM_DESTROY => {
            if let Some(runtime) = runtime_from(hwnd) {
                runtime.binder.borrow_mut().close();
            }
            unsafe {
                let _ = KillTimer(Some(hwnd), ANIMATION_TIMER);
                PostQuitMessage(0);
            }
            LRESULT(0)
        }
        WM_NCDESTROY => {
            let ptr = unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) } as *mut OverlayRuntime;
            if !ptr.is_null() {
                drop(unsafe { Box::from_raw(ptr) });
            }
            unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
        }
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

fn paint(hwnd: HWND, runtime: &OverlayRuntime) {
    unsafe {
        let mut ps = PAINTSTRUCT::default();
        let hdc = BeginPaint(hwnd, &mut ps);
        if hdc.is_invalid() {
            return;
        }

        // Key-colored background is invisible; only the control shows.
        let background = CreateSolidBrush(KEY_COLOR);
        if !background.is_invalid() {
            let _ = FillRect(hdc, &ps.rcPaint, background);
            let _ = DeleteObject(background.into());
        }

        let rect = runtime
            .controller
            .touch_rect()
            .to_physical(runtime.surface.dpi_scale);
        let brush = CreateSolidBrush(TOUCH_COLOR);
        if !brush.is_invalid() {
            let old_brush = SelectObject(hdc, brush.into());
            let old_pen = SelectObject(hdc, GetStockObject(NULL_PEN));
            let _ = Ellipse(hdc, rect.left, rect.top, rect.right, rect.bottom);
            SelectObject(hdc, old_pen);
            SelectObject(hdc, old_brush);
            let _ = DeleteObject(brush.into());
        }

        let _ = EndPaint(hwnd, &ps);
    }
}

fn dpi_scale_for(hwnd: HWND) -> f64 {
    let dpi = unsafe { GetDpiForWindow(hwnd) };
    if dpi == 0 { 1.0 } else { dpi as f64 / 96.0 }
}

// ─── Class registration ─────────────────────────────────────────────────────

/// Register the `GameTouchOverlayClass` window class.
///
/// This is idempotent — the class is only registered on the first call.
pub unsafe fn register_overlay_class() -> anyhow::Result<()> {
    if unsafe { WINDOW_CLASS_ATOM } != 0 {
        return Ok(());
    }

    let hinstance = windows::Win32::Foundation::HINSTANCE(std::ptr::null_mut());
    let class_name: Vec<u16> = "GameTouchOverlayClass\0".encode_utf16().collect();

    let wc = WNDCLASSW {
        lpfnWndProc: Some(wnd_proc),
        hInstance: hinstance,
        lpszClassName: PCWSTR(class_name.as_ptr()),
        style: CS_HREDRAW | CS_VREDRAW,
        hbrBackground: HBRUSH(std::ptr::null_mut()),
        ..Default::default()
    };

    let atom = unsafe { RegisterClassW(&wc) };
    if atom == 0 {
        return Err(anyhow!("failed to register overlay window class"));
    }

    unsafe {
        WINDOW_CLASS_ATOM = atom;
    }
    Ok(())
}

// ─── Window creation + message loop ─────────────────────────────────────────

/// Create the overlay, bind it to the target game window, and run its
/// message loop **on the current thread** until the overlay closes.
fn run_overlay(target: WindowHandle, options: OverlayOptions) -> anyhow::Result<()> {
    unsafe {
        let hinstance = windows::Win32::Foundation::HINSTANCE(std::ptr::null_mut());
        let class_name: Vec<u16> = "GameTouchOverlayClass\0".encode_utf16().collect();
        let window_name: Vec<u16> = "Game Touch Overlay\0".encode_utf16().collect();

        // Starts as a plain popup; the binder strips this down to a
        // borderless child of the target.
        let hwnd = CreateWindowExW(
            WS_EX_LAYERED | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE,
            PCWSTR(class_name.as_ptr()),
            PCWSTR(window_name.as_ptr()),
            WS_POPUP,
            0,
            0,
            0,
            0,
            None,
            None,
            Some(hinstance),
            None,
        )?;
        let overlay = WindowHandle::from_hwnd(hwnd);

        let binder = Rc::new(RefCell::new(OverlayBinder::new(overlay, target)));
        if let Err(e) = binder.borrow_mut().bind() {
            let _ = DestroyWindow(hwnd);
            return Err(e.context("binding overlay to game window"));
        }

        let dpi_scale = dpi_scale_for(hwnd);
        let container = binder
            .borrow()
            .target_client_size()
            .context("reading initial container size")?;
        let mut controller = TouchDockController::new(
            container.to_logical(dpi_scale),
            options.touch_size,
            options.throw_on_boundary,
        );
        let fatal = FatalError::default();
        let mut surface = Win32Surface {
            overlay,
            binder: binder.clone(),
            fatal: fatal.clone(),
            dpi_scale,
        };
        controller.publish_region(&mut surface);

        let runtime = Box::new(OverlayRuntime {
            binder,
            controller,
            surface,
        });
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, Box::into_raw(runtime) as isize);

        let _ =
            SetLayeredWindowAttributes(hwnd, KEY_COLOR, OVERLAY_ALPHA, LWA_ALPHA | LWA_COLORKEY);
        let _ = ShowWindow(hwnd, SW_SHOW);
        let _ = UpdateWindow(hwnd);

        // Run the message loop until the overlay is destroyed: by the game
        // window going away, by the user's close gesture, or by a fatal
        // region failure.
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        // A loop drained by a recorded fatal error is a failed binding, not
        // a graceful close.
        match fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ─── Thread helper ──────────────────────────────────────────────────────────

/// Spawn the overlay for a located game window on a dedicated background
/// thread. The thread exits when the overlay closes; a bind failure is
/// returned through the [`JoinHandle`] and is fatal to the process.
pub fn spawn_overlay(
    target: WindowHandle,
    options: OverlayOptions,
) -> std::thread::JoinHandle<anyhow::Result<()>> {
    std::thread::spawn(move || run_overlay(target, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_slot_keeps_the_first_error() {
        let fatal = FatalError::default();
        assert!(fatal.take().is_none());

        fatal.set(anyhow!("region update failed"));
        fatal.set(anyhow!("later failure"));

        let err = fatal.take().expect("first error should be recorded");
        assert!(err.to_string().contains("region update failed"));
        // Draining empties the slot.
        assert!(fatal.take().is_none());
    }

    #[test]
    fn fatal_error_is_shared_across_clones() {
        let fatal = FatalError::default();
        let surface_side = fatal.clone();
        surface_side.set(anyhow!("masking failed"));
        assert!(fatal.take().is_some());
    }
}
