//! Binds the overlay window to the game window.
//!
//! Per overlay instance: `Detached → StyleAdjusted → Parented → Bound →
//! Closed`. Every native call in the forward transitions is fatal on
//! failure — a half-bound overlay left as a top-level window is a visible,
//! flickering bug, so the bind attempt aborts instead of continuing.

use std::sync::Arc;

use anyhow::{Context, bail, ensure};
use tracing::debug;
use windows::Win32::Foundation::{LPARAM, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{CreateRectRgn, SetWindowRgn};
use windows::Win32::UI::WindowsAndMessaging::{
    GWL_EXSTYLE, GWL_STYLE, GetClientRect, GetWindowLongPtrW, MoveWindow, PostMessageW, SetParent,
    SetWindowLongPtrW, SetWindowPos, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER, WS_CAPTION, WS_CHILD, WS_EX_LAYERED, WS_MAXIMIZEBOX, WS_MINIMIZEBOX, WS_POPUP,
    WS_SYSMENU, WS_THICKFRAME,
};

use crate::geometry::{ClientSize, PhysicalRect};
use crate::hook::{Subscription, watch_destroy, watch_size};
use crate::locator::WindowHandle;
use crate::overlay::window::{WM_APP_TARGET_DESTROYED, WM_APP_TARGET_RESIZED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindState {
    Detached,
    StyleAdjusted,
    Parented,
    Bound,
    Closed,
}

pub struct OverlayBinder {
    overlay: WindowHandle,
    target: WindowHandle,
    state: BindState,
    subscriptions: Vec<Subscription>,
}

impl OverlayBinder {
    pub fn new(overlay: WindowHandle, target: WindowHandle) -> Self {
        Self {
            overlay,
            target,
            state: BindState::Detached,
            subscriptions: Vec::new(),
        }
    }

    /// Run the full bind sequence. On success the overlay is a borderless
    /// child of the target, kept in sync with its client size.
    pub fn bind(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.state == BindState::Detached,
            "bind called in state {:?}",
            self.state
        );
        self.adjust_style().context("adjusting overlay style")?;
        self.state = BindState::StyleAdjusted;
        self.reparent().context("reparenting overlay")?;
        self.state = BindState::Parented;
        self.wire_events().context("wiring target window events")?;
        self.state = BindState::Bound;
        debug!(hwnd = self.target.0, "overlay bound");
        Ok(())
    }

    /// Strip top-level decorations, mark the overlay as a child, and add the
    /// layered bit required for region masking to render correctly.
    fn adjust_style(&self) -> anyhow::Result<()> {
        let hwnd = self.overlay.hwnd();
        unsafe {
            let style = GetWindowLongPtrW(hwnd, GWL_STYLE);
            if style == 0 {
                bail!("GetWindowLongPtrW(GWL_STYLE): {}", last_error());
            }
            let top_level = (WS_POPUP
                | WS_CAPTION
                | WS_THICKFRAME
                | WS_SYSMENU
                | WS_MINIMIZEBOX
                | WS_MAXIMIZEBOX)
                .0 as isize;
            let child_style = (style & !top_level) | WS_CHILD.0 as isize;
            if SetWindowLongPtrW(hwnd, GWL_STYLE, child_style) == 0 {
                bail!("SetWindowLongPtrW(GWL_STYLE): {}", last_error());
            }

            let ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);
            if SetWindowLongPtrW(hwnd, GWL_EXSTYLE, ex_style | WS_EX_LAYERED.0 as isize) == 0 {
                bail!("SetWindowLongPtrW(GWL_EXSTYLE): {}", last_error());
            }

            // Style changes only take effect after a frame-changed poke.
            SetWindowPos(
                hwnd,
                None,
                0,
                0,
                0,
                0,
                SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }

    /// Make the target window the overlay's native parent and size the
    /// overlay to its client area. From here on the overlay's coordinates
    /// are relative to the target's client origin.
    fn reparent(&self) -> anyhow::Result<()> {
        unsafe {
            SetParent(self.overlay.hwnd(), Some(self.target.hwnd()))?;
        }
        let size = self.target_client_size()?;
        self.resize(size)?;
        Ok(())
    }

    fn wire_events(&mut self) -> anyhow::Result<()> {
        let overlay = self.overlay;
        let size_sub = watch_size(
            self.target,
            Arc::new(move |size: ClientSize| unsafe {
                // Hook thread: marshal onto the overlay's message loop.
                let _ = PostMessageW(
                    Some(overlay.hwnd()),
                    WM_APP_TARGET_RESIZED,
                    WPARAM(size.width as usize),
                    LPARAM(size.height as isize),
                );
            }),
        )
        .context("installing size-change hook")?;

        let destroy_sub = watch_destroy(
            self.target,
            Arc::new(move || unsafe {
                let _ = PostMessageW(
                    Some(overlay.hwnd()),
                    WM_APP_TARGET_DESTROYED,
                    WPARAM(0),
                    LPARAM(0),
                );
            }),
        )
        .context("installing destroy hook")?;

        self.subscriptions.push(size_sub);
        self.subscriptions.push(destroy_sub);
        Ok(())
    }

    pub fn target_client_size(&self) -> anyhow::Result<ClientSize> {
        let mut rect = RECT::default();
        unsafe { GetClientRect(self.target.hwnd(), &mut rect) }
            .context("reading target client rect")?;
        Ok(ClientSize::new(
            rect.right - rect.left,
            rect.bottom - rect.top,
        ))
    }

    /// Match the overlay's client area to the target's. Position is implicit:
    /// a child at the parent's client origin.
    pub fn resize(&self, size: ClientSize) -> anyhow::Result<()> {
        unsafe {
            MoveWindow(self.overlay.hwnd(), 0, 0, size.width, size.height, true)
                .context("resizing overlay")?;
        }
        Ok(())
    }

    /// Mask the overlay so only `rect` (overlay physical pixels) is painted
    /// and receives pointer input; everything else is click-through.
    pub fn set_observable_region(&self, rect: PhysicalRect) -> anyhow::Result<()> {
        unsafe {
            let region = CreateRectRgn(rect.left, rect.top, rect.right, rect.bottom);
            if region.is_invalid() {
                bail!("CreateRectRgn failed");
            }
            // On success the system owns the region handle.
            if SetWindowRgn(self.overlay.hwnd(), Some(region), true) == 0 {
                bail!("SetWindowRgn failed");
            }
        }
        Ok(())
    }

    /// Remove the mask so the whole client area is observable.
    pub fn reset_observable_region(&self) -> anyhow::Result<()> {
        unsafe {
            if SetWindowRgn(self.overlay.hwnd(), None, true) == 0 {
                bail!("SetWindowRgn(reset) failed");
            }
        }
        Ok(())
    }

    /// Release all OS hooks. Entered whenever the overlay closes; leaking a
    /// hook past the window's lifetime corrupts later handle lookups.
    pub fn close(&mut self) {
        self.subscriptions.clear();
        self.state = BindState::Closed;
    }
}

fn last_error() -> windows::core::Error {
    windows::core::Error::from_win32()
}
