//! WinEvent hook wrapper for a single target window.
//!
//! Exposes two notification streams per target handle: size/location changes
//! (deduplicated, with the current size emitted synchronously at subscribe
//! time) and destruction. The OS invokes out-of-context hook callbacks on a
//! thread it manages, so callbacks here must be `Send` and must never touch
//! window state directly — the overlay layer passes closures that only post
//! messages back to the owning thread.
//!
//! `SetWinEventHook` carries no user data, so subscriptions live in a global
//! registry keyed by the raw target handle. A handle is single-use: once the
//! target is destroyed, re-subscribing the same handle is unsupported.
//! Callbacks are always invoked with the registry lock released, so they may
//! re-enter this module.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    EVENT_OBJECT_DESTROY, EVENT_OBJECT_LOCATIONCHANGE, GetClientRect, GetWindowThreadProcessId,
    OBJID_WINDOW, WINEVENT_OUTOFCONTEXT,
};

use crate::geometry::ClientSize;
use crate::locator::WindowHandle;

type SizeCallback = Arc<dyn Fn(ClientSize) + Send + Sync>;
type DestroyCallback = Arc<dyn Fn() + Send + Sync>;

/// Suppresses duplicate size emissions.
#[derive(Default)]
pub struct SizeTracker {
    last: Option<ClientSize>,
}

impl SizeTracker {
    /// Returns the size if it differs from the last accepted one.
    pub fn accept(&mut self, size: ClientSize) -> Option<ClientSize> {
        if self.last == Some(size) {
            return None;
        }
        self.last = Some(size);
        Some(size)
    }
}

struct WatchEntry {
    tracker: SizeTracker,
    on_size: Option<(isize, SizeCallback)>,
    on_destroy: Option<(isize, DestroyCallback)>,
}

impl WatchEntry {
    fn empty() -> Self {
        Self {
            tracker: SizeTracker::default(),
            on_size: None,
            on_destroy: None,
        }
    }
}

static WATCHERS: Mutex<Option<HashMap<isize, WatchEntry>>> = Mutex::new(None);

fn with_watchers<R>(f: impl FnOnce(&mut HashMap<isize, WatchEntry>) -> R) -> R {
    let mut guard = WATCHERS.lock().unwrap();
    f(guard.get_or_insert_with(HashMap::new))
}

fn client_size_of(hwnd: HWND) -> Option<ClientSize> {
    let mut rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut rect) }.ok()?;
    Some(ClientSize::new(
        rect.right - rect.left,
        rect.bottom - rect.top,
    ))
}

/// True when the event describes the window itself rather than a child
/// object, cursor, or caret inside it.
fn is_window_event(id_object: i32, id_child: i32) -> bool {
    id_object == OBJID_WINDOW.0 && id_child == 0
}

/// Deliver one location-change observation. The tracker update happens under
/// the registry lock; the callback is cloned out and runs with the lock
/// released.
fn notify_location_change(key: isize, size: ClientSize) {
    let emit = with_watchers(|watchers| {
        let entry = watchers.get_mut(&key)?;
        let size = entry.tracker.accept(size)?;
        entry
            .on_size
            .as_ref()
            .map(|(_, callback)| (callback.clone(), size))
    });
    if let Some((callback, size)) = emit {
        callback(size);
    }
}

unsafe extern "system" fn location_proc(
    _hook: HWINEVENTHOOK,
    _event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _thread: u32,
    _time: u32,
) {
    if !is_window_event(id_object, id_child) {
        return;
    }
    let Some(size) = client_size_of(hwnd) else {
        return;
    };
    notify_location_change(hwnd.0 as isize, size);
}

unsafe extern "system" fn destroy_proc(
    _hook: HWINEVENTHOOK,
    _event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _thread: u32,
    _time: u32,
) {
    if !is_window_event(id_object, id_child) {
        return;
    }
    let key = hwnd.0 as isize;
    // Take the callback out so destruction is reported exactly once.
    let callback = with_watchers(|watchers| {
        watchers
            .get_mut(&key)
            .and_then(|entry| entry.on_destroy.take())
    });
    if let Some((hook, callback)) = callback {
        debug!(hwnd = key, "target window destroyed");
        callback();
        unsafe {
            let _ = UnhookWinEvent(HWINEVENTHOOK(hook as *mut core::ffi::c_void));
        }
    }
}

fn install_hook(
    event: u32,
    target: WindowHandle,
    proc: unsafe extern "system" fn(HWINEVENTHOOK, u32, HWND, i32, i32, u32, u32),
) -> Option<isize> {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(target.hwnd(), Some(&mut pid)) };
    let hook =
        unsafe { SetWinEventHook(event, event, None, Some(proc), pid, 0, WINEVENT_OUTOFCONTEXT) };
    if hook.is_invalid() {
        warn!(event, "SetWinEventHook failed");
        return None;
    }
    Some(hook.0 as isize)
}

#[derive(Clone, Copy)]
enum WatchKind {
    Size,
    Destroy,
}

/// RAII guard for one hook subscription; dropping it unregisters the OS hook
/// and releases the registry slot. Leaking a hook past the window's lifetime
/// corrupts later lookups when the OS reuses the handle value.
pub struct Subscription {
    target: isize,
    kind: WatchKind,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let hook = with_watchers(|watchers| {
            let entry = watchers.get_mut(&self.target)?;
            let hook = match self.kind {
                WatchKind::Size => entry.on_size.take().map(|(h, _)| h),
                WatchKind::Destroy => entry.on_destroy.take().map(|(h, _)| h),
            };
            if entry.on_size.is_none() && entry.on_destroy.is_none() {
                watchers.remove(&self.target);
            }
            hook
        });
        if let Some(hook) = hook {
            unsafe {
                let _ = UnhookWinEvent(HWINEVENTHOOK(hook as *mut core::ffi::c_void));
            }
        }
    }
}

/// Watch the target's client size.
///
/// Emits the current size synchronously before returning (even if no OS event
/// has fired yet), then again on every location change that produces a new
/// client size. Must be called on a thread that pumps messages.
pub fn watch_size(target: WindowHandle, callback: SizeCallback) -> Option<Subscription> {
    let hook = install_hook(EVENT_OBJECT_LOCATIONCHANGE, target, location_proc)?;
    register_size_watch(target.0, hook, client_size_of(target.hwnd()), callback);
    Some(Subscription {
        target: target.0,
        kind: WatchKind::Size,
    })
}

/// Prime the tracker with the current size, register the callback, then emit
/// that size exactly once — after the lock is released, so the first OS event
/// reporting the same size deduplicates against it.
fn register_size_watch(
    key: isize,
    hook: isize,
    initial: Option<ClientSize>,
    callback: SizeCallback,
) {
    with_watchers(|watchers| {
        let entry = watchers.entry(key).or_insert_with(WatchEntry::empty);
        if let Some(size) = initial {
            entry.tracker.accept(size);
        }
        entry.on_size = Some((hook, callback.clone()));
    });
    if let Some(size) = initial {
        callback(size);
    }
}

/// Watch for the target window's destruction; fires at most once.
pub fn watch_destroy(target: WindowHandle, callback: DestroyCallback) -> Option<Subscription> {
    let hook = install_hook(EVENT_OBJECT_DESTROY, target, destroy_proc)?;
    with_watchers(|watchers| {
        let entry = watchers.entry(target.0).or_insert_with(WatchEntry::empty);
        entry.on_destroy = Some((hook, callback));
    });
    Some(Subscription {
        target: target.0,
        kind: WatchKind::Destroy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_emits_first_size() {
        let mut tracker = SizeTracker::default();
        assert_eq!(
            tracker.accept(ClientSize::new(640, 480)),
            Some(ClientSize::new(640, 480))
        );
    }

    #[test]
    fn tracker_suppresses_duplicates() {
        let mut tracker = SizeTracker::default();
        tracker.accept(ClientSize::new(640, 480));
        assert_eq!(tracker.accept(ClientSize::new(640, 480)), None);
        assert_eq!(
            tracker.accept(ClientSize::new(800, 600)),
            Some(ClientSize::new(800, 600))
        );
        // Returning to a previously seen size still counts as a change.
        assert_eq!(
            tracker.accept(ClientSize::new(640, 480)),
            Some(ClientSize::new(640, 480))
        );
    }

    #[test]
    fn window_event_filter() {
        assert!(is_window_event(OBJID_WINDOW.0, 0));
        assert!(!is_window_event(OBJID_WINDOW.0, 3));
        assert!(!is_window_event(-4, 0)); // OBJID_CLIENT and friends
    }

    // Fake registry keys; negative values never collide with real handles,
    // and each test uses its own so they can run in parallel.

    fn recording_callback() -> (SizeCallback, Arc<Mutex<Vec<ClientSize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: SizeCallback = Arc::new(move |size| sink.lock().unwrap().push(size));
        (callback, seen)
    }

    #[test]
    fn subscribing_emits_current_size_immediately() {
        let key = -101;
        let (callback, seen) = recording_callback();
        register_size_watch(key, 0, Some(ClientSize::new(640, 480)), callback);
        assert_eq!(*seen.lock().unwrap(), vec![ClientSize::new(640, 480)]);
        with_watchers(|watchers| watchers.remove(&key));
    }

    #[test]
    fn initial_emission_dedups_the_first_matching_event() {
        let key = -102;
        let (callback, seen) = recording_callback();
        register_size_watch(key, 0, Some(ClientSize::new(640, 480)), callback);

        // The first OS event usually reports the size we already emitted.
        notify_location_change(key, ClientSize::new(640, 480));
        assert_eq!(seen.lock().unwrap().len(), 1);

        notify_location_change(key, ClientSize::new(800, 600));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ClientSize::new(640, 480), ClientSize::new(800, 600)]
        );
        with_watchers(|watchers| watchers.remove(&key));
    }

    #[test]
    fn unknown_current_size_emits_nothing_at_subscribe() {
        let key = -103;
        let (callback, seen) = recording_callback();
        register_size_watch(key, 0, None, callback);
        assert!(seen.lock().unwrap().is_empty());

        // The first event then passes through untracked.
        notify_location_change(key, ClientSize::new(640, 480));
        assert_eq!(*seen.lock().unwrap(), vec![ClientSize::new(640, 480)]);
        with_watchers(|watchers| watchers.remove(&key));
    }

    #[test]
    fn callbacks_run_with_the_registry_unlocked() {
        let key = -104;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: SizeCallback = Arc::new(move |size| {
            // Re-entering the registry from a callback must not deadlock.
            let _ = with_watchers(|watchers| watchers.len());
            sink.lock().unwrap().push(size);
        });
        register_size_watch(key, 0, Some(ClientSize::new(640, 480)), callback);
        notify_location_change(key, ClientSize::new(800, 600));
        assert_eq!(seen.lock().unwrap().len(), 2);
        with_watchers(|watchers| watchers.remove(&key));
    }
}
