//! Game process launch/attach and liveness.
//!
//! Resolves the target path (following `.lnk` shortcuts), reuses an already
//! running instance when one matches the executable path, and otherwise
//! spawns the game with its own folder as working directory — several games
//! resolve assets relative to the process CWD and break without this.

use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, LPARAM, STILL_ACTIVE};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
    CoUninitialize, IPersistFile, STGM_READ,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
    QueryFullProcessImageNameW,
};
use windows::Win32::UI::Shell::{IShellLinkW, ShellLink};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GA_ROOTOWNER, GetAncestor, GetClientRect,
    GetWindowThreadProcessId, IsIconic, IsWindowVisible, SW_RESTORE, SetForegroundWindow,
    ShowWindow,
};
use windows::core::{BOOL, Interface, PCWSTR, PWSTR};

use crate::error::{LaunchError, LaunchResult};
use crate::geometry::ClientSize;
use crate::locator::window::{ProcessView, WindowHandle};

const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A running game process we either launched or attached to.
///
/// Holds a query-only process handle for liveness checks; the handle is
/// closed on drop.
pub struct GameProcess {
    pid: u32,
    handle: HANDLE,
}

impl GameProcess {
    /// Open a query-only handle to an existing process.
    pub fn open(pid: u32) -> Option<Self> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }.ok()?;
        Some(Self { pid, handle })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Full path of the process image, if it can still be queried.
    pub fn exe_path(&self) -> Option<PathBuf> {
        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        unsafe {
            QueryFullProcessImageNameW(
                self.handle,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            )
        }
        .ok()?;
        Some(PathBuf::from(String::from_utf16_lossy(
            &buf[..len as usize],
        )))
    }
}

impl Drop for GameProcess {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

// ─── Window enumeration ─────────────────────────────────────────────────────

struct EnumState {
    pid: u32,
    found: Vec<isize>,
}

unsafe extern "system" fn collect_top_level(hwnd: HWND, lparam: LPARAM) -> BOOL {
    unsafe {
        let state = &mut *(lparam.0 as *mut EnumState);
        let mut pid = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
        if pid == state.pid {
            state.found.push(hwnd.0 as isize);
        }
        BOOL(1)
    }
}

unsafe extern "system" fn collect_children(hwnd: HWND, lparam: LPARAM) -> BOOL {
    unsafe {
        let state = &mut *(lparam.0 as *mut EnumState);
        state.found.push(hwnd.0 as isize);
        BOOL(1)
    }
}

/// All top-level windows belonging to `pid`.
fn top_level_windows(pid: u32) -> Vec<isize> {
    let mut state = EnumState {
        pid,
        found: Vec::new(),
    };
    unsafe {
        let _ = EnumWindows(
            Some(collect_top_level),
            LPARAM(&mut state as *mut _ as isize),
        );
    }
    state.found
}

impl ProcessView for GameProcess {
    fn is_alive(&self) -> bool {
        let mut code = 0u32;
        match unsafe { GetExitCodeProcess(self.handle, &mut code) } {
            Ok(()) => code == STILL_ACTIVE.0 as u32,
            Err(_) => false,
        }
    }

    fn main_window(&self) -> Option<WindowHandle> {
        top_level_windows(self.pid)
            .into_iter()
            .map(|raw| HWND(raw as *mut core::ffi::c_void))
            .find(|&hwnd| unsafe {
                IsWindowVisible(hwnd).as_bool() && GetAncestor(hwnd, GA_ROOTOWNER) == hwnd
            })
            .map(WindowHandle::from_hwnd)
    }

    fn windows(&self) -> Vec<WindowHandle> {
        let mut all = top_level_windows(self.pid);
        for &raw in all.clone().iter() {
            let mut state = EnumState {
                pid: self.pid,
                found: Vec::new(),
            };
            unsafe {
                let _ = EnumChildWindows(
                    Some(HWND(raw as *mut core::ffi::c_void)),
                    Some(collect_children),
                    LPARAM(&mut state as *mut _ as isize),
                );
            }
            all.extend(state.found);
        }
        all.into_iter().map(WindowHandle).collect()
    }

    fn client_size(&self, window: WindowHandle) -> Option<ClientSize> {
        let mut rect = windows::Win32::Foundation::RECT::default();
        unsafe { GetClientRect(window.hwnd(), &mut rect) }.ok()?;
        Some(ClientSize::new(
            rect.right - rect.left,
            rect.bottom - rect.top,
        ))
    }
}

// ─── Shortcut resolution ────────────────────────────────────────────────────

fn wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(Some(0)).collect()
}

/// Resolve the launch target: a plain executable path passes through, a
/// `.lnk` shortcut is resolved to its target via the shell link COM API.
pub fn resolve_target(path: &Path) -> LaunchResult<PathBuf> {
    if !path.exists() {
        return Err(LaunchError::PathNotFound(path.to_path_buf()));
    }

    let is_shortcut = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lnk"));
    if !is_shortcut {
        return Ok(path.to_path_buf());
    }

    let target = resolve_shortcut(path)
        .map_err(|e| LaunchError::ShortcutResolutionFailed(e.message().to_string()))?;
    if !target.exists() {
        return Err(LaunchError::PathNotFound(target));
    }
    debug!(path = %target.display(), "resolved shortcut");
    Ok(target)
}

fn resolve_shortcut(path: &Path) -> windows::core::Result<PathBuf> {
    unsafe {
        CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok()?;
        let result = (|| {
            let link: IShellLinkW = CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)?;
            let persist: IPersistFile = link.cast()?;
            let wide_path = wide(path);
            persist.Load(PCWSTR(wide_path.as_ptr()), STGM_READ)?;

            let mut buf = [0u16; 1024];
            link.GetPath(&mut buf, std::ptr::null_mut(), 0)?;
            let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
            Ok(PathBuf::from(String::from_utf16_lossy(&buf[..len])))
        })();
        CoUninitialize();
        result
    }
}

// ─── Launch or attach ───────────────────────────────────────────────────────

/// Find a running process whose image path matches `exe`.
fn find_running(exe: &Path) -> Option<GameProcess> {
    let file_name = exe.file_name()?.to_string_lossy().to_lowercase();

    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }.ok()?;
    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    if unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok() {
        loop {
            let len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let name = String::from_utf16_lossy(&entry.szExeFile[..len]).to_lowercase();

            if name == file_name {
                if let Some(process) = GameProcess::open(entry.th32ProcessID) {
                    let matches = process
                        .exe_path()
                        .is_some_and(|p| paths_match(&p, exe));
                    if matches {
                        found = Some(process);
                        break;
                    }
                }
            }

            if unsafe { Process32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
        }
    }
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    found
}

fn paths_match(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| p.to_string_lossy().replace('/', "\\").to_lowercase();
    norm(a) == norm(b)
}

/// Restore and raise the process's main window.
fn bring_to_foreground(window: WindowHandle) {
    unsafe {
        let hwnd = window.hwnd();
        if IsIconic(hwnd).as_bool() {
            let _ = ShowWindow(hwnd, SW_RESTORE);
        }
        let _ = SetForegroundWindow(hwnd);
    }
}

/// Reuse a running instance of `exe` when possible, otherwise launch it and
/// wait (polling every 50 ms, up to `timeout`) for a matching process with a
/// main window to appear.
///
/// `attach` disabled forces a fresh launch even when an instance is running.
pub fn launch_or_attach(exe: &Path, timeout: Duration, attach: bool) -> LaunchResult<GameProcess> {
    if attach {
        if let Some(existing) = find_running(exe) {
            if let Some(main) = existing.main_window() {
                info!(pid = existing.pid(), "attaching to running instance");
                bring_to_foreground(main);
                return Ok(existing);
            }
        }
    }

    let workdir = exe
        .parent()
        .ok_or_else(|| LaunchError::PathNotFound(exe.to_path_buf()))?;
    info!(exe = %exe.display(), "launching game process");
    let child = Command::new(exe).current_dir(workdir).spawn()?;
    let child_pid = child.id();
    debug!(pid = child_pid, "spawned");

    // The spawned image may itself be a launcher; match by executable path
    // rather than pid so the real game process is picked up either way.
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(process) = find_running(exe) {
            if process.main_window().is_some() {
                return Ok(process);
            }
        }
        if Instant::now() >= deadline {
            return Err(LaunchError::ProcessLaunchTimeout);
        }
        thread::sleep(LAUNCH_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_comparison_ignores_case_and_separators() {
        assert!(paths_match(
            Path::new("C:\\Games\\Thing\\game.exe"),
            Path::new("c:/games/thing/GAME.EXE"),
        ));
        assert!(!paths_match(
            Path::new("C:\\Games\\game.exe"),
            Path::new("C:\\Other\\game.exe"),
        ));
    }

    #[test]
    fn missing_path_is_path_not_found() {
        let err = resolve_target(Path::new("Z:\\does\\not\\exist.exe")).unwrap_err();
        assert!(matches!(err, LaunchError::PathNotFound(_)));
    }
}
