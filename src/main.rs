mod error;
mod geometry;
mod hook;
mod locator;
mod overlay;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use windows::Win32::UI::HiDpi::{
    DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, SetProcessDpiAwarenessContext,
};
use windows::Win32::UI::WindowsAndMessaging::{MB_ICONERROR, MB_OK, MessageBoxW};
use windows::core::PCWSTR;

use crate::error::LaunchError;
use crate::locator::{
    DEFAULT_LAUNCH_TIMEOUT, DEFAULT_SEARCH_TIMEOUT, WindowHandle, find_good_window,
    launch_or_attach, resolve_target,
};
use crate::overlay::{OverlayOptions, register_overlay_class, spawn_overlay};

/// Overlays a movable touch control on a game window.
#[derive(Parser)]
#[command(name = "game-touch")]
struct Cli {
    /// Path to the game executable, or a shortcut to it.
    target: Option<PathBuf>,
    /// Always launch a fresh process instead of attaching to a running one.
    #[arg(long)]
    alt_launch: bool,
    /// End a drag early when the control is thrown past the window edge.
    #[arg(long)]
    edge_throw: bool,
    /// Side length of the touch control in logical pixels.
    #[arg(long, default_value_t = 64.0)]
    touch_size: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Before any other window API call, so every coordinate we see is a real
    // pixel rather than a virtualized one.
    unsafe {
        if let Err(e) = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) {
            warn!("could not set per-monitor DPI awareness: {e}");
        }
    }

    let cli = Cli::parse();
    let Some(target_path) = cli.target else {
        // The preference/selection window lives elsewhere; without a target
        // there is nothing to bind.
        info!("no game path given, nothing to do");
        return ExitCode::SUCCESS;
    };

    unsafe {
        if let Err(e) = register_overlay_class() {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    }

    // The locator polls and sleeps, so it runs on a worker and reports its
    // single result back over a channel.
    let (result_tx, result_rx) = mpsc::channel::<Result<WindowHandle, LaunchError>>();
    let attach = !cli.alt_launch;
    std::thread::spawn(move || {
        let result = resolve_target(&target_path)
            .and_then(|exe| launch_or_attach(&exe, DEFAULT_LAUNCH_TIMEOUT, attach))
            .and_then(|process| find_good_window(&process, DEFAULT_SEARCH_TIMEOUT));
        let _ = result_tx.send(result);
    });

    let target = match result_rx.recv() {
        Ok(Ok(window)) => window,
        Ok(Err(e)) => {
            error!("could not locate game window: {e}");
            message_box(&e.to_string());
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            error!("locator worker disappeared without a result");
            return ExitCode::FAILURE;
        }
    };
    info!(handle = target.0, "found game window");

    let options = OverlayOptions {
        touch_size: cli.touch_size,
        throw_on_boundary: cli.edge_throw,
    };

    // A failure (or panic) in the binding task leaves no safe way to keep
    // running — surface it and exit nonzero.
    match spawn_overlay(target, options).join() {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("overlay binding failed: {e:#}");
            message_box("The overlay could not stay attached to the game window.");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("overlay thread panicked");
            ExitCode::FAILURE
        }
    }
}

fn message_box(text: &str) {
    let caption: Vec<u16> = "Game Touch\0".encode_utf16().collect();
    let body: Vec<u16> = text.encode_utf16().chain(Some(0)).collect();
    unsafe {
        MessageBoxW(
            None,
            PCWSTR(body.as_ptr()),
            PCWSTR(caption.as_ptr()),
            MB_OK | MB_ICONERROR,
        );
    }
}
