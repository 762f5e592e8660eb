//! Launch/locate error taxonomy.
//!
//! Every failure the process locator can surface to the user is one of these
//! variants; each maps to a message box in `main`. Native failures inside the
//! overlay binder are a different channel entirely (`anyhow`, fatal per
//! overlay instance) and never appear here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    /// The given executable or shortcut path does not exist.
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// A `.lnk` file could not be resolved to its target executable.
    #[error("Could not resolve shortcut: {0}")]
    ShortcutResolutionFailed(String),

    /// Spawning the process itself failed.
    #[error("Failed to launch process: {0}")]
    Spawn(#[from] std::io::Error),

    /// No matching process with a main window appeared before the deadline.
    #[error("Timed out waiting for the game process to start")]
    ProcessLaunchTimeout,

    /// The process exited while we were still searching for its window.
    #[error("The game process exited before its window was found")]
    ProcessExited,

    /// The process has not created its main window yet (or is tearing down).
    #[error("The game process has no window yet")]
    ProcessPendingExit,

    /// The search timed out without any window passing the content-size
    /// heuristic.
    #[error("No suitable game window was found")]
    WindowHandleNotFound,
}

pub type LaunchResult<T> = Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_user_facing() {
        let err = LaunchError::PathNotFound(PathBuf::from("C:\\game.exe"));
        assert_eq!(err.to_string(), "Path not found: C:\\game.exe");

        let err = LaunchError::ShortcutResolutionFailed("bad link".into());
        assert!(err.to_string().contains("bad link"));

        assert!(
            LaunchError::WindowHandleNotFound
                .to_string()
                .contains("window")
        );
    }

    #[test]
    fn io_errors_map_to_spawn() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LaunchError = io.into();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }
}
