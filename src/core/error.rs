use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to enumerate input sources")]
    SourceListUnavailable,

    #[error("input source not found: {0}")]
    SourceNotFound(String),

    #[error("input source is not enabled: {0}")]
    SourceNotEnabled(String),

    #[error("failed to select input source {id} (status {status})")]
    SelectFailed { id: String, status: i32 },

    #[error("failed to read the current input source")]
    CurrentSourceUnavailable,

    #[error("settings schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u64, supported: u64 },

    #[error("invalid settings file {path}: {source}")]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid hotkey `{spec}`: {reason}")]
    InvalidHotkey { spec: String, reason: String },

    #[error("failed to register hotkey (status {0})")]
    HotkeyRegistration(i32),

    #[error("launchctl {action} failed: {stderr}")]
    Launchctl { action: String, stderr: String },

    #[error("menu bar item: {0}")]
    Tray(String),

    #[error("could not determine the home directory")]
    NoHomeDirectory,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
