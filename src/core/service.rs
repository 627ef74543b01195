//! Launch-at-login registration through a per-user LaunchAgent.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use directories::BaseDirs;
use tracing::{info, warn};

use crate::core::config::APP_DIR_NAME;
use crate::core::error::{Error, Result};

pub const SERVICE_LABEL: &str = "com.input-binder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginItemStatus {
    NotInstalled,
    /// The plist exists but launchd does not know the job.
    Installed,
    Loaded,
}

fn home_dir() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(Error::NoHomeDirectory)
}

pub fn get_plist_path() -> Result<PathBuf> {
    Ok(home_dir()?
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{SERVICE_LABEL}.plist")))
}

pub fn get_log_directory() -> Result<PathBuf> {
    Ok(home_dir()?.join("Library").join("Logs").join(APP_DIR_NAME))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn create_plist_content(binary_path: &Path, log_dir: &Path) -> String {
    let binary = xml_escape(&binary_path.to_string_lossy());
    let stdout_log = xml_escape(&log_dir.join(format!("{APP_DIR_NAME}.log")).to_string_lossy());
    let stderr_log = xml_escape(
        &log_dir
            .join(format!("{APP_DIR_NAME}.error.log"))
            .to_string_lossy(),
    );

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{SERVICE_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
    <key>LimitLoadToSessionType</key>
    <string>Aqua</string>
    <key>StandardOutPath</key>
    <string>{stdout_log}</string>
    <key>StandardErrorPath</key>
    <string>{stderr_log}</string>
    <key>ProcessType</key>
    <string>Interactive</string>
</dict>
</plist>"#
    )
}

pub fn is_enabled() -> Result<bool> {
    Ok(get_plist_path()?.exists())
}

/// Turns launch at login on or off. Repeating the current state is a no-op.
pub fn set_enabled(enabled: bool) -> Result<()> {
    if enabled == is_enabled()? {
        info!(
            "Launch at login already {}",
            if enabled { "enabled" } else { "disabled" }
        );
        return Ok(());
    }
    if enabled {
        install()
    } else {
        uninstall()
    }
}

fn install() -> Result<()> {
    let binary_path = std::env::current_exe()?;
    let plist_path = get_plist_path()?;
    let log_dir = get_log_directory()?;

    if let Some(parent) = plist_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&log_dir)?;
    fs::write(&plist_path, create_plist_content(&binary_path, &log_dir))?;

    if let Err(e) = launchctl("load", &plist_path) {
        fs::remove_file(&plist_path)?;
        return Err(e);
    }

    info!(
        "Launch at login enabled ({} -> {})",
        plist_path.display(),
        binary_path.display()
    );
    Ok(())
}

fn uninstall() -> Result<()> {
    let plist_path = get_plist_path()?;
    if let Err(e) = launchctl("unload", &plist_path) {
        warn!("{}", e);
    }
    fs::remove_file(&plist_path)?;
    info!("Launch at login disabled");
    Ok(())
}

pub fn status() -> Result<LoginItemStatus> {
    if !is_enabled()? {
        return Ok(LoginItemStatus::NotInstalled);
    }
    let output = Command::new("launchctl")
        .args(["list", SERVICE_LABEL])
        .output()?;
    if output.status.success() && !output.stdout.is_empty() {
        Ok(LoginItemStatus::Loaded)
    } else {
        Ok(LoginItemStatus::Installed)
    }
}

fn launchctl(action: &str, plist_path: &Path) -> Result<()> {
    let output = Command::new("launchctl")
        .arg(action)
        .arg(plist_path)
        .output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(Error::Launchctl {
        action: action.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plist_runs_binary_at_login_and_logs_to_dir() {
        let content = create_plist_content(
            Path::new("/Applications/input-binder"),
            Path::new("/Users/me/Library/Logs/input-binder"),
        );

        assert!(content.contains("<string>com.input-binder</string>"));
        assert!(content.contains(
            "<string>/Applications/input-binder</string>\n        <string>run</string>"
        ));
        assert!(content.contains("<key>RunAtLoad</key>\n    <true/>"));
        assert!(content.contains("<key>KeepAlive</key>\n    <false/>"));
        assert!(content.contains("/Users/me/Library/Logs/input-binder/input-binder.log"));
        assert!(content.contains("/Users/me/Library/Logs/input-binder/input-binder.error.log"));
    }

    #[test]
    fn plist_escapes_paths() {
        let content = create_plist_content(Path::new("/tmp/a&b<c>/bin"), Path::new("/tmp/logs"));
        assert!(content.contains("/tmp/a&amp;b&lt;c&gt;/bin"));
        assert!(!content.contains("a&b"));
    }

    #[test]
    fn agent_lives_in_launch_agents() {
        let path = get_plist_path().unwrap();
        assert!(path.ends_with("Library/LaunchAgents/com.input-binder.plist"));
    }
}
