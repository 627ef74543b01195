//! Catalogue of installed and running applications.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::core::search::natural_cmp;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AppInfo {
    pub bundle_id: String,
    pub name: String,
    pub path: PathBuf,
}

impl AppInfo {
    pub fn new(bundle_id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Directories searched for installed applications.
pub fn application_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/Applications")];
    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.home_dir().join("Applications"));
    }
    dirs.push(PathBuf::from("/System/Applications"));
    dirs
}

/// Walks `dirs` for `.app` bundles and reads each one with `read_bundle`.
///
/// Hidden entries are skipped and bundles are never descended into.
/// Duplicates by bundle id keep the first occurrence. The result is sorted by
/// name.
pub fn scan_directories<F>(dirs: &[PathBuf], read_bundle: F) -> Vec<AppInfo>
where
    F: Fn(&Path) -> Option<AppInfo>,
{
    let mut bundles = Vec::new();
    for dir in dirs {
        collect_bundles(dir, &mut bundles);
    }

    let mut seen = HashSet::new();
    let mut apps: Vec<AppInfo> = bundles
        .iter()
        .filter_map(|path| read_bundle(path))
        .filter(|app| seen.insert(app.bundle_id.clone()))
        .collect();
    apps.sort_by(|a, b| natural_cmp(&a.name, &b.name));
    apps
}

fn collect_bundles(dir: &Path, out: &mut Vec<PathBuf>) {
    let mut walker = WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping {}: {}", dir.display(), e);
                continue;
            }
        };
        // Symlinks are not followed, so a link to a folder reports as a link.
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some("app") {
            out.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map_or(true, |name| name.starts_with('.'))
}

#[cfg(target_os = "macos")]
pub use self::macos::{installed_apps, read_bundle, running_apps};

#[cfg(target_os = "macos")]
mod macos {
    use std::path::{Path, PathBuf};

    use cocoa::base::{id, nil};
    use cocoa::foundation::{NSAutoreleasePool, NSString};
    use objc::{class, msg_send, sel, sel_impl};

    use super::{application_dirs, scan_directories, AppInfo};
    use crate::core::macos_api::nsstring_to_string;
    use crate::core::search::natural_cmp;

    const ACTIVATION_POLICY_REGULAR: isize = 0;

    pub fn installed_apps() -> Vec<AppInfo> {
        scan_directories(&application_dirs(), read_bundle)
    }

    /// Reads the bundle identifier and display name of an `.app` bundle.
    pub fn read_bundle(path: &Path) -> Option<AppInfo> {
        let path_str = path.to_str()?;
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let info = bundle_info(path_str).map(|(bundle_id, name)| AppInfo::new(bundle_id, name, path));
            let _: () = msg_send![pool, drain];
            info
        }
    }

    unsafe fn bundle_info(path: &str) -> Option<(String, String)> {
        let ns_path = NSString::alloc(nil).init_str(path);
        let bundle: id = msg_send![class!(NSBundle), bundleWithPath: ns_path];
        let _: () = msg_send![ns_path, release];
        if bundle == nil {
            return None;
        }

        let bundle_id: id = msg_send![bundle, bundleIdentifier];
        let bundle_id = nsstring_to_string(bundle_id)?;

        let name = ["CFBundleDisplayName", "CFBundleName"]
            .iter()
            .find_map(|key| info_string(bundle, key))?;
        Some((bundle_id, name))
    }

    unsafe fn info_string(bundle: id, key: &str) -> Option<String> {
        let ns_key = NSString::alloc(nil).init_str(key);
        let value: id = msg_send![bundle, objectForInfoDictionaryKey: ns_key];
        let _: () = msg_send![ns_key, release];
        if value == nil {
            return None;
        }
        let is_string: bool = msg_send![value, isKindOfClass: class!(NSString)];
        if !is_string {
            return None;
        }
        nsstring_to_string(value).filter(|s| !s.is_empty())
    }

    /// Regular (Dock-visible) running applications that have a bundle id.
    pub fn running_apps() -> Vec<AppInfo> {
        let mut apps = Vec::new();
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let running: id = msg_send![workspace, runningApplications];
            let count: usize = msg_send![running, count];

            for i in 0..count {
                let app: id = msg_send![running, objectAtIndex: i];
                let policy: isize = msg_send![app, activationPolicy];
                if policy != ACTIVATION_POLICY_REGULAR {
                    continue;
                }
                let bundle_id: id = msg_send![app, bundleIdentifier];
                let Some(bundle_id) = nsstring_to_string(bundle_id) else {
                    continue;
                };
                let name: id = msg_send![app, localizedName];
                let name = nsstring_to_string(name).unwrap_or_else(|| bundle_id.clone());

                let url: id = msg_send![app, bundleURL];
                let path = if url == nil {
                    PathBuf::new()
                } else {
                    let path: id = msg_send![url, path];
                    nsstring_to_string(path).map(PathBuf::from).unwrap_or_default()
                };

                apps.push(AppInfo::new(bundle_id, name, path));
            }
            let _: () = msg_send![pool, drain];
        }
        apps.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        apps
    }
}
