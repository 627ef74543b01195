use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{Error, Result};

pub const APP_DIR_NAME: &str = "input-binder";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SCHEMA_VERSION: u64 = 2;
pub const DEFAULT_HOTKEY: &str = "ctrl+shift+space";

pub fn get_config_dir() -> Result<PathBuf> {
    let dirs = BaseDirs::new().ok_or(Error::NoHomeDirectory)?;
    Ok(dirs.data_dir().join(APP_DIR_NAME))
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SETTINGS_FILE_NAME))
}

/// Per-app bindings plus global preferences, as stored on disk.
///
/// A binding of `None` marks an app as configured to keep the system default;
/// apps without an entry are not configured at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub schema_version: u64,
    #[serde(default)]
    pub app_bindings: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub quick_switch: QuickSwitchSettings,
    #[serde(default)]
    pub debounce: DebounceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            app_bindings: BTreeMap::new(),
            quick_switch: QuickSwitchSettings::default(),
            debounce: DebounceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickSwitchSettings {
    pub enabled: bool,
    pub hotkey: String,
}

impl Default for QuickSwitchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hotkey: DEFAULT_HOTKEY.to_string(),
        }
    }
}

/// Quiet periods applied to bursts of system notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    pub activation_ms: u64,
    pub sources_ms: u64,
    pub app_list_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            activation_ms: 300,
            sources_ms: 300,
            app_list_ms: 500,
        }
    }
}

impl DebounceSettings {
    pub fn activation(&self) -> Duration {
        Duration::from_millis(self.activation_ms)
    }

    pub fn sources(&self) -> Duration {
        Duration::from_millis(self.sources_ms)
    }

    pub fn app_list(&self) -> Duration {
        Duration::from_millis(self.app_list_ms)
    }
}

/// Parses a settings document of any known schema version.
///
/// Returns the settings in the current schema and whether a migration took
/// place. Documents without a `schema_version` field are the legacy flat
/// `{bundle_id: source_id}` map, where an empty id means the system default.
pub fn parse_settings(content: &str, path: &Path) -> Result<(Settings, bool)> {
    let invalid = |source| Error::InvalidSettings {
        path: path.to_path_buf(),
        source,
    };
    let value: serde_json::Value = serde_json::from_str(content).map_err(invalid)?;

    if value.get("schema_version").is_some() {
        let mut settings: Settings = serde_json::from_value(value).map_err(invalid)?;
        if settings.schema_version > SCHEMA_VERSION {
            return Err(Error::UnsupportedSchema {
                found: settings.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        let migrated = settings.schema_version < SCHEMA_VERSION;
        settings.schema_version = SCHEMA_VERSION;
        return Ok((settings, migrated));
    }

    let legacy: BTreeMap<String, Option<String>> =
        serde_json::from_value(value).map_err(invalid)?;
    let app_bindings = legacy
        .into_iter()
        .map(|(bundle_id, source)| (bundle_id, source.filter(|id| !id.is_empty())))
        .collect();

    Ok((
        Settings {
            app_bindings,
            ..Settings::default()
        },
        true,
    ))
}

/// In-memory settings cache that writes through to its file.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    modified: Option<SystemTime>,
    // Schema version of a newer file seen on reload; saving is refused until
    // a later reload succeeds.
    refused: Option<u64>,
}

impl SettingsStore {
    /// Loads the settings file, creating, migrating or recovering it as needed.
    ///
    /// An unparsable file is moved aside to `<name>.bak` and replaced with
    /// defaults. A file written by a newer schema is left alone and reported
    /// as [`Error::UnsupportedSchema`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut store = Self {
            path,
            settings: Settings::default(),
            modified: None,
            refused: None,
        };

        if !store.path.exists() {
            store.save()?;
            info!("Created default settings at {}", store.path.display());
            return Ok(store);
        }

        let content = fs::read_to_string(&store.path)?;
        match parse_settings(&content, &store.path) {
            Ok((settings, migrated)) => {
                store.settings = settings;
                if migrated {
                    store.save()?;
                    info!(
                        "Migrated settings at {} to schema version {}",
                        store.path.display(),
                        SCHEMA_VERSION
                    );
                } else {
                    store.modified = modified_time(&store.path);
                }
                info!(
                    "Loaded {} app bindings from {}",
                    store.settings.app_bindings.len(),
                    store.path.display()
                );
            }
            Err(err @ Error::InvalidSettings { .. }) => {
                let backup = backup_path(&store.path);
                warn!("{err}. Moving it to {} and using defaults.", backup.display());
                fs::rename(&store.path, &backup)?;
                store.save()?;
            }
            Err(err) => return Err(err),
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bindings(&self) -> &BTreeMap<String, Option<String>> {
        &self.settings.app_bindings
    }

    /// `None` when the app is not configured, `Some(None)` when it is bound to
    /// the system default.
    pub fn binding(&self, bundle_id: &str) -> Option<Option<&str>> {
        self.settings
            .app_bindings
            .get(bundle_id)
            .map(|source| source.as_deref())
    }

    pub fn set_binding(&mut self, bundle_id: &str, source_id: Option<String>) -> Result<()> {
        debug!("Binding {} -> {:?}", bundle_id, source_id);
        self.settings
            .app_bindings
            .insert(bundle_id.to_string(), source_id);
        self.save()
    }

    pub fn remove_binding(&mut self, bundle_id: &str) -> Result<bool> {
        if self.settings.app_bindings.remove(bundle_id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Drops bindings that point at sources missing from `valid_ids`.
    ///
    /// Default bindings are kept. An empty `valid_ids` is treated as a failed
    /// enumeration and changes nothing. Returns the affected bundle ids.
    pub fn retain_valid_sources(&mut self, valid_ids: &HashSet<String>) -> Result<Vec<String>> {
        if valid_ids.is_empty() {
            return Ok(Vec::new());
        }

        let stale: Vec<String> = self
            .settings
            .app_bindings
            .iter()
            .filter(|(_, source)| matches!(source, Some(id) if !valid_ids.contains(id)))
            .map(|(bundle_id, _)| bundle_id.clone())
            .collect();

        if stale.is_empty() {
            return Ok(stale);
        }
        for bundle_id in &stale {
            self.settings.app_bindings.remove(bundle_id);
        }
        self.save()?;
        Ok(stale)
    }

    pub fn set_quick_switch_enabled(&mut self, enabled: bool) -> Result<()> {
        self.settings.quick_switch.enabled = enabled;
        self.save()
    }

    pub fn set_hotkey(&mut self, spec: &str) -> Result<()> {
        self.settings.quick_switch.hotkey = spec.to_string();
        self.save()
    }

    /// Re-reads the file if another process changed it since the last load or
    /// save. Returns whether the cache was replaced.
    ///
    /// A file rewritten with a newer schema puts the store into a read-only
    /// state: mutations fail with [`Error::UnsupportedSchema`] and the file is
    /// not touched until it becomes readable again.
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        if !self.path.exists() {
            warn!("Settings file {} disappeared; rewriting it", self.path.display());
            self.refused = None;
            self.save()?;
            return Ok(false);
        }

        let modified = modified_time(&self.path);
        if modified.is_some() && modified == self.modified {
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path)?;
        let (settings, migrated) = match parse_settings(&content, &self.path) {
            Ok(parsed) => parsed,
            Err(err @ Error::UnsupportedSchema { found, .. }) => {
                if self.refused != Some(found) {
                    warn!("{}; not writing {} until it changes", err, self.path.display());
                }
                self.refused = Some(found);
                self.modified = modified;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.refused = None;
        self.settings = settings;
        if migrated {
            self.save()?;
        } else {
            self.modified = modified;
        }
        debug!("Reloaded settings from {}", self.path.display());
        Ok(true)
    }

    pub fn is_read_only(&self) -> bool {
        self.refused.is_some()
    }

    fn save(&mut self) -> Result<()> {
        if let Some(found) = self.refused {
            return Err(Error::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        self.modified = modified_time(&self.path);
        Ok(())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}
