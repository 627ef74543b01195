use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::core::apps::AppInfo;
use crate::core::config::SettingsStore;
use crate::core::error::{Error, Result};
use crate::core::hotkey::Hotkey;
use crate::core::quick_switch::{next_app_binding, next_global_source};
use crate::core::sources::{InputSource, TextInputServices};

/// What a switching request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The input source was changed to this id.
    Switched(String),
    /// The bound source was already active.
    AlreadyActive(String),
    /// The app is bound to the system default; nothing to do.
    Default,
    /// The app has no binding.
    Unbound,
    /// The binding was saved; the app is not frontmost so nothing switched.
    Stored,
}

/// Applies per-app bindings in response to activation and user actions,
/// keeping the settings store in step with the available input sources.
pub struct Switcher<S> {
    services: S,
    store: SettingsStore,
    sources: Vec<InputSource>,
}

impl<S: TextInputServices> Switcher<S> {
    pub fn new(services: S, store: SettingsStore) -> Self {
        Self {
            services,
            store,
            sources: Vec::new(),
        }
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    /// Re-enumerates input sources and forgets bindings to sources that
    /// disappeared.
    pub fn refresh_sources(&mut self) -> Result<()> {
        let sources = self.services.input_sources()?;
        let valid: HashSet<String> = sources.iter().map(|s| s.id.clone()).collect();

        let removed = self.store.retain_valid_sources(&valid)?;
        for bundle_id in &removed {
            info!("Removed binding for {}: input source no longer available", bundle_id);
        }

        debug!("{} input sources available", sources.len());
        self.sources = sources;
        Ok(())
    }

    /// Picks up edits made to the settings file by another process.
    pub fn reload_settings(&mut self) -> bool {
        match self.store.reload_if_changed() {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Keeping cached settings: {}", e);
                false
            }
        }
    }

    pub fn handle_activation(&mut self, bundle_id: &str) -> Result<Outcome> {
        self.reload_settings();

        let target = match self.store.binding(bundle_id) {
            None => return Ok(Outcome::Unbound),
            Some(None) => return Ok(Outcome::Default),
            Some(Some(target)) => target.to_string(),
        };
        let outcome = self.switch_to(&target)?;
        if let Outcome::Switched(id) = &outcome {
            info!("Switched to {} for {}", self.source_name(id), bundle_id);
        }
        Ok(outcome)
    }

    /// Binds `bundle_id` to `source_id` (`None` for the system default) and
    /// applies it right away when that app is frontmost.
    pub fn bind(&mut self, bundle_id: &str, source_id: Option<&str>) -> Result<Outcome> {
        if let Some(id) = source_id {
            self.ensure_sources()?;
            if !self.sources.iter().any(|s| s.id == id) {
                return Err(Error::SourceNotFound(id.to_string()));
            }
        }

        self.store
            .set_binding(bundle_id, source_id.map(str::to_string))?;
        info!(
            "Bound {} to {}",
            bundle_id,
            source_id.map_or("system default", |id| self.source_name(id))
        );
        self.apply_if_frontmost(bundle_id, source_id)
    }

    pub fn unbind(&mut self, bundle_id: &str) -> Result<bool> {
        let removed = self.store.remove_binding(bundle_id)?;
        if removed {
            info!("Removed binding for {}", bundle_id);
        }
        Ok(removed)
    }

    /// Advances the app's binding through `[default, sources...]`.
    ///
    /// Reaching the default removes the app's entry instead of storing an
    /// explicit default binding.
    pub fn cycle_binding(&mut self, bundle_id: &str) -> Result<Option<String>> {
        self.ensure_sources()?;
        let current = self.store.binding(bundle_id).flatten();
        let next = next_app_binding(&self.sources, current);

        match &next {
            Some(source_id) => self.store.set_binding(bundle_id, Some(source_id.clone()))?,
            None => {
                self.store.remove_binding(bundle_id)?;
            }
        }
        self.apply_if_frontmost(bundle_id, next.as_deref())?;
        Ok(next)
    }

    /// Selects the enabled source after the current one. Does nothing while
    /// quick switch is disabled in the settings.
    pub fn quick_switch(&mut self) -> Result<Option<InputSource>> {
        self.reload_settings();
        if !self.store.settings().quick_switch.enabled {
            debug!("Quick switch is disabled");
            return Ok(None);
        }

        self.ensure_sources()?;
        let current = self.services.current_source_id().ok();
        let Some(next) = next_global_source(&self.sources, current.as_deref()).cloned() else {
            return Ok(None);
        };
        self.services.select_source(&next.id)?;
        info!("Quick switch to {}", next.name);
        Ok(Some(next))
    }

    pub fn set_quick_switch_enabled(&mut self, enabled: bool) -> Result<()> {
        self.store.set_quick_switch_enabled(enabled)
    }

    pub fn set_hotkey(&mut self, spec: &str) -> Result<Hotkey> {
        let hotkey = Hotkey::parse(spec)?;
        self.store.set_hotkey(&hotkey.to_string())?;
        Ok(hotkey)
    }

    /// Apps from `apps` that have any binding, including default ones.
    pub fn configured_apps<'a>(&self, apps: &'a [AppInfo]) -> Vec<&'a AppInfo> {
        apps.iter()
            .filter(|app| self.store.binding(&app.bundle_id).is_some())
            .collect()
    }

    /// Display name of the source bound to `bundle_id`, if it is bound to a
    /// known source.
    pub fn binding_name(&self, bundle_id: &str) -> Option<&str> {
        let id = self.store.binding(bundle_id).flatten()?;
        self.sources
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    pub fn source_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .map_or(id, |s| s.name.as_str())
    }

    fn ensure_sources(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            self.refresh_sources()?;
        }
        Ok(())
    }

    fn apply_if_frontmost(&self, bundle_id: &str, source_id: Option<&str>) -> Result<Outcome> {
        if self.services.frontmost_bundle_id().as_deref() != Some(bundle_id) {
            return Ok(Outcome::Stored);
        }
        match source_id {
            Some(id) => self.switch_to(id),
            None => Ok(Outcome::Default),
        }
    }

    fn switch_to(&self, target: &str) -> Result<Outcome> {
        match self.services.current_source_id() {
            Ok(current) if current == target => {
                return Ok(Outcome::AlreadyActive(current));
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read the current input source: {}", e),
        }
        self.services.select_source(target)?;
        Ok(Outcome::Switched(target.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SETTINGS_FILE_NAME;
    use std::cell::RefCell;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct FakeServices {
        pub sources: RefCell<Vec<InputSource>>,
        pub current: RefCell<String>,
        pub frontmost: RefCell<Option<String>>,
        pub selected: RefCell<Vec<String>>,
        pub disabled: RefCell<Vec<String>>,
    }

    impl FakeServices {
        pub fn new(current: &str) -> Self {
            let fake = Self::default();
            *fake.sources.borrow_mut() = vec![
                InputSource::new("com.apple.keylayout.ABC", "ABC"),
                InputSource::new("com.apple.inputmethod.SCIM.ITABC", "Pinyin - Simplified"),
                InputSource::new("com.apple.keylayout.Russian", "Russian"),
            ];
            *fake.current.borrow_mut() = current.to_string();
            fake
        }
    }

    impl TextInputServices for FakeServices {
        fn input_sources(&self) -> Result<Vec<InputSource>> {
            Ok(self.sources.borrow().clone())
        }

        fn current_source_id(&self) -> Result<String> {
            Ok(self.current.borrow().clone())
        }

        fn select_source(&self, id: &str) -> Result<()> {
            if !self.sources.borrow().iter().any(|s| s.id == id) {
                return Err(Error::SourceNotFound(id.to_string()));
            }
            if self.disabled.borrow().iter().any(|d| d == id) {
                return Err(Error::SourceNotEnabled(id.to_string()));
            }
            *self.current.borrow_mut() = id.to_string();
            self.selected.borrow_mut().push(id.to_string());
            Ok(())
        }

        fn frontmost_bundle_id(&self) -> Option<String> {
            self.frontmost.borrow().clone()
        }
    }

    const ABC: &str = "com.apple.keylayout.ABC";
    const PINYIN: &str = "com.apple.inputmethod.SCIM.ITABC";
    const RUSSIAN: &str = "com.apple.keylayout.Russian";

    fn switcher(current: &str) -> (TempDir, Switcher<FakeServices>) {
        let dir = tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join(SETTINGS_FILE_NAME)).unwrap();
        let mut switcher = Switcher::new(FakeServices::new(current), store);
        switcher.refresh_sources().unwrap();
        (dir, switcher)
    }

    #[test]
    fn activation_switches_to_bound_source() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.tencent.xinWeChat", Some(PINYIN)).unwrap();

        let outcome = switcher.handle_activation("com.tencent.xinWeChat").unwrap();
        assert_eq!(outcome, Outcome::Switched(PINYIN.to_string()));
        assert_eq!(*switcher.services().current.borrow(), PINYIN);
    }

    #[test]
    fn activation_skips_when_already_active_unbound_or_default() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Terminal", Some(ABC)).unwrap();
        switcher.bind("com.apple.Notes", None).unwrap();

        assert_eq!(
            switcher.handle_activation("com.apple.Terminal").unwrap(),
            Outcome::AlreadyActive(ABC.to_string())
        );
        assert_eq!(switcher.handle_activation("com.apple.Notes").unwrap(), Outcome::Default);
        assert_eq!(switcher.handle_activation("com.apple.Safari").unwrap(), Outcome::Unbound);
        assert!(switcher.services().selected.borrow().is_empty());
    }

    #[test]
    fn binding_frontmost_app_applies_immediately() {
        let (_dir, mut switcher) = switcher(ABC);
        *switcher.services().frontmost.borrow_mut() = Some("com.apple.Terminal".into());

        assert_eq!(
            switcher.bind("com.apple.Safari", Some(RUSSIAN)).unwrap(),
            Outcome::Stored
        );
        assert_eq!(
            switcher.bind("com.apple.Terminal", Some(RUSSIAN)).unwrap(),
            Outcome::Switched(RUSSIAN.to_string())
        );
        assert_eq!(switcher.bind("com.apple.Terminal", None).unwrap(), Outcome::Default);
        assert_eq!(*switcher.services().selected.borrow(), vec![RUSSIAN.to_string()]);
    }

    #[test]
    fn binding_unknown_source_is_rejected() {
        let (_dir, mut switcher) = switcher(ABC);
        let err = switcher.bind("com.apple.Safari", Some("com.example.missing")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
        assert_eq!(switcher.store().binding("com.apple.Safari"), None);
    }

    #[test]
    fn unbind_removes_configuration() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Safari", Some(RUSSIAN)).unwrap();
        assert!(switcher.unbind("com.apple.Safari").unwrap());
        assert!(!switcher.unbind("com.apple.Safari").unwrap());
        assert_eq!(switcher.handle_activation("com.apple.Safari").unwrap(), Outcome::Unbound);
    }

    #[test]
    fn cycle_binding_walks_default_and_sources() {
        let (_dir, mut switcher) = switcher(ABC);
        let app = "com.apple.dt.Xcode";
        let cycle: Vec<Option<String>> = (0..4).map(|_| switcher.cycle_binding(app).unwrap()).collect();
        assert_eq!(
            cycle,
            vec![
                Some(ABC.to_string()),
                Some(PINYIN.to_string()),
                Some(RUSSIAN.to_string()),
                None
            ]
        );
        assert_eq!(switcher.store().binding(app), None);
    }

    #[test]
    fn cycle_from_explicit_default_starts_at_first_source() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Notes", None).unwrap();
        assert_eq!(
            switcher.cycle_binding("com.apple.Notes").unwrap().as_deref(),
            Some(ABC)
        );
    }

    #[test]
    fn failed_switch_on_activation_is_reported_and_keeps_binding() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Safari", Some(RUSSIAN)).unwrap();
        switcher.services().disabled.borrow_mut().push(RUSSIAN.to_string());

        let err = switcher.handle_activation("com.apple.Safari").unwrap_err();
        assert!(matches!(err, Error::SourceNotEnabled(ref id) if id == RUSSIAN));
        assert_eq!(*switcher.services().current.borrow(), ABC);
        assert_eq!(switcher.store().binding("com.apple.Safari"), Some(Some(RUSSIAN)));
    }

    #[test]
    fn binding_is_saved_even_when_immediate_switch_fails() {
        let (_dir, mut switcher) = switcher(ABC);
        *switcher.services().frontmost.borrow_mut() = Some("com.apple.Terminal".into());
        switcher.services().disabled.borrow_mut().push(RUSSIAN.to_string());

        let err = switcher.bind("com.apple.Terminal", Some(RUSSIAN)).unwrap_err();
        assert!(matches!(err, Error::SourceNotEnabled(_)));
        assert!(switcher.services().selected.borrow().is_empty());

        let reopened = SettingsStore::open(switcher.store().path()).unwrap();
        assert_eq!(reopened.binding("com.apple.Terminal"), Some(Some(RUSSIAN)));
    }

    #[test]
    fn cycle_binding_switches_frontmost_app() {
        let (_dir, mut switcher) = switcher(RUSSIAN);
        *switcher.services().frontmost.borrow_mut() = Some("com.apple.dt.Xcode".into());
        switcher.cycle_binding("com.apple.dt.Xcode").unwrap();
        assert_eq!(*switcher.services().current.borrow(), ABC);
    }

    #[test]
    fn quick_switch_respects_setting_and_wraps() {
        let (_dir, mut switcher) = switcher(RUSSIAN);
        assert_eq!(switcher.quick_switch().unwrap(), None);

        switcher.set_quick_switch_enabled(true).unwrap();
        assert_eq!(switcher.quick_switch().unwrap().unwrap().id, ABC);
        assert_eq!(switcher.quick_switch().unwrap().unwrap().id, PINYIN);
        assert_eq!(*switcher.services().current.borrow(), PINYIN);
    }

    #[test]
    fn removed_sources_drop_their_bindings() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Safari", Some(RUSSIAN)).unwrap();
        switcher.bind("com.apple.Notes", None).unwrap();

        switcher
            .services()
            .sources
            .borrow_mut()
            .retain(|s| s.id != RUSSIAN);
        switcher.refresh_sources().unwrap();

        assert_eq!(switcher.store().binding("com.apple.Safari"), None);
        assert_eq!(switcher.store().binding("com.apple.Notes"), Some(None));
        assert_eq!(switcher.sources().len(), 2);
    }

    #[test]
    fn names_and_configured_apps() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Safari", Some(PINYIN)).unwrap();
        switcher.bind("com.apple.Notes", None).unwrap();

        assert_eq!(switcher.binding_name("com.apple.Safari"), Some("Pinyin - Simplified"));
        assert_eq!(switcher.binding_name("com.apple.Notes"), None);
        assert_eq!(switcher.source_name("unknown.id"), "unknown.id");

        let apps = vec![
            AppInfo::new("com.apple.Safari", "Safari", "/Applications/Safari.app"),
            AppInfo::new("com.apple.Notes", "Notes", "/System/Applications/Notes.app"),
            AppInfo::new("com.apple.Mail", "Mail", "/System/Applications/Mail.app"),
        ];
        let configured: Vec<&str> = switcher
            .configured_apps(&apps)
            .into_iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(configured, vec!["Safari", "Notes"]);
    }

    #[test]
    fn reload_reports_only_external_changes() {
        let (_dir, mut switcher) = switcher(ABC);
        switcher.bind("com.apple.Safari", Some(RUSSIAN)).unwrap();
        assert!(!switcher.reload_settings());

        let path = switcher.store().path().to_path_buf();
        std::fs::write(&path, r#"{"schema_version": 2, "app_bindings": {"com.apple.Safari": null}}"#)
            .unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(10))
            .unwrap();

        assert!(switcher.reload_settings());
        assert_eq!(switcher.store().binding("com.apple.Safari"), Some(None));
        assert!(!switcher.reload_settings());
    }

    #[test]
    fn hotkey_is_validated_and_stored_canonically() {
        let (_dir, mut switcher) = switcher(ABC);
        assert!(switcher.set_hotkey("shift+bogus").is_err());
        switcher.set_hotkey("Shift + Ctrl + Space").unwrap();
        assert_eq!(switcher.store().settings().quick_switch.hotkey, "ctrl+shift+space");
    }
}
