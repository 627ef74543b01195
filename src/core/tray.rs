//! Menu bar item.
//!
//! The menu is described by a plain [`MenuModel`] and rendered with
//! `tray-icon`; every clickable item maps to a [`MenuAction`].

use std::path::PathBuf;

use crate::core::apps::AppInfo;
use crate::core::sources::InputSource;

pub const DEFAULT_LABEL: &str = "System Default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Bind the app to a source, or to the system default when `None`.
    Bind {
        bundle_id: String,
        source_id: Option<String>,
    },
    Unbind(String),
    ToggleQuickSwitch,
    ToggleLoginItem,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    pub bundle_id: String,
    pub name: String,
    /// `None` when unbound, `Some(None)` for the system default.
    pub binding: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct MenuModel {
    pub frontmost: Option<AppEntry>,
    pub apps: Vec<AppEntry>,
    pub sources: Vec<InputSource>,
    pub quick_switch_enabled: bool,
    pub hotkey: String,
    pub login_item_enabled: bool,
    pub settings_path: PathBuf,
}

impl AppEntry {
    pub fn new(app: &AppInfo, binding: Option<Option<&str>>) -> Self {
        Self {
            bundle_id: app.bundle_id.clone(),
            name: app.name.clone(),
            binding: binding.map(|b| b.map(str::to_string)),
        }
    }
}

/// Human-readable form of a binding: the source name, "System Default", or
/// nothing for unbound apps. Stale ids are shown as-is.
pub fn binding_label(binding: Option<Option<&str>>, sources: &[InputSource]) -> Option<String> {
    match binding? {
        None => Some(DEFAULT_LABEL.to_string()),
        Some(id) => Some(
            sources
                .iter()
                .find(|s| s.id == id)
                .map_or_else(|| id.to_string(), |s| s.name.clone()),
        ),
    }
}

/// Title of the disabled item naming the frontmost app and its binding.
pub fn frontmost_title(frontmost: Option<&AppEntry>, sources: &[InputSource]) -> String {
    match frontmost {
        Some(app) => {
            let label = binding_label(app.binding.as_ref().map(|b| b.as_deref()), sources)
                .unwrap_or_else(|| "not bound".to_string());
            format!("{}: {}", app.name, label)
        }
        None => "No active application".to_string(),
    }
}

impl MenuModel {
    /// Title of the app's submenu, with its binding when it has one.
    pub fn app_title(&self, app: &AppEntry) -> String {
        match binding_label(app.binding.as_ref().map(|b| b.as_deref()), &self.sources) {
            Some(label) => format!("{} ({})", app.name, label),
            None => app.name.clone(),
        }
    }

    pub fn frontmost_title(&self) -> String {
        frontmost_title(self.frontmost.as_ref(), &self.sources)
    }

    pub fn quick_switch_title(&self) -> String {
        format!("Quick Switch ({})", self.hotkey)
    }
}

#[cfg(target_os = "macos")]
pub use self::macos::Tray;

#[cfg(target_os = "macos")]
mod macos {
    use std::collections::HashMap;

    use tray_icon::menu::{
        CheckMenuItem, IsMenuItem, Menu, MenuId, MenuItem, PredefinedMenuItem, Submenu,
    };
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    use super::{MenuAction, MenuModel, DEFAULT_LABEL};
    use crate::core::error::{Error, Result};

    const ICON_SIZE: usize = 16;

    fn tray_error(e: impl std::fmt::Display) -> Error {
        Error::Tray(e.to_string())
    }

    pub struct Tray {
        icon: TrayIcon,
        frontmost: MenuItem,
        actions: HashMap<MenuId, MenuAction>,
    }

    impl Tray {
        pub fn new(model: &MenuModel) -> Result<Self> {
            let (menu, frontmost, actions) = build_menu(model)?;
            let icon = TrayIconBuilder::new()
                .with_menu(Box::new(menu))
                .with_tooltip("Input Binder")
                .with_icon(load_icon()?)
                .with_icon_as_template(true)
                .build()
                .map_err(tray_error)?;
            Ok(Self {
                icon,
                frontmost,
                actions,
            })
        }

        /// Replaces the whole menu.
        pub fn update(&mut self, model: &MenuModel) -> Result<()> {
            let (menu, frontmost, actions) = build_menu(model)?;
            self.icon.set_menu(Some(Box::new(menu)));
            self.frontmost = frontmost;
            self.actions = actions;
            Ok(())
        }

        /// Retitles the frontmost-app item without rebuilding the menu.
        pub fn set_frontmost_title(&self, title: &str) {
            if self.frontmost.text() != title {
                self.frontmost.set_text(title);
            }
        }

        /// Shows the current input source next to the icon.
        pub fn set_title(&self, title: Option<&str>) {
            self.icon.set_title(title);
        }

        pub fn action(&self, id: &MenuId) -> Option<&MenuAction> {
            self.actions.get(id)
        }
    }

    struct MenuBuilder {
        actions: HashMap<MenuId, MenuAction>,
    }

    impl MenuBuilder {
        fn item(&mut self, text: &str, enabled: bool, action: MenuAction) -> MenuItem {
            let item = MenuItem::new(text, enabled, None);
            self.actions.insert(item.id().clone(), action);
            item
        }

        fn check(&mut self, text: &str, checked: bool, action: MenuAction) -> CheckMenuItem {
            let item = CheckMenuItem::new(text, true, checked, None);
            self.actions.insert(item.id().clone(), action);
            item
        }
    }

    fn build_menu(model: &MenuModel) -> Result<(Menu, MenuItem, HashMap<MenuId, MenuAction>)> {
        let mut builder = MenuBuilder {
            actions: HashMap::new(),
        };
        let menu = Menu::new();

        let frontmost = MenuItem::new(model.frontmost_title(), false, None);
        append(&menu, &frontmost)?;
        append(&menu, &PredefinedMenuItem::separator())?;

        let running = Submenu::new("Running Apps", !model.apps.is_empty());
        for app in &model.apps {
            let submenu = Submenu::new(model.app_title(app), true);
            let current = app.binding.as_ref();

            let default = builder.check(
                DEFAULT_LABEL,
                current == Some(&None),
                MenuAction::Bind {
                    bundle_id: app.bundle_id.clone(),
                    source_id: None,
                },
            );
            append_sub(&submenu, &default)?;
            append_sub(&submenu, &PredefinedMenuItem::separator())?;

            for source in &model.sources {
                let checked = current.and_then(|b| b.as_deref()) == Some(source.id.as_str());
                let item = builder.check(
                    &source.name,
                    checked,
                    MenuAction::Bind {
                        bundle_id: app.bundle_id.clone(),
                        source_id: Some(source.id.clone()),
                    },
                );
                append_sub(&submenu, &item)?;
            }

            append_sub(&submenu, &PredefinedMenuItem::separator())?;
            let remove = builder.item(
                "Remove Binding",
                current.is_some(),
                MenuAction::Unbind(app.bundle_id.clone()),
            );
            append_sub(&submenu, &remove)?;

            append_sub(&running, &submenu)?;
        }
        append(&menu, &running)?;
        append(&menu, &PredefinedMenuItem::separator())?;

        let quick_switch = builder.check(
            &model.quick_switch_title(),
            model.quick_switch_enabled,
            MenuAction::ToggleQuickSwitch,
        );
        append(&menu, &quick_switch)?;
        let login_item = builder.check(
            "Launch at Login",
            model.login_item_enabled,
            MenuAction::ToggleLoginItem,
        );
        append(&menu, &login_item)?;

        let settings = MenuItem::new(
            format!("Settings: {}", model.settings_path.display()),
            false,
            None,
        );
        append(&menu, &settings)?;
        append(&menu, &PredefinedMenuItem::separator())?;

        let quit = builder.item("Quit", true, MenuAction::Quit);
        append(&menu, &quit)?;

        Ok((menu, frontmost, builder.actions))
    }

    fn append(menu: &Menu, item: &dyn IsMenuItem) -> Result<()> {
        menu.append(item).map_err(tray_error)
    }

    fn append_sub(menu: &Submenu, item: &dyn IsMenuItem) -> Result<()> {
        menu.append(item).map_err(tray_error)
    }

    // A small keyboard outline; rendered as a template image so it follows
    // the menu bar appearance.
    fn load_icon() -> Result<Icon> {
        let mut rgba = Vec::with_capacity(ICON_SIZE * ICON_SIZE * 4);
        for y in 0..ICON_SIZE {
            for x in 0..ICON_SIZE {
                let in_body = (1..15).contains(&x) && (3..13).contains(&y);
                let border = in_body && (x == 1 || x == 14 || y == 3 || y == 12);
                let key = in_body && !border && x % 3 == 0 && (y == 5 || y == 7);
                let space_bar = (4..12).contains(&x) && y == 10;

                if border || key || space_bar {
                    rgba.extend_from_slice(&[0, 0, 0, 255]);
                } else {
                    rgba.extend_from_slice(&[0, 0, 0, 0]);
                }
            }
        }
        Icon::from_rgba(rgba, ICON_SIZE as u32, ICON_SIZE as u32).map_err(tray_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<InputSource> {
        vec![
            InputSource::new("com.apple.keylayout.ABC", "ABC"),
            InputSource::new("com.apple.keylayout.Russian", "Russian"),
        ]
    }

    fn entry(name: &str, binding: Option<Option<&str>>) -> AppEntry {
        AppEntry::new(
            &AppInfo::new(format!("com.test.{}", name.to_lowercase()), name, "/Applications"),
            binding,
        )
    }

    #[test]
    fn labels_name_sources_defaults_and_stale_ids() {
        let sources = sources();
        assert_eq!(binding_label(None, &sources), None);
        assert_eq!(binding_label(Some(None), &sources).as_deref(), Some(DEFAULT_LABEL));
        assert_eq!(
            binding_label(Some(Some("com.apple.keylayout.Russian")), &sources).as_deref(),
            Some("Russian")
        );
        assert_eq!(
            binding_label(Some(Some("com.example.gone")), &sources).as_deref(),
            Some("com.example.gone")
        );
    }

    #[test]
    fn titles_reflect_bindings() {
        let model = MenuModel {
            frontmost: Some(entry("Terminal", Some(Some("com.apple.keylayout.ABC")))),
            sources: sources(),
            hotkey: "ctrl+shift+space".to_string(),
            ..MenuModel::default()
        };

        assert_eq!(model.frontmost_title(), "Terminal: ABC");
        assert_eq!(model.app_title(&entry("Notes", None)), "Notes");
        assert_eq!(
            model.app_title(&entry("Notes", Some(None))),
            "Notes (System Default)"
        );
        assert_eq!(model.quick_switch_title(), "Quick Switch (ctrl+shift+space)");
    }

    #[test]
    fn frontmost_title_without_app_or_binding() {
        let mut model = MenuModel::default();
        assert_eq!(model.frontmost_title(), "No active application");

        model.frontmost = Some(entry("Safari", None));
        assert_eq!(model.frontmost_title(), "Safari: not bound");
    }

    #[test]
    fn frontmost_title_changes_only_with_app_or_binding() {
        let sources = sources();
        let bound = entry("Safari", Some(Some("com.apple.keylayout.Russian")));
        let title = frontmost_title(Some(&bound), &sources);
        assert_eq!(title, "Safari: Russian");
        assert_eq!(frontmost_title(Some(&bound), &sources), title);

        let rebound = entry("Safari", Some(Some("com.apple.keylayout.ABC")));
        assert_ne!(frontmost_title(Some(&rebound), &sources), title);
        let other_app = entry("Notes", Some(Some("com.apple.keylayout.Russian")));
        assert_ne!(frontmost_title(Some(&other_app), &sources), title);
    }
}
