//! The long-running menu bar process.

use std::path::PathBuf;
use std::time::Instant;

use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};
use tracing::{debug, error, info, warn};
use tray_icon::menu::MenuEvent;

use crate::core::apps::{running_apps, AppInfo};
use crate::core::config::SettingsStore;
use crate::core::debounce::Debouncer;
use crate::core::error::Result;
use crate::core::hotkey::{Hotkey, HotkeyRegistration};
use crate::core::monitor::CarbonInputSources;
use crate::core::observer::{Notice, NoticeKind, Observer};
use crate::core::service;
use crate::core::sources::TextInputServices;
use crate::core::switcher::{Outcome, Switcher};
use crate::core::tray::{frontmost_title, AppEntry, MenuAction, MenuModel, Tray};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings_path: PathBuf,
    pub tray: bool,
}

#[derive(Debug)]
enum UserEvent {
    Notice(Notice),
    Menu(MenuEvent),
}

struct App {
    switcher: Switcher<CarbonInputSources>,
    debouncer: Debouncer<NoticeKind, Notice>,
    proxy: EventLoopProxy<UserEvent>,
    running: Vec<AppInfo>,
    frontmost: Option<String>,
    hotkey: Option<HotkeyRegistration>,
    tray: Option<Tray>,
    show_tray: bool,
}

impl App {
    fn new(store: SettingsStore, proxy: EventLoopProxy<UserEvent>, show_tray: bool) -> Self {
        let debounce = store.settings().debounce;
        let debouncer = Debouncer::new(debounce.activation())
            .with_delay(NoticeKind::Activation, debounce.activation())
            .with_delay(NoticeKind::Sources, debounce.sources())
            .with_delay(NoticeKind::AppList, debounce.app_list());

        let services = CarbonInputSources::new();
        let frontmost = services.frontmost_bundle_id();
        let mut switcher = Switcher::new(services, store);
        if let Err(e) = switcher.refresh_sources() {
            warn!("Could not enumerate input sources: {}", e);
        }

        Self {
            switcher,
            debouncer,
            proxy,
            running: running_apps(),
            frontmost,
            hotkey: None,
            tray: None,
            show_tray,
        }
    }

    fn handle_event(&mut self, event: Event<UserEvent>) -> ControlFlow {
        match event {
            Event::NewEvents(StartCause::Init) => self.handle_init(),
            Event::UserEvent(UserEvent::Notice(notice)) => match notice.debounce_kind() {
                Some(kind) => self.debouncer.push(kind, notice, Instant::now()),
                None => self.dispatch(notice),
            },
            Event::UserEvent(UserEvent::Menu(event)) => {
                if self.handle_menu_event(&event) {
                    self.tray.take();
                    return ControlFlow::Exit;
                }
            }
            _ => {}
        }

        for (_, notice) in self.debouncer.drain_due(Instant::now()) {
            self.dispatch(notice);
        }

        match self.debouncer.next_deadline() {
            Some(deadline) => ControlFlow::WaitUntil(deadline),
            None => ControlFlow::Wait,
        }
    }

    fn handle_init(&mut self) {
        self.sync_hotkey();

        if self.show_tray {
            match Tray::new(&self.menu_model()) {
                Ok(tray) => self.tray = Some(tray),
                Err(e) => error!("Could not create the menu bar item: {}", e),
            }
            self.update_title();
        }

        // Apply the binding of whatever is frontmost at launch.
        if let Some(bundle_id) = self.frontmost.clone() {
            self.activate(&bundle_id);
        }
        info!("Watching application activations");
    }

    fn dispatch(&mut self, notice: Notice) {
        debug!("Handling {:?}", notice);
        match notice {
            Notice::AppActivated(bundle_id) => {
                let reloaded = self.switcher.reload_settings();
                self.frontmost = Some(bundle_id.clone());
                self.activate(&bundle_id);
                if reloaded {
                    self.sync_hotkey();
                    self.refresh_menu();
                } else {
                    self.update_frontmost();
                }
            }
            Notice::AppLaunched | Notice::AppTerminated => {
                self.running = running_apps();
                self.refresh_menu();
            }
            Notice::SourcesChanged => {
                if let Err(e) = self.switcher.refresh_sources() {
                    warn!("Could not enumerate input sources: {}", e);
                }
                self.refresh_menu();
                self.update_title();
            }
            Notice::SelectionChanged => self.update_title(),
            Notice::QuickSwitch => {
                if let Err(e) = self.switcher.quick_switch() {
                    warn!("Quick switch failed: {}", e);
                }
                self.sync_hotkey();
            }
        }
    }

    fn activate(&mut self, bundle_id: &str) {
        match self.switcher.handle_activation(bundle_id) {
            Ok(Outcome::Unbound) => debug!("{} has no binding", bundle_id),
            Ok(outcome) => debug!("{}: {:?}", bundle_id, outcome),
            Err(e) => warn!("Could not apply the binding for {}: {}", bundle_id, e),
        }
    }

    /// Returns `true` when the user asked to quit.
    fn handle_menu_event(&mut self, event: &MenuEvent) -> bool {
        let Some(action) = self
            .tray
            .as_ref()
            .and_then(|tray| tray.action(&event.id))
            .cloned()
        else {
            return false;
        };

        let result = match action {
            MenuAction::Quit => {
                info!("Quit requested from the menu bar");
                return true;
            }
            MenuAction::Bind {
                bundle_id,
                source_id,
            } => self
                .switcher
                .bind(&bundle_id, source_id.as_deref())
                .map(|_| ()),
            MenuAction::Unbind(bundle_id) => self.switcher.unbind(&bundle_id).map(|_| ()),
            MenuAction::ToggleQuickSwitch => {
                let enabled = !self.switcher.store().settings().quick_switch.enabled;
                let result = self.switcher.set_quick_switch_enabled(enabled);
                self.sync_hotkey();
                result
            }
            MenuAction::ToggleLoginItem => {
                service::is_enabled().and_then(|enabled| service::set_enabled(!enabled))
            }
        };

        if let Err(e) = result {
            error!("Menu action failed: {}", e);
        }
        self.refresh_menu();
        false
    }

    /// Keeps the registered hotkey in step with the settings.
    fn sync_hotkey(&mut self) {
        let quick_switch = &self.switcher.store().settings().quick_switch;
        let wanted = if quick_switch.enabled {
            match Hotkey::parse(&quick_switch.hotkey) {
                Ok(hotkey) => Some(hotkey),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        } else {
            None
        };

        if self.hotkey.as_ref().map(HotkeyRegistration::hotkey) == wanted {
            return;
        }
        self.hotkey = None;

        if let Some(hotkey) = wanted {
            let proxy = self.proxy.clone();
            match HotkeyRegistration::register(hotkey, move || {
                let _ = proxy.send_event(UserEvent::Notice(Notice::QuickSwitch));
            }) {
                Ok(registration) => self.hotkey = Some(registration),
                Err(e) => error!("Could not register {}: {}", hotkey, e),
            }
        }
    }

    fn frontmost_entry(&self) -> Option<AppEntry> {
        let store = self.switcher.store();
        let bundle_id = self.frontmost.as_deref()?;
        let entry = match self.running.iter().find(|app| app.bundle_id == bundle_id) {
            Some(app) => AppEntry::new(app, store.binding(bundle_id)),
            None => AppEntry {
                bundle_id: bundle_id.to_string(),
                name: bundle_id.to_string(),
                binding: store.binding(bundle_id).map(|b| b.map(str::to_string)),
            },
        };
        Some(entry)
    }

    fn menu_model(&self) -> MenuModel {
        let store = self.switcher.store();
        let entry = |app: &AppInfo| AppEntry::new(app, store.binding(&app.bundle_id));

        MenuModel {
            frontmost: self.frontmost_entry(),
            apps: self.running.iter().map(entry).collect(),
            sources: self.switcher.sources().to_vec(),
            quick_switch_enabled: store.settings().quick_switch.enabled,
            hotkey: store.settings().quick_switch.hotkey.clone(),
            login_item_enabled: service::is_enabled().unwrap_or(false),
            settings_path: store.path().to_path_buf(),
        }
    }

    fn refresh_menu(&mut self) {
        let model = self.menu_model();
        if let Some(tray) = self.tray.as_mut() {
            if let Err(e) = tray.update(&model) {
                warn!("Could not rebuild the menu: {}", e);
            }
        }
    }

    fn update_frontmost(&self) {
        if let Some(tray) = self.tray.as_ref() {
            let entry = self.frontmost_entry();
            tray.set_frontmost_title(&frontmost_title(entry.as_ref(), self.switcher.sources()));
        }
    }

    fn update_title(&self) {
        let Some(tray) = self.tray.as_ref() else {
            return;
        };
        match self.switcher.services().current_source_id() {
            Ok(id) => tray.set_title(Some(self.switcher.source_name(&id))),
            Err(e) => {
                debug!("{}", e);
                tray.set_title(None);
            }
        }
    }
}

/// Runs the menu bar process until the user quits. Never returns on success.
pub fn run(options: RunOptions) -> Result<()> {
    let store = SettingsStore::open(&options.settings_path)?;
    info!("Using settings at {}", store.path().display());

    let mut event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    event_loop.set_activation_policy(ActivationPolicy::Accessory);

    let proxy = event_loop.create_proxy();
    MenuEvent::set_event_handler(Some(move |event| {
        let _ = proxy.send_event(UserEvent::Menu(event));
    }));

    let proxy = event_loop.create_proxy();
    let observer = Observer::install(move |notice| {
        let _ = proxy.send_event(UserEvent::Notice(notice));
    });

    let mut app = App::new(store, event_loop.create_proxy(), options.tray);

    event_loop.run(move |event, _, control_flow| {
        let _observer = &observer;
        *control_flow = app.handle_event(event);
    })
}
