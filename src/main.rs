use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use input_binder::core::config::{self, SettingsStore};
use input_binder::core::hotkey::Hotkey;
use input_binder::core::service::{self, LoginItemStatus};

#[derive(Parser)]
#[command(name = "input-binder", version, about = "Switch the keyboard input source per application")]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the menu bar process (default).
    Run {
        /// Do not show the menu bar item.
        #[arg(long)]
        no_tray: bool,
    },
    /// List enabled keyboard input sources.
    Sources,
    /// Print the current input source.
    Current,
    /// List applications, optionally filtered by a fuzzy query.
    Apps {
        /// Only list running applications.
        #[arg(long)]
        running: bool,
        query: Option<String>,
    },
    /// List configured bindings.
    Bindings,
    /// Bind an application to an input source, or to the system default
    /// when SOURCE is omitted.
    Bind { bundle_id: String, source: Option<String> },
    /// Remove an application's binding.
    Unbind { bundle_id: String },
    /// Advance an application's binding to the next input source.
    Cycle { bundle_id: String },
    /// Show or change quick-switch settings.
    QuickSwitch(QuickSwitchArgs),
    /// Manage launch at login.
    LoginItem {
        #[arg(value_enum)]
        action: LoginItemAction,
    },
}

#[derive(Args)]
struct QuickSwitchArgs {
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
    /// Shortcut such as `ctrl+shift+space`.
    #[arg(long, value_name = "SPEC")]
    hotkey: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LoginItemAction {
    Enable,
    Disable,
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("input_binder=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings_path = match cli.settings {
        Some(path) => path,
        None => config::get_config_path().context("locating the settings file")?,
    };

    match cli.command.unwrap_or(Command::Run { no_tray: false }) {
        Command::Run { no_tray } => platform::run(settings_path, !no_tray),
        Command::Sources => platform::sources(),
        Command::Current => platform::current(),
        Command::Apps { running, query } => platform::apps(&settings_path, running, query.as_deref()),
        Command::Bindings => bindings(&settings_path),
        Command::Bind { bundle_id, source } => {
            platform::bind(&settings_path, &bundle_id, source.as_deref())
        }
        Command::Unbind { bundle_id } => unbind(&settings_path, &bundle_id),
        Command::Cycle { bundle_id } => platform::cycle(&settings_path, &bundle_id),
        Command::QuickSwitch(args) => quick_switch(&settings_path, args),
        Command::LoginItem { action } => login_item(action),
    }
}

fn open_store(path: &Path) -> Result<SettingsStore> {
    SettingsStore::open(path).with_context(|| format!("opening settings at {}", path.display()))
}

fn describe_binding(binding: Option<&str>) -> &str {
    binding.unwrap_or("system default")
}

fn bindings(settings_path: &Path) -> Result<()> {
    let store = open_store(settings_path)?;
    if store.bindings().is_empty() {
        println!("No bindings in {}", store.path().display());
        return Ok(());
    }
    for (bundle_id, source) in store.bindings() {
        println!("{}\t{}", bundle_id, describe_binding(source.as_deref()));
    }
    Ok(())
}

fn unbind(settings_path: &Path, bundle_id: &str) -> Result<()> {
    let mut store = open_store(settings_path)?;
    if store.remove_binding(bundle_id)? {
        println!("Removed binding for {}", bundle_id);
    } else {
        println!("{} has no binding", bundle_id);
    }
    Ok(())
}

fn quick_switch(settings_path: &Path, args: QuickSwitchArgs) -> Result<()> {
    let mut store = open_store(settings_path)?;
    if args.enable || args.disable {
        store.set_quick_switch_enabled(args.enable)?;
    }
    if let Some(spec) = args.hotkey {
        let hotkey = Hotkey::parse(&spec)?;
        store.set_hotkey(&hotkey.to_string())?;
    }

    let quick_switch = &store.settings().quick_switch;
    println!(
        "Quick switch {} ({})",
        if quick_switch.enabled { "enabled" } else { "disabled" },
        quick_switch.hotkey
    );
    Ok(())
}

fn login_item(action: LoginItemAction) -> Result<()> {
    match action {
        LoginItemAction::Enable => service::set_enabled(true)?,
        LoginItemAction::Disable => service::set_enabled(false)?,
        LoginItemAction::Status => {
            let status = match service::status()? {
                LoginItemStatus::NotInstalled => "not installed",
                LoginItemStatus::Installed => "installed, not loaded",
                LoginItemStatus::Loaded => "loaded",
            };
            println!("Launch at login: {} ({})", status, service::get_plist_path()?.display());
        }
    }
    Ok(())
}

#[cfg(target_os = "macos")]
mod platform {
    use std::path::{Path, PathBuf};

    use anyhow::Result;

    use input_binder::core::apps::{installed_apps, running_apps};
    use input_binder::core::monitor::CarbonInputSources;
    use input_binder::core::search::search;
    use input_binder::core::sources::TextInputServices;
    use input_binder::core::switcher::{Outcome, Switcher};
    use input_binder::RunOptions;

    use super::{describe_binding, open_store};

    fn switcher(settings_path: &Path) -> Result<Switcher<CarbonInputSources>> {
        let store = open_store(settings_path)?;
        let mut switcher = Switcher::new(CarbonInputSources::new(), store);
        switcher.refresh_sources()?;
        Ok(switcher)
    }

    pub fn run(settings_path: PathBuf, tray: bool) -> Result<()> {
        input_binder::run(RunOptions {
            settings_path,
            tray,
        })?;
        Ok(())
    }

    pub fn sources() -> Result<()> {
        let services = CarbonInputSources::new();
        let current = services.current_source_id().ok();
        for source in services.input_sources()? {
            let marker = if current.as_deref() == Some(source.id.as_str()) {
                "*"
            } else {
                " "
            };
            println!("{} {}\t{}", marker, source.id, source.name);
        }
        Ok(())
    }

    pub fn current() -> Result<()> {
        let services = CarbonInputSources::new();
        let id = services.current_source_id()?;
        let sources = services.input_sources()?;
        let name = sources
            .iter()
            .find(|s| s.id == id)
            .map_or(id.as_str(), |s| s.name.as_str());
        println!("{}\t{}", id, name);
        Ok(())
    }

    pub fn apps(settings_path: &Path, running: bool, query: Option<&str>) -> Result<()> {
        let switcher = switcher(settings_path)?;
        let apps = if running { running_apps() } else { installed_apps() };
        let apps = search(apps, query.unwrap_or_default(), |app| app.name.as_str());

        for app in &apps {
            let binding = match switcher.store().binding(&app.bundle_id) {
                None => String::new(),
                Some(None) => describe_binding(None).to_string(),
                Some(Some(id)) => switcher.source_name(id).to_string(),
            };
            println!("{}\t{}\t{}", app.name, app.bundle_id, binding);
        }
        Ok(())
    }

    pub fn bind(settings_path: &Path, bundle_id: &str, source: Option<&str>) -> Result<()> {
        let mut switcher = switcher(settings_path)?;
        let outcome = switcher.bind(bundle_id, source)?;
        let target = source.map_or(describe_binding(None), |id| switcher.source_name(id));
        println!("Bound {} to {}", bundle_id, target);
        if let Outcome::Switched(_) = outcome {
            println!("Switched the frontmost application");
        }
        Ok(())
    }

    pub fn cycle(settings_path: &Path, bundle_id: &str) -> Result<()> {
        let mut switcher = switcher(settings_path)?;
        match switcher.cycle_binding(bundle_id)? {
            Some(id) => println!("Bound {} to {}", bundle_id, switcher.source_name(&id)),
            None => println!("Removed binding for {}", bundle_id),
        }
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use std::path::{Path, PathBuf};

    use anyhow::{bail, Result};

    use super::open_store;

    const UNSUPPORTED: &str = "input sources are only available on macOS";

    pub fn run(_settings_path: PathBuf, _tray: bool) -> Result<()> {
        bail!(UNSUPPORTED)
    }

    pub fn sources() -> Result<()> {
        bail!(UNSUPPORTED)
    }

    pub fn current() -> Result<()> {
        bail!(UNSUPPORTED)
    }

    pub fn apps(_settings_path: &Path, _running: bool, _query: Option<&str>) -> Result<()> {
        bail!(UNSUPPORTED)
    }

    /// Only default bindings can be stored without checking the source list.
    pub fn bind(settings_path: &Path, bundle_id: &str, source: Option<&str>) -> Result<()> {
        if source.is_some() {
            bail!(UNSUPPORTED);
        }
        let mut store = open_store(settings_path)?;
        store.set_binding(bundle_id, None)?;
        println!("Bound {} to system default", bundle_id);
        Ok(())
    }

    pub fn cycle(_settings_path: &Path, _bundle_id: &str) -> Result<()> {
        bail!(UNSUPPORTED)
    }
}
