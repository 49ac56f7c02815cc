// Capsesc CLI
// Daemon that turns a tap of Caps Lock into Escape on every keyboard

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::LevelFilter;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use capsesc_core::settings::LOG_LEVEL_ENV;
use capsesc_core::{
    enumerate_keyboard_devices, parse_log_level, shutdown_channel, spawn_hotplug_watcher, Daemon,
    DeviceSet, EvdevKeyboard, EvdevOpener, Emitter, HotplugWatcher, Poller, Settings,
    ShutdownTrigger, VirtualKeyboard, SUBSTITUTE_KEY,
};

/// Caps Lock tap to Escape daemon
#[derive(Parser, Debug)]
#[command(name = "capsesc")]
#[command(version)]
#[command(about = "Tap Caps Lock to send Escape", long_about = None)]
struct Args {
    /// TOML settings file (default: ~/.config/capsesc/settings.toml)
    #[arg(short, long, value_name = "SETTINGS")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List available keyboard devices and exit
    #[arg(long)]
    list_devices: bool,
}

/// Explicit log level from --verbose or the capsesc variable.
/// `None` leaves the choice to RUST_LOG (default info).
fn resolve_log_level(verbose: bool, env_value: Option<&str>) -> Option<LevelFilter> {
    if verbose {
        return Some(LevelFilter::Debug);
    }
    env_value.and_then(parse_log_level)
}

fn init_logging(verbose: bool) {
    let env_value = std::env::var(LOG_LEVEL_ENV).ok();
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = resolve_log_level(verbose, env_value.as_deref()) {
        builder.filter_level(level);
    }
    builder.format_timestamp_millis().init();
}

fn load_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load_default()?,
    };
    if let Some(path) = settings.source_path() {
        log::info!("Loaded settings from {}", path.display());
    }
    Ok(settings)
}

/// Print every keyboard udev knows about
fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = enumerate_keyboard_devices()?;
    println!("Found {} keyboard device(s):", devices.len());
    for (index, (id, devnode)) in devices.iter().enumerate() {
        match EvdevKeyboard::open(devnode) {
            Ok(keyboard) => println!("  {}: {} ({})", index, keyboard.name(), id),
            Err(e) => println!("  {}: {} (cannot open: {})", index, id, e),
        }
    }
    Ok(())
}

/// What to do about a termination signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Ask the loop to stop cleanly
    Shutdown,
    /// Shutdown was already requested and has not finished; exit now
    Force,
}

fn signal_action(already_received: usize) -> SignalAction {
    if already_received == 0 {
        SignalAction::Shutdown
    } else {
        SignalAction::Force
    }
}

/// Forward SIGINT and SIGTERM to the daemon loop. A repeated signal while
/// shutdown is still in progress terminates the process.
fn spawn_signal_handler(trigger: ShutdownTrigger) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for (received, signal) in signals.forever().enumerate() {
                match signal_action(received) {
                    SignalAction::Shutdown => {
                        log::info!("Received signal {}, shutting down", signal);
                        if let Err(e) = trigger.request() {
                            log::error!("Could not stop the daemon loop: {}", e);
                        }
                    }
                    SignalAction::Force => {
                        log::warn!("Received signal {} again, exiting immediately", signal);
                        std::process::exit(128 + signal);
                    }
                }
            }
        })?;
    Ok(())
}

fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (trigger, shutdown) = shutdown_channel()?;
    spawn_signal_handler(trigger.clone())?;

    let output = VirtualKeyboard::new(settings.virtual_name(), SUBSTITUTE_KEY).map_err(|e| {
        log::log!(e.severity().log_level(), "{} (is the uinput module loaded?)", e);
        e
    })?;
    log::info!("Created virtual keyboard \"{}\"", settings.virtual_name());

    let devices = Arc::new(DeviceSet::<EvdevKeyboard>::new(
        Poller::new()?,
        settings.max_devices(),
    ));

    // Subscribe before enumerating so nothing plugged in between is missed;
    // anything seen twice is rejected as already tracked.
    let hotplug = HotplugWatcher::new(Arc::clone(&devices), EvdevOpener, settings.device_filter());
    spawn_hotplug_watcher(hotplug, trigger)?;

    let startup = HotplugWatcher::new(Arc::clone(&devices), EvdevOpener, settings.device_filter());
    let attached = startup.seed(enumerate_keyboard_devices()?);
    if attached == 0 {
        log::warn!("No keyboards attached yet; waiting for hotplug");
    }

    let mut daemon = Daemon::new(devices, Emitter::new(output), shutdown)?;
    let result = daemon.run();
    log::info!("Emitted {} substitute tap(s)", daemon.emitted());
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.severity().is_fatal() => {
            log::log!(e.severity().log_level(), "Daemon stopped: {}", e);
            Err(e.into())
        }
        Err(e) => {
            log::log!(e.severity().log_level(), "Daemon stopped: {}", e);
            Ok(())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_devices {
        return list_devices();
    }

    let settings = load_settings(&args)?;
    run(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["capsesc"]);

        assert_eq!(args.config, None);
        assert!(!args.verbose);
        assert!(!args.list_devices);
    }

    #[test]
    fn test_args_with_options() {
        let args = Args::parse_from(["capsesc", "--config", "/tmp/capsesc.toml", "-v"]);

        assert_eq!(args.config, Some(PathBuf::from("/tmp/capsesc.toml")));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_list_devices() {
        let args = Args::parse_from(["capsesc", "--list-devices"]);

        assert!(args.list_devices);
    }

    #[test]
    fn test_first_signal_shuts_down() {
        assert_eq!(signal_action(0), SignalAction::Shutdown);
    }

    #[test]
    fn test_repeated_signal_forces_exit() {
        assert_eq!(signal_action(1), SignalAction::Force);
        assert_eq!(signal_action(5), SignalAction::Force);
    }

    #[test]
    fn test_verbose_overrides_environment() {
        assert_eq!(resolve_log_level(true, Some("0")), Some(LevelFilter::Debug));
    }

    #[test]
    fn test_environment_level() {
        assert_eq!(resolve_log_level(false, Some("6")), Some(LevelFilter::Trace));
        assert_eq!(resolve_log_level(false, Some("warning")), Some(LevelFilter::Warn));
    }

    #[test]
    fn test_invalid_environment_level_defers_to_rust_log() {
        assert_eq!(resolve_log_level(false, Some("nope")), None);
        assert_eq!(resolve_log_level(false, None), None);
    }
}
