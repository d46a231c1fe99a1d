//! orbit-addons - Main entry point.
//!
//! Usage: orbit-addons [OPTIONS] <COMMAND> [ID]
//!
//! Commands:
//!   list             List installed add-ons
//!   status <id>      Show install and download state of an add-on
//!   install <id>     Look up an add-on in the catalog and install it
//!   uninstall <id>   Remove an installed add-on
//!   sweep            Delete leftovers from interrupted downloads
//!
//! Options:
//!   --version, -v    Show version
//!   --config <path>  Use a config file other than ~/.orbitrc

use std::env;
use std::path::PathBuf;
use std::process;

use orbit_addons::addons::{CatalogProvider, HttpCatalog};
use orbit_addons::{AddonEvent, AddonManager, Config, InstallOutcome, InstallRequest, VERSION};

/// Parsed command.
enum Command {
    List,
    Status(String),
    Install(String),
    Uninstall(String),
    Sweep,
}

/// Usage text printed on bad input.
const USAGE: &str = "Usage: orbit-addons [--config <path>] <list|status <id>|install <id>|uninstall <id>|sweep>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("orbit-addons v{}", VERSION);
        return Ok(());
    }

    let (config_path, rest) = split_config_flag(&args);
    let Some(command) = parse_command(&rest) else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };

    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    let log_guard = orbit_addons::logging::init(&config.log_config)?;

    let manager = AddonManager::new(config.addon_settings());
    manager.ensure_root()?;

    let code = match command {
        Command::List => list(&manager),
        Command::Status(id) => status(&manager, &id),
        Command::Install(id) => install(&manager, &config, &id).await,
        Command::Uninstall(id) => uninstall(&manager, &id).await,
        Command::Sweep => sweep(&manager),
    };

    // process::exit skips destructors; flush the log writer first.
    drop(log_guard);
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}

/// Pulls `--config <path>` out of the argument list.
fn split_config_flag(args: &[String]) -> (Option<PathBuf>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().map(PathBuf::from);
        } else {
            rest.push(arg.clone());
        }
    }
    (config, rest)
}

fn parse_command(args: &[String]) -> Option<Command> {
    let id = args.get(1).cloned();
    match args.first().map(String::as_str)? {
        "list" | "ls" => Some(Command::List),
        "status" => id.map(Command::Status),
        "install" => id.map(Command::Install),
        "uninstall" | "remove" => id.map(Command::Uninstall),
        "sweep" => Some(Command::Sweep),
        _ => None,
    }
}

fn list(manager: &AddonManager) -> i32 {
    let items = manager.list();
    if items.is_empty() {
        println!("No add-ons installed in {}", manager.root().display());
        return 0;
    }
    for item in items {
        println!("{:<24} {}", item.id, item.name);
    }
    0
}

fn status(manager: &AddonManager, id: &str) -> i32 {
    let state = if manager.is_downloading(id) {
        match manager.progress(id) {
            Some(fraction) => format!("downloading ({:.0}%)", fraction * 100.0),
            None => "downloading".to_string(),
        }
    } else if let Some(item) = manager.installed_item(id) {
        format!("installed ({})", item.name)
    } else if manager.is_installed(id) {
        "incomplete (directory without manifest)".to_string()
    } else {
        "not installed".to_string()
    };
    println!("{}: {}", id, state);
    0
}

async fn install(manager: &AddonManager, config: &Config, id: &str) -> i32 {
    let client = reqwest::Client::new();
    let catalog = HttpCatalog::new(client, config.catalog_url.clone());
    let item = match catalog.fetch_item(id, &config.locale).await {
        Ok(item) => item,
        Err(e) => {
            eprintln!("Catalog lookup failed: {}", e);
            return 1;
        }
    };

    let mut task = match manager.install(item) {
        Ok(InstallRequest::Started(task)) => task,
        Ok(InstallRequest::AlreadyInProgress) => {
            println!("{} is already being installed", id);
            return 0;
        }
        Err(e) => {
            eprintln!("Cannot install {}: {}", id, e);
            return 1;
        }
    };

    let id = task.id().to_string();
    println!("Installing {}...", id);
    let mut last_percent = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                task.cancel();
                break;
            }
            event = task.events().recv() => {
                let Some(event) = event else { break };
                match event {
                    AddonEvent::Progress { fraction, .. } => {
                        let percent = (fraction * 100.0).floor() as u32;
                        if last_percent != Some(percent) {
                            println!("  {:>3}%", percent);
                            last_percent = Some(percent);
                        }
                    }
                    AddonEvent::Unpacked { .. } => println!("  unpacked"),
                    AddonEvent::Succeeded { .. } | AddonEvent::Failed { .. } => break,
                }
            }
        }
    }

    match task.wait().await {
        Ok(InstallOutcome::Installed) => {
            println!("Installed {}", id);
            0
        }
        Ok(InstallOutcome::Cancelled) => {
            println!("Cancelled");
            130
        }
        Ok(InstallOutcome::Failed(e)) => {
            eprintln!("Install of {} failed: {}", id, e);
            1
        }
        Err(e) => {
            eprintln!("Install of {} failed: {}", id, e);
            1
        }
    }
}

async fn uninstall(manager: &AddonManager, id: &str) -> i32 {
    match manager.uninstall(id).await {
        Ok(()) => {
            println!("Removed {}", id);
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn sweep(manager: &AddonManager) -> i32 {
    match manager.sweep_staging_area() {
        Ok(count) => {
            println!("Removed {} stale file(s)", count);
            0
        }
        Err(e) => {
            eprintln!("Sweep failed: {}", e);
            1
        }
    }
}
