//! Tether command-line front end
//!
//! Lists USB serial ports and monitors one of them, on host hardware or
//! against the virtual devices from the settings file.

mod monitor;
mod settings;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tether_core::{SerialBridge, UsbPlatform};
use tether_native::NativePlatform;
use tether_sim::SimPlatform;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use monitor::{MonitorOptions, Target};
use settings::Settings;

/// Tether - USB serial device bridge
#[derive(Parser, Debug)]
#[command(name = "tether", version, author, long_about = None)]
struct Cli {
    /// Use the virtual devices from the settings file instead of host hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered serial ports with their indices
    List,

    /// Connect to a port and print the bytes it sends
    Monitor {
        /// Port index as shown by `tether list`
        index: Option<usize>,

        /// Port label as shown by `tether list`
        #[arg(long, conflicts_with = "index")]
        name: Option<String>,

        /// Stop after this many read batches
        #[arg(long)]
        count: Option<usize>,

        /// Print bytes as hex
        #[arg(long)]
        hex: bool,
    },

    /// Print the active settings, writing defaults when no file exists
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tether=info,tether_core=info,tether_native=info,tether_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => Settings::load_or_default(path),
        None => Settings::load(),
    };

    if cli.simulate {
        info!("Using {} virtual device(s)", settings.virtual_devices.len());
        let platform = SimPlatform::with_devices(settings.virtual_devices.clone());
        execute(platform, cli, &settings)
    } else {
        let platform = NativePlatform::with_config(settings.scanner.clone());
        execute(platform, cli, &settings)
    }
}

fn execute<P: UsbPlatform>(platform: P, cli: Cli, settings: &Settings) -> anyhow::Result<()> {
    let mut bridge = SerialBridge::new(platform);

    match cli.command {
        Command::List => {
            let names = bridge.device_names();
            if names.is_empty() {
                println!("No serial ports found");
            }
            for (index, name) in names.iter().enumerate() {
                println!("{index:>3}  {name}");
            }
        }
        Command::Monitor {
            index,
            name,
            count,
            hex,
        } => {
            let target = match (index, name, &settings.preferred_device) {
                (_, Some(name), _) => Target::Name(name),
                (Some(index), None, _) => Target::Index(index),
                (None, None, Some(preferred)) => Target::Name(preferred.clone()),
                (None, None, None) => Target::Index(0),
            };
            let options = MonitorOptions {
                target,
                connect_attempts: settings.connect_attempts,
                connect_retry: settings.connect_retry(),
                poll_interval: settings.poll_interval(),
                count,
                hex: hex || settings.show_hex,
            };

            let summary = monitor::run(&mut bridge, &options, &mut io::stdout().lock())?;
            if summary.failed {
                anyhow::bail!("connection failed after {} byte(s)", summary.bytes);
            }
        }
        Command::Config => {
            let path = match &cli.settings {
                Some(path) => path.clone(),
                None => Settings::settings_path()
                    .ok_or(settings::SettingsError::NoConfigDir)?,
            };
            if !path.exists() {
                settings.save_to(&path)?;
                info!("Wrote default settings to {}", path.display());
            }
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
    }

    Ok(())
}
