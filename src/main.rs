//! UHF BLE Reader - offline tooling for the reader protocol and saved state.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use uhf_ble_reader as app;

use app::ble::{Stage, TransportError, classify, uuid};
use app::config::{AppConfig, ConfigLoadResult, FrequencyRegion};
use app::frame::{self, Bank, Command, DEFAULT_PASSWORD};

/// UHF RFID reader client over Bluetooth Low Energy.
#[derive(Parser)]
#[command(name = "uhf-ble-reader", version)]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long, global = true)]
    dev: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Print the wire frame for a reader command
    Encode {
        #[command(subcommand)]
        command: EncodeCommand,
    },
    /// Decode one inbound frame given as hex
    Decode {
        /// Frame bytes; spaces are ignored
        hex: String,
        /// Print the event as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the canonical form of a UUID
    Normalize { value: String },
    /// Classify a host BLE failure
    Classify {
        /// Failure category name, e.g. NetworkError
        name: String,
        message: String,
        /// Treat the failure as coming from the device scan
        #[arg(long)]
        scan: bool,
    },
    /// Inspect or edit the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect or clear recently connected devices
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum EncodeCommand {
    Start,
    Stop,
    Single,
    GetPower,
    SetPower {
        dbm: u8,
    },
    GetFrequency,
    SetFrequency {
        /// Region name, e.g. "Europe Standard"
        region: FrequencyRegion,
    },
    Read {
        bank: Bank,
        pointer: u8,
        length: u8,
        #[arg(long, default_value = DEFAULT_PASSWORD)]
        password: String,
    },
    Write {
        bank: Bank,
        pointer: u8,
        length: u8,
        data: String,
        #[arg(long, default_value = DEFAULT_PASSWORD)]
        password: String,
    },
    Filter {
        bank: Bank,
        pointer: u8,
        length: u8,
        mask: String,
    },
}

impl From<EncodeCommand> for Command {
    fn from(command: EncodeCommand) -> Self {
        match command {
            EncodeCommand::Start => Command::StartInventory,
            EncodeCommand::Stop => Command::StopInventory,
            EncodeCommand::Single => Command::InventorySingle,
            EncodeCommand::GetPower => Command::GetPower,
            EncodeCommand::SetPower { dbm } => Command::SetPower(dbm),
            EncodeCommand::GetFrequency => Command::GetFrequency,
            EncodeCommand::SetFrequency { region } => Command::SetFrequency(region.code()),
            EncodeCommand::Read {
                bank,
                pointer,
                length,
                password,
            } => Command::ReadTag {
                bank,
                pointer,
                length,
                password,
            },
            EncodeCommand::Write {
                bank,
                pointer,
                length,
                data,
                password,
            } => Command::WriteTag {
                bank,
                pointer,
                length,
                data,
                password,
            },
            EncodeCommand::Filter {
                bank,
                pointer,
                length,
                mask,
            } => Command::SetFilter {
                bank,
                pointer,
                length,
                mask,
            },
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Forget the saved service/characteristic pair
    ResetConnection,
}

#[derive(Subcommand)]
enum HistoryAction {
    Show,
    Clear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(cli.log_file.as_deref());

    // Determine config path based on mode
    let config_path = if cli.dev {
        tracing::debug!("Dev mode: loading config from current directory");
        PathBuf::from("config.toml")
    } else {
        AppConfig::default_path()
    };
    tracing::debug!("Config path: {:?}", config_path);

    match cli.command {
        Action::Encode { command } => {
            let command = Command::from(command);
            let bytes = frame::encode(&command).with_context(|| format!("Cannot encode {}", command.name()))?;
            println!("{}", frame::format_frame(&bytes));
        }
        Action::Decode { hex, json } => {
            let compact: String = hex.split_whitespace().collect();
            let bytes = frame::hex_to_bytes(&compact)?;
            let event = frame::decode(&bytes)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&event)?);
            } else {
                println!("{event:?}");
            }
        }
        Action::Normalize { value } => println!("{}", uuid::normalize(&value)),
        Action::Classify { name, message, scan } => {
            let stage = if scan { Stage::Scan } else { Stage::Gatt };
            let kind = classify(&TransportError::new(name, message), stage);
            println!("{kind}");
            println!("retryable: {}", kind.is_retryable());
            println!("{}", kind.remediation());
        }
        Action::Config { action } => run_config(action, &config_path)?,
        Action::History { action } => run_history(action, &config_path)?,
    }

    Ok(())
}

/// Log to stderr by default, or to a file through a non-blocking writer.
fn init_logging(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().unwrap_or(std::ffi::OsStr::new("uhf-ble-reader.log"));
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

/// Load config, treating a missing file as defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    match AppConfig::try_load(path) {
        ConfigLoadResult::Loaded(config) => Ok(config),
        ConfigLoadResult::Missing => {
            tracing::info!("Config missing, using defaults");
            Ok(AppConfig::default())
        }
        ConfigLoadResult::Invalid(e) => bail!("Config at {} is invalid: {e}", path.display()),
    }
}

fn run_config(action: ConfigAction, path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::ResetConnection => {
            let mut config = load_config(path)?;
            config.connection.clear();
            config.save(path)?;
            tracing::info!("Saved UUIDs cleared");
            println!("Saved connection cleared");
        }
    }
    Ok(())
}

fn run_history(action: HistoryAction, path: &Path) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    match action {
        HistoryAction::Show => {
            if config.history.is_empty() {
                println!("No recent devices");
            }
            for entry in config.history.entries() {
                let signal = entry.signal().map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<20} {:<8} {}",
                    entry.name,
                    entry.address,
                    signal,
                    entry.last_connected.format("%Y-%m-%d %H:%M")
                );
            }
        }
        HistoryAction::Clear => {
            config.history.clear();
            config.save(path)?;
            println!("History cleared");
        }
    }
    Ok(())
}
