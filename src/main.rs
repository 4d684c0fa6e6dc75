use aqua_feeder_controller::codec::{self, decode_last_setting};
use aqua_feeder_controller::timestamp;
use aqua_feeder_controller::*;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum BareCommand {
    /// Ask the controller for fresh telemetry (c0=201)
    Refresh,
    /// Run the controller self test (c0=203)
    SelfTest,
}

impl std::fmt::Display for BareCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BareCommand::Refresh => write!(f, "refresh"),
            BareCommand::SelfTest => write!(f, "self_test"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a settings payload without checking for conflicts
    Encode {
        /// Setting as HH:MM,kg[,grams[,gap]] (repeatable)
        #[arg(short, long = "setting", required = true)]
        settings: Vec<FeedingSetting>,
        /// Send only the first setting
        #[arg(long)]
        single: bool,
    },
    /// Decode an acknowledgement payload into settings
    Decode {
        /// Payload such as as1=0600|0800&as2=0500|0300
        payload: String,
        /// Controller timestamp of when the settings were accepted (DDMMYYHHMMSS)
        #[arg(short = 't', long)]
        set_time: Option<String>,
    },
    /// Parse a compact controller timestamp
    ParseTime {
        /// Timestamp such as 051225093015
        raw: String,
    },
    /// Check settings against each other, show their metrics and the payload
    Plan {
        /// Setting as HH:MM,kg[,grams[,gap]] (repeatable)
        #[arg(short, long = "setting", required = true)]
        settings: Vec<FeedingSetting>,
    },
    /// Print a bare controller command payload
    Command {
        #[arg(value_enum)]
        command: BareCommand,
    },
}

#[instrument]
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("aqua_feeder_controller=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let config = match &cli.config {
        Some(path) => FeederConfig::load(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => FeederConfig::default(),
    };

    match cli.command {
        Commands::Encode { settings, single } => {
            let mode = if single { EncodeMode::Single } else { EncodeMode::Multi };
            println!("{}", codec::encode(&settings, mode));
        }
        Commands::Decode { payload, set_time } => {
            let response = LastSettingResponse {
                sent_settings: payload,
                set_time_raw: set_time,
            };
            let ack = decode_last_setting(&response, Local::now().naive_local());
            if ack.settings.is_empty() {
                info!("No settings in payload");
            }
            println!("Accepted at {}", ack.accepted_at.format("%d %b %Y, %I:%M %p"));
            print_table(&ack.settings);
        }
        Commands::ParseTime { raw } => match timestamp::parse(&raw) {
            Some(ts) => println!("{}", ts.format("%Y-%m-%d %H:%M:%S")),
            None => {
                error!("Not a controller timestamp: {}", raw);
                std::process::exit(1);
            }
        },
        Commands::Plan { settings } => {
            let store = plan(settings, config.max_settings)?;
            print_table(store.settings());
            println!("{}", store.payload());
        }
        Commands::Command { command } => {
            let command = match command {
                BareCommand::Refresh => Command::Refresh,
                BareCommand::SelfTest => Command::SelfTest,
            };
            println!("{}", command.bare_payload());
        }
    }

    Ok(())
}

/// Adds every setting through a store so conflicts are reported
#[instrument(skip(settings))]
fn plan(settings: Vec<FeedingSetting>, max_settings: usize) -> Result<SettingStore> {
    let mut store = SettingStore::with_capacity(max_settings);
    for setting in settings {
        let start = setting.start_time.clone();
        store
            .add(setting)
            .wrap_err_with(|| format!("setting starting at {start} rejected"))?;
    }
    Ok(store)
}

/// Print settings with their cycles, run time and end time
fn print_table(settings: &[FeedingSetting]) {
    let today = Local::now().date_naive();
    println!(
        "{:<11} {:>5} {:>9} {:>8} {:>6} {:>6} {:>8} {:>6}",
        "Name", "Start", "Feed (kg)", "Disp (g)", "Gap(s)", "End", "Run", "Cycles"
    );
    for setting in settings {
        let m = setting.metrics(today);
        let end = if m.ends_next_day {
            format!("{}+1", m.end_time)
        } else {
            m.end_time
        };
        println!(
            "{:<11} {:>5} {:>9} {:>8} {:>6} {:>6} {:>8} {:>6}",
            setting.label(),
            setting.start_time.as_str(),
            setting.feed_level.kg(),
            setting.dispatch.grams(),
            setting.time_gap.seconds(),
            end,
            m.run_text,
            m.cycles
        );
    }
}
