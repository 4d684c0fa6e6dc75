use aqua_feeder_controller::codec::{decode_last_setting, LastSettingResponse};
use aqua_feeder_controller::*;
use chrono::Local;
use color_eyre::eyre::{self, eyre};
use std::path::Path;
use std::{env, io};
use tracing_subscriber::EnvFilter;

fn main() -> eyre::Result<()> {
    // Optional config path from command line arguments.
    let usage = "Usage: feedd [config.toml]";
    let args: Vec<_> = env::args().collect();
    if args.len() > 1 && (args[1] == "-h" || args[1] == "--help") {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("aqua_feeder_controller=warn")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    let config = match args.get(1) {
        Some(path) => FeederConfig::load(Path::new(path))?,
        None => FeederConfig::default(),
    };
    let mut store = SettingStore::with_capacity(config.max_settings);

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for input, line by line
    let mut input = String::new();
    loop {
        input.clear();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(());
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        match run(&mut store, cmd, rest.trim()) {
            Ok(reply) if reply.is_empty() => println!("OK"),
            Ok(reply) => println!("OK {reply}"),
            Err(e) => eprintln!("ERR {e}"),
        }
    }
}

fn position(text: &str) -> eyre::Result<usize> {
    text.parse().map_err(|_| eyre!("not a position: {text}"))
}

/// Executes one command against the store and returns the reply text
fn run(store: &mut SettingStore, cmd: &str, args: &str) -> eyre::Result<String> {
    match cmd {
        "add" => {
            let stored = store.add(args.parse()?)?;
            Ok(stored.position().to_string())
        }
        "update" => {
            let (pos, setting) = args
                .split_once(' ')
                .ok_or_else(|| eyre!("use: update <position> <setting>"))?;
            let stored = store.update(position(pos)?, setting.trim().parse()?)?;
            Ok(stored.position().to_string())
        }
        "remove" => {
            store.remove(position(args)?)?;
            Ok(String::new())
        }
        "clear" => {
            store.clear();
            Ok(String::new())
        }
        "list" => {
            let today = Local::now().date_naive();
            for setting in store.settings() {
                let m = setting.metrics(today);
                println!(
                    "{} {} {}kg {}g {}s end={} run={} cycles={}",
                    setting.position(),
                    setting.start_time,
                    setting.feed_level.kg(),
                    setting.dispatch.grams(),
                    setting.time_gap.seconds(),
                    m.end_time,
                    m.run_text.replace(' ', ""),
                    m.cycles
                );
            }
            Ok(store.len().to_string())
        }
        "payload" => Ok(store.payload()),
        "ack" => {
            let (payload, set_time) = match args.split_once(' ') {
                Some((payload, raw)) => (payload, Some(raw.trim().to_string())),
                None => (args, None),
            };
            let response = LastSettingResponse {
                sent_settings: payload.to_string(),
                set_time_raw: set_time,
            };
            let ack = decode_last_setting(&response, Local::now().naive_local());
            store.replace_all(ack.settings);
            Ok(store.len().to_string())
        }
        other => Err(eyre!("unknown command: {other}")),
    }
}
