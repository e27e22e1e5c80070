mod config;
mod devices;
mod dump;
mod mirror;

use anyhow::Error;
use clap::Parser;
use config::Config;
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

#[derive(clap::Subcommand)]
enum Verb {
    /// List the input devices this user can open.
    List,
    /// Print a device's capabilities, then every event it sends.
    Dump {
        #[clap(short, long, value_parser)]
        device: PathBuf,
        /// Rumble the device whenever no event arrives for five seconds.
        #[clap(short, long)]
        rumble: bool,
    },
    /// Erase every force-feedback effect uploaded to a device.
    ClearEffects {
        #[clap(short, long, value_parser)]
        device: PathBuf,
    },
    /// Merge the configured source devices into one virtual device.
    Mirror,
}

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    verb: Verb,

    #[clap(short, long, value_parser, default_value = "/etc/evkit/config.toml")]
    config_path: PathBuf,
}

fn run(verb: Verb, config: &Config) -> Result<(), Error> {
    match verb {
        Verb::List => devices::list(config.input_dir()),
        Verb::Dump { device, rumble } => dump::run(&device, rumble),
        Verb::ClearEffects { device } => devices::clear_effects(&device),
        Verb::Mirror => mirror::run(config),
    }
}

fn main() {
    env_logger::builder()
        .format_timestamp(None)
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match Config::new(&args.config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Error reading config: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(args.verb, &config) {
        log::error!("Error: {:#}", err);
        process::exit(1);
    }
}
