use std::collections::BTreeSet;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use log::info;

use ndnfw_core::Name;
use ndnfwd::{Config, Face, Forwarder, MemoryFace};

const DEFAULT_CONFIG: &str = "/etc/ndnfwd/ndnfwd.toml";

fn cli() -> Command {
    Command::new("ndnfwd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("NDN forwarder control-plane helper")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG),
        )
        .subcommand_required(true)
        .subcommand(Command::new("check").about("Validate the configuration and assemble the forwarder"))
        .subcommand(
            Command::new("lookup")
                .about("Show the worker and route serving a name")
                .arg(Arg::new("name").required(true).help("NDN name, e.g. /ndn/edu/ucla")),
        )
        .subcommand(Command::new("snapshot").about("Print forwarder statistics as JSON"))
        .subcommand(Command::new("default-config").about("Print the default configuration"))
}

fn main() {
    let matches = cli().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("ndnfwd: {:#}", e);
        process::exit(1);
    }
}

/// In-memory stand-ins for every face the configured routes use, so the
/// forwarder can be assembled without a face layer
fn offline_faces(config: &Config) -> Vec<Arc<dyn Face>> {
    let ids: BTreeSet<u32> = config.fib.iter().flat_map(|r| r.nexthops.iter().copied()).collect();
    ids.into_iter()
        .map(|id| Arc::new(MemoryFace::new(id)) as Arc<dyn Face>)
        .collect()
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level)).init();
    info!("Config file: {}", config_path);

    match matches.subcommand() {
        Some(("check", _)) => {
            let forwarder = Forwarder::new(&config, offline_faces(&config))?;
            println!(
                "configuration OK: {} workers, {} inputs, {} routes, NDT {} slots",
                forwarder.workers().len(),
                forwarder.inputs().len(),
                forwarder.fib().snapshot().len(),
                forwarder.ndt().len()
            );
        }
        Some(("lookup", sub)) => {
            let uri = sub
                .get_one::<String>("name")
                .context("missing name argument")?;
            let name: Name = uri.parse().with_context(|| format!("invalid name {}", uri))?;
            let forwarder = Forwarder::new(&config, offline_faces(&config))?;
            let (slot, partition) = forwarder.ndt().lookup(&name);
            println!("name:      {}", name);
            println!("worker:    {} (NDT slot {})", partition, slot);
            match forwarder.fib().snapshot().lpm(&name) {
                Some(entry) => println!(
                    "route:     {} -> {:?} ({:?})",
                    entry.prefix, entry.nexthops, entry.strategy
                ),
                None => println!("route:     none (Nack NoRoute)"),
            }
        }
        Some(("snapshot", _)) => {
            let forwarder = Forwarder::new(&config, offline_faces(&config))?;
            println!("{}", forwarder.snapshot().to_json()?);
        }
        Some(("default-config", _)) => {
            print!("{}", Config::default().to_toml()?);
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
