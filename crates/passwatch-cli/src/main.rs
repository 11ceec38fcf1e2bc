mod cli;
mod clipboard;
mod config;
mod store;

use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::Result;
use passwatch_agent::{decrypt_content, GpgBackend, KeyInfoResolver};
use passwatch_core::{entry::CredentialEntry, keyinfo::KeyInfo};
use passwatch_exposure::{SecretExposer, SecretSink};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::{Command, ConfigCommand},
    clipboard::ClipboardSink,
};

const COPIED_STATUS: &str = "Copied to clipboard";
const CLEARED_STATUS: &str = "Clipboard cleared";
/// Wide enough that a shorter countdown fully overwrites a longer one.
const COUNTDOWN_WIDTH: usize = 32;

/// Entry point wiring the CLI to the store, the gpg backend and the clipboard.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let command = cli.command.unwrap_or(Command::List {
        query: Vec::new(),
        json: false,
    });
    match command {
        Command::List { query, json } => run_list(&query, json, &config)?,
        Command::Watch => run_watch(&config).await?,
        Command::Info { name, json } => run_info(&name, json, &config)?,
        Command::Copy { name } => run_copy(&name, &config).await?,
        Command::Show { name } => run_show(&name, &config)?,
        Command::Raw { name } => run_raw(&name, &config)?,
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // command output stays machine readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("passwatch {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn run_list(query: &[String], json: bool, config: &config::Config) -> Result<()> {
    let store = store::open(config)?;
    let entries = store.query(&query.join(" "));
    info!("{}", matched_status(entries.len()));
    println!("{}", render_entries(&entries, json)?);
    Ok(())
}

fn matched_status(count: usize) -> String {
    format!("Matched {count} items")
}

fn render_entries(entries: &[CredentialEntry], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(entries)?);
    }
    Ok(entries
        .iter()
        .map(|entry| entry.display_name.as_str())
        .collect::<Vec<_>>()
        .join("\n"))
}

async fn run_watch(config: &config::Config) -> Result<()> {
    let mut store = store::open(config)?;
    store.watch()?;
    let fan_out = store.index().on_change(|status| println!("{status}"));
    println!(
        "Watching {} ({} entries), press Ctrl-C to stop",
        store.root().display(),
        store.index().len()
    );

    tokio::signal::ctrl_c().await?;
    debug!("interrupted, stopping watcher");
    drop(store);
    fan_out.abort();
    Ok(())
}

#[derive(Debug, Serialize)]
struct InfoReport<'a> {
    name: &'a str,
    path: &'a Path,
    key: &'a KeyInfo,
}

fn run_info(name: &str, json: bool, config: &config::Config) -> Result<()> {
    let store = store::open(config)?;
    let entry = store::lookup(&store, name)?;
    let resolver = KeyInfoResolver::new(GpgBackend::new(config.gpg.clone()));
    let info = resolver.resolve(&entry.path);
    println!("{}", render_info(&entry, &info, json)?);
    Ok(())
}

fn render_info(entry: &CredentialEntry, info: &KeyInfo, json: bool) -> Result<String> {
    if json {
        let report = InfoReport {
            name: &entry.display_name,
            path: &entry.path,
            key: info,
        };
        return Ok(serde_json::to_string_pretty(&report)?);
    }
    Ok(format!("{}: {}", entry.display_name, info.summary()))
}

fn run_show(name: &str, config: &config::Config) -> Result<()> {
    let store = store::open(config)?;
    let entry = store::lookup(&store, name)?;
    let content = decrypt_content(&GpgBackend::new(config.gpg.clone()), &entry.path)?;
    print!("{}", content.metadata);
    Ok(())
}

fn run_raw(name: &str, config: &config::Config) -> Result<()> {
    let store = store::open(config)?;
    let entry = store::lookup(&store, name)?;
    println!("{}", store.raw_base64(&entry)?);
    Ok(())
}

async fn run_copy(name: &str, config: &config::Config) -> Result<()> {
    let store = store::open(config)?;
    let entry = store::lookup(&store, name)?;
    let content = decrypt_content(&GpgBackend::new(config.gpg.clone()), &entry.path)?;

    let _owner = clipboard::open()?;
    let exposer = SecretExposer::new(Arc::new(ClipboardSink), config.exposure);
    exposer.expose(&content.secret, |secs| eprint!("{}", countdown_line(secs)))?;
    drop(content);
    println!("{COPIED_STATUS}");
    eprint!("{}", countdown_line(config.exposure.clear_after_secs));

    tokio::select! {
        _ = exposer.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            exposer.timer().cancel();
            if let Err(err) = exposer.sink().purge() {
                warn!(%err, "failed to clear clipboard on interrupt");
            }
        }
    }
    eprintln!();
    println!("{CLEARED_STATUS}");
    Ok(())
}

fn countdown_status(seconds: u64) -> String {
    format!("Will clear in {seconds} seconds")
}

/// Countdown status that rewrites the current terminal line.
fn countdown_line(seconds: u64) -> String {
    format!("\r{:<COUNTDOWN_WIDTH$}", countdown_status(seconds))
}
