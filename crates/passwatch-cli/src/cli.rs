use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "passwatch",
    about = "Browse, inspect and copy entries of a password store",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to listing every entry when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List entries whose names contain every query word.
    List {
        query: Vec<String>,
        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Keep the index live and print every change until interrupted.
    Watch,
    /// Show which key protects an entry and whether the agent has it cached.
    Info {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Copy the secret to the clipboard and clear it after a while.
    Copy { name: String },
    /// Decrypt an entry and print its metadata (never the secret).
    Show { name: String },
    /// Print the encrypted file as base64.
    Raw { name: String },
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
