//! encyclo CLI - generation-versioned game catalog

use anyhow::Result;
use clap::{Parser, Subcommand};
use encyclo::domain::{
  content::{ContentKind, Language},
  record::EntityId,
};

mod commands;
mod logging;

use commands::{
  cmd_config_init, cmd_config_show, cmd_daemon, cmd_get, cmd_rebuild, cmd_scan, cmd_search, cmd_status,
};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "encyclo")]
#[command(about = "Generation-versioned game catalog with full-text search")]
#[command(after_help = "\
QUICK START:
  encyclo daemon --foreground      # Start daemon in this terminal
  encyclo rebuild --wait           # Load the release batch and swap it in
  encyclo search equipment \"hat\"   # Search the current generation

COMMON WORKFLOWS:
  encyclo status                   # Generations and last rebuild
  encyclo get sets 12              # Show one record
  encyclo search items \"ore\" --lang fr --filter level=10..60")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `encyclo config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  #[command(long_about = "Show the current effective configuration.\n\n\
    Displays which config file is being used and its contents as TOML.")]
  Show,

  /// Write the user config file with defaults
  Init {
    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Start the daemon
  Daemon {
    /// Run in this terminal with console logging
    #[arg(long, conflicts_with = "background")]
    foreground: bool,
    /// Run detached with file logging (used when auto-starting)
    #[arg(long)]
    background: bool,
  },
  /// Trigger a rebuild of the staging generation
  #[command(after_help = "\
NOTE:
  A trigger received while a rebuild is running is coalesced into one
  follow-up rebuild. Use --wait to block until the rebuild finishes.")]
  Rebuild {
    /// Wait for the rebuild to finish and print its report
    #[arg(long)]
    wait: bool,
  },
  /// Show daemon status, current generations and the last rebuild
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show one record from the current generation
  Get {
    /// Content kind (equipment, consumables, resources, quest_items, cosmetics, items, sets, mounts, recipes)
    kind: ContentKind,
    id: EntityId,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// List records of one kind in id order
  Scan {
    kind: ContentKind,
    #[arg(long, default_value = "0")]
    offset: usize,
    #[arg(short, long, default_value = "50")]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Full-text search over the current generation
  #[command(after_help = "\
FILTERS:
  --filter level=60            exact match
  --filter level=10..60        inclusive range (either bound may be omitted)
  --filter type_name=Hat       text match

  Filterable attributes: items take super_type, type_name, level;
  sets take level; mounts take family_name.")]
  Search {
    kind: ContentKind,
    query: String,
    /// Display language (en, fr, de, es, it, pt)
    #[arg(long, default_value = "en")]
    lang: Language,
    #[arg(short, long, default_value = "20")]
    limit: usize,
    /// Attribute filter, repeatable
    #[arg(long = "filter", value_name = "ATTR=VALUE")]
    filters: Vec<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATION:
  ~/.config/encyclo/config.toml (or $CONFIG_DIR/config.toml)")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // The daemon command sets up its own (file or console) logging
  if !matches!(cli.command, Commands::Daemon { .. }) {
    init_cli_logging();
  }

  match cli.command {
    Commands::Daemon { foreground, background } => cmd_daemon(foreground, background).await,
    Commands::Rebuild { wait } => cmd_rebuild(wait).await,
    Commands::Status { json } => cmd_status(json).await,
    Commands::Get { kind, id, json } => cmd_get(kind, id, json).await,
    Commands::Scan {
      kind,
      offset,
      limit,
      json,
    } => cmd_scan(kind, offset, limit, json).await,
    Commands::Search {
      kind,
      query,
      lang,
      limit,
      filters,
      json,
    } => cmd_search(kind, &query, lang, limit, &filters, json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show().await,
      ConfigCommand::Init { force } => cmd_config_init(force).await,
    },
  }
}
