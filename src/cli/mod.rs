//! Command-line interface for `packbox`.
//!
//! Parsing and command routing using clap. Long-running commands
//! (export, import) consume a progress stream from the engines and
//! render it with indicatif; Ctrl-C flips the shared cancel flag and
//! the engine stops at its next batch boundary.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use tokio_stream::StreamExt;

use crate::engine::progress::{CancelFlag, ProgressEvent, ProgressStream};
use crate::error::Result;
use crate::logging;
use crate::model::EntityKind;
use crate::reconcile::ImportConfig;
use crate::{engine::ExportConfig, error::PackboxError};

/// `packbox` (pbx) - Home inventory archive tool.
#[derive(Parser, Debug)]
#[command(name = "pbx")]
#[command(
    author,
    version,
    about = "Home inventory store with portable CSV/ZIP export-import",
    long_about = None
)]
pub struct Cli {
    /// Output format: text (default) or json
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a packbox workspace
    Init,

    /// Add an entity to the store
    Add(AddCommand),

    /// List stored entities (or per-kind counts)
    List(ListArgs),

    /// Export the store to a portable archive
    Export(ExportArgs),

    /// Preview what an archive import would do
    Preview(ArchiveArgs),

    /// Import an archive into the store
    Import(ImportArgs),

    /// Write a full database snapshot backup
    Backup(BackupArgs),

    /// Restore the store from a snapshot backup
    Restore(RestoreArgs),

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct AddCommand {
    #[command(subcommand)]
    pub entity: AddEntity,
}

#[derive(Subcommand, Debug)]
pub enum AddEntity {
    /// Add a home
    Home {
        name: String,
        /// Mark as the primary home
        #[arg(long)]
        primary: bool,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        country: String,
    },

    /// Add a location within a home
    Location {
        name: String,
        /// Owning home, by name
        #[arg(long)]
        home: Option<String>,
        #[arg(long, default_value = "")]
        symbol: String,
    },

    /// Add a label
    Label {
        name: String,
        #[arg(long, default_value = "")]
        color: String,
    },

    /// Add an item
    Item {
        title: String,
        #[arg(long, default_value_t = 1)]
        quantity: i64,
        /// Purchase price, e.g. 129.99
        #[arg(long)]
        price: Option<String>,
        /// Containing location, by name
        #[arg(long)]
        location: Option<String>,
        /// Attached label, by name
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "")]
        make: String,
        #[arg(long, default_value = "")]
        model: String,
        #[arg(long, default_value = "")]
        serial: String,
        #[arg(long)]
        insured: bool,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Add an insurance policy
    Policy {
        provider: String,
        #[arg(long, default_value = "")]
        number: String,
        /// Covered home, by name (repeatable)
        #[arg(long)]
        home: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Entity kind (home, location, label, item, policy); counts when omitted
    pub kind: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Destination archive; a timestamped name in the configured
    /// export directory when omitted
    pub output: Option<PathBuf>,

    /// Restrict to a comma-separated list of kinds
    #[arg(long)]
    pub only: Option<String>,
}

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Archive to read
    pub archive: PathBuf,

    /// Restrict to a comma-separated list of kinds
    #[arg(long)]
    pub only: Option<String>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Archive to import
    pub archive: PathBuf,

    /// Restrict to a comma-separated list of kinds
    #[arg(long)]
    pub only: Option<String>,

    /// Commit without the interactive preview step. Imports never
    /// deduplicate: running the same archive twice doubles the data.
    #[arg(short, long, alias = "acknowledge-duplicates")]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Destination archive; a timestamped name when omitted
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Snapshot archive to restore from
    pub archive: PathBuf,

    /// Confirm replacing the entire store
    #[arg(short, long)]
    pub yes: bool,
}

/// Flags shared by every command handler.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub json: bool,
    pub quiet: bool,
}

/// Run the CLI.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet, None).map_err(PackboxError::Config)?;

    let ctx = Context {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Init => commands::init::execute(&ctx),
        Commands::Add(command) => commands::add::execute(&ctx, command),
        Commands::List(args) => commands::list::execute(&ctx, &args),
        Commands::Export(args) => commands::export::execute(&ctx, args).await,
        Commands::Preview(args) => commands::preview::execute(&ctx, &args),
        Commands::Import(args) => commands::import::execute(&ctx, args).await,
        Commands::Backup(args) => commands::backup::execute(&ctx, args),
        Commands::Restore(args) => commands::restore::execute(&ctx, &args),
        Commands::Version => {
            println!("pbx {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Parse a `--only homes,items` style scope into per-kind flags, in
/// [`EntityKind::ALL`] order. `None` means everything.
pub(crate) fn parse_scope(only: Option<&str>) -> Result<[bool; 5]> {
    let Some(only) = only else {
        return Ok([true; 5]);
    };
    let mut flags = [false; 5];
    for token in only.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        // Accept plural forms: homes, items, policies.
        let singular = token
            .strip_suffix("ies")
            .map(|stem| format!("{stem}y"))
            .or_else(|| token.strip_suffix('s').map(str::to_string))
            .filter(|_| token.parse::<EntityKind>().is_err())
            .unwrap_or_else(|| token.to_string());
        let kind: EntityKind = singular.parse()?;
        let index = EntityKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        flags[index] = true;
    }
    if flags.iter().all(|included| !included) {
        return Err(PackboxError::validation("only", "no kinds selected"));
    }
    Ok(flags)
}

pub(crate) const fn import_config(flags: [bool; 5]) -> ImportConfig {
    ImportConfig {
        include_homes: flags[0],
        include_locations: flags[1],
        include_labels: flags[2],
        include_items: flags[3],
        include_policies: flags[4],
    }
}

pub(crate) const fn export_config(flags: [bool; 5]) -> ExportConfig {
    ExportConfig {
        include_homes: flags[0],
        include_locations: flags[1],
        include_labels: flags[2],
        include_items: flags[3],
        include_policies: flags[4],
    }
}

/// Cancel flag wired to Ctrl-C.
pub(crate) fn cancel_on_interrupt() -> CancelFlag {
    let flag = CancelFlag::new();
    let handler = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current batch");
            handler.cancel();
        }
    });
    flag
}

/// Drive a progress stream to its end, rendering to `bar`.
///
/// Returns `Ok(None)` when the stream ended without a terminal event
/// (the operation was cancelled).
pub(crate) async fn consume_progress<S>(
    mut stream: ProgressStream<S>,
    bar: &ProgressBar,
) -> Result<Option<S>> {
    let mut outcome = Ok(None);
    while let Some(event) = stream.next().await {
        match event {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            ProgressEvent::Progress(fraction) => {
                bar.set_position((fraction * 100.0).round() as u64);
            }
            ProgressEvent::Completed(summary) => outcome = Ok(Some(summary)),
            ProgressEvent::Failed(error) => outcome = Err(error),
        }
    }
    bar.finish_and_clear();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_default_is_everything() {
        assert_eq!(parse_scope(None).unwrap(), [true; 5]);
    }

    #[test]
    fn test_parse_scope_selects_kinds() {
        let flags = parse_scope(Some("items,homes")).unwrap();
        assert_eq!(flags, [true, false, false, true, false]);
    }

    #[test]
    fn test_parse_scope_accepts_singular_and_policy_alias() {
        let flags = parse_scope(Some("policy")).unwrap();
        assert_eq!(flags, [false, false, false, false, true]);
    }

    #[test]
    fn test_parse_scope_rejects_unknown_kind() {
        assert!(parse_scope(Some("gadgets")).is_err());
    }

    #[test]
    fn test_cli_parses_import_flags() {
        let cli = Cli::try_parse_from(["pbx", "import", "a.zip", "--only", "items", "-y"]).unwrap();
        match cli.command {
            Commands::Import(args) => {
                assert!(args.yes);
                assert_eq!(args.only.as_deref(), Some("items"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
