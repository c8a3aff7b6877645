use std::path::PathBuf;

use chrono::Local;

use crate::cli::{self, Context, ExportArgs};
use crate::config::Workspace;
use crate::engine::export;
use crate::error::Result;
use crate::store::InventoryStore;
use crate::util;

/// Execute the export command.
///
/// # Errors
///
/// Returns engine errors (`ArchiveWrite`, `Database`). Cancellation is
/// not an error; it prints a notice and leaves no archive behind.
pub async fn execute(ctx: &Context, args: ExportArgs) -> Result<()> {
    let workspace = Workspace::require()?;
    let config = workspace.load_config()?;
    let store = InventoryStore::open(&workspace.db_path())?;

    let flags = cli::parse_scope(args.only.as_deref())?;
    let output = args.output.unwrap_or_else(default_archive_name);
    let dest = workspace.resolve_export_path(&config, &output);

    let bar = if util::should_show_progress(ctx.quiet) {
        util::create_progress_bar("exporting")
    } else {
        util::hidden_progress_bar()
    };

    let stream = export::start(
        store,
        cli::export_config(flags),
        workspace.photos_dir(),
        dest,
        cli::cancel_on_interrupt(),
    );

    match cli::consume_progress(stream, &bar).await? {
        Some(summary) => {
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Exported {} and {} photos to {}",
                    summary.counts,
                    summary.photo_count,
                    summary.archive_path.display()
                );
            }
        }
        None => println!("Export cancelled; no archive written."),
    }
    Ok(())
}

fn default_archive_name() -> PathBuf {
    PathBuf::from(format!(
        "inventory-{}.zip",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}
