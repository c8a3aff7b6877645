use crate::cli::commands::preview::print_preview;
use crate::cli::{self, Context, ImportArgs};
use crate::config::Workspace;
use crate::engine::{self, import, ValidatedArchive};
use crate::error::{PackboxError, Result};
use crate::store::InventoryStore;
use crate::util;

/// Execute the import command.
///
/// Without `--yes` this only shows the preview; imports never
/// deduplicate, so the user confirms explicitly before data lands.
///
/// # Errors
///
/// Returns validation errors, or `PartialCommit` when the commit
/// failed midway.
pub async fn execute(ctx: &Context, args: ImportArgs) -> Result<()> {
    let workspace = Workspace::require()?;
    let flags = cli::parse_scope(args.only.as_deref())?;
    let config = cli::import_config(flags);

    let preview = match engine::validate(&args.archive, &config)? {
        ValidatedArchive::Csv(preview) => *preview,
        ValidatedArchive::Snapshot(_) => {
            return Err(PackboxError::Config(format!(
                "{} is a snapshot backup; use 'pbx restore'",
                args.archive.display()
            )));
        }
    };

    print_preview(ctx, &preview)?;
    if !args.yes {
        if !ctx.json {
            println!("Nothing imported. Re-run with --yes to commit.");
        }
        return Ok(());
    }

    let store = InventoryStore::open(&workspace.db_path())?;
    let bar = if util::should_show_progress(ctx.quiet) {
        util::create_progress_bar("importing")
    } else {
        util::hidden_progress_bar()
    };

    let stream = import::start_commit(
        store,
        preview,
        workspace.photos_dir(),
        cli::cancel_on_interrupt(),
    );

    match cli::consume_progress(stream, &bar).await? {
        Some(summary) => {
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Imported {} and {} photos.",
                    summary.counts, summary.photo_count
                );
                if summary.demoted_primary_homes > 0 {
                    println!(
                        "{} imported home(s) lost their primary flag; the store's primary home is kept.",
                        summary.demoted_primary_homes
                    );
                }
            }
        }
        None => println!("Import cancelled; batches committed so far are kept."),
    }
    Ok(())
}
