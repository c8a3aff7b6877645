use crate::cli::{self, ArchiveArgs, Context};
use crate::engine::{self, ValidatedArchive};
use crate::error::Result;
use crate::model::EntityKind;
use crate::reconcile::ImportPreview;

/// Execute the preview command: validate an archive and show what an
/// import would do, without touching the store.
///
/// # Errors
///
/// Returns archive validation errors.
pub fn execute(ctx: &Context, args: &ArchiveArgs) -> Result<()> {
    let flags = cli::parse_scope(args.only.as_deref())?;
    match engine::validate(&args.archive, &cli::import_config(flags))? {
        ValidatedArchive::Csv(preview) => print_preview(ctx, &preview),
        ValidatedArchive::Snapshot(manifest) => {
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                println!(
                    "Snapshot backup from {} (schema v{}).",
                    manifest.created_at, manifest.schema_version
                );
                println!("Restore it with: pbx restore {} --yes", args.archive.display());
            }
            Ok(())
        }
    }
}

/// Shared preview rendering, also used before an import commit.
pub fn print_preview(ctx: &Context, preview: &ImportPreview) -> Result<()> {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(preview)?);
        return Ok(());
    }

    println!("Will import {}.", preview.counts);
    for kind in EntityKind::ALL {
        let Some(samples) = preview.samples.get(&kind) else {
            continue;
        };
        let total = preview.parsed_counts.get(kind);
        let shown = samples.join(", ");
        if total > samples.len() {
            println!("  {kind}: {shown}, ... ({total} total)");
        } else {
            println!("  {kind}: {shown}");
        }
    }

    if !preview.warnings.is_empty() {
        println!("{} warning(s):", preview.warnings.len());
        for warning in &preview.warnings {
            println!("  - {warning}");
        }
    }
    let unresolved = preview.unresolved_reference_count();
    if unresolved > 0 {
        println!("{unresolved} reference(s) could not be resolved and will import as unset.");
    }
    Ok(())
}
