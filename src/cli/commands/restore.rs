use crate::cli::{Context, RestoreArgs};
use crate::config::Workspace;
use crate::engine::{self, stage_restore, ValidatedArchive};
use crate::error::{PackboxError, Result};
use crate::model::{EntityCounts, EntityKind};
use crate::reconcile::ImportConfig;
use crate::store::InventoryStore;

/// Execute the restore command: replace the entire store with a
/// snapshot backup.
///
/// # Errors
///
/// Returns `Config` for a non-snapshot archive, `SnapshotChecksum` or
/// `SnapshotVersion` for a bad payload.
pub fn execute(ctx: &Context, args: &RestoreArgs) -> Result<()> {
    let manifest = match engine::validate(&args.archive, &ImportConfig::default())? {
        ValidatedArchive::Snapshot(manifest) => manifest,
        ValidatedArchive::Csv(_) => {
            return Err(PackboxError::Config(format!(
                "{} is a table archive; use 'pbx import'",
                args.archive.display()
            )));
        }
    };

    if !args.yes {
        println!(
            "Snapshot from {} (schema v{}) would replace the entire store.",
            manifest.created_at, manifest.schema_version
        );
        println!("Re-run with --yes to restore.");
        return Ok(());
    }

    let workspace = Workspace::require()?;
    let db_path = workspace.db_path();
    stage_restore(&args.archive, &manifest, &db_path)?;

    // Opening the store swaps the staged payload in.
    let store = InventoryStore::open(&db_path)?;
    let mut counts = EntityCounts::default();
    for kind in EntityKind::ALL {
        counts.add(kind, store.count(kind)?);
    }

    if ctx.json {
        println!("{}", serde_json::json!({ "restored": counts }));
    } else {
        println!("Store restored: {counts}.");
    }
    Ok(())
}
