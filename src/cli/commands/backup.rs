use std::path::PathBuf;

use chrono::Local;

use crate::cli::{BackupArgs, Context};
use crate::config::Workspace;
use crate::engine::write_backup;
use crate::error::Result;
use crate::store::InventoryStore;

/// Execute the backup command: a full-database snapshot archive.
///
/// # Errors
///
/// Returns `ArchiveWrite` or `Database` on failure.
pub fn execute(ctx: &Context, args: BackupArgs) -> Result<()> {
    let workspace = Workspace::require()?;
    let config = workspace.load_config()?;
    let store = InventoryStore::open(&workspace.db_path())?;

    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "packbox-backup-{}.zip",
            Local::now().format("%Y%m%d-%H%M%S")
        ))
    });
    let dest = workspace.resolve_export_path(&config, &output);

    let manifest = write_backup(&store, &dest)?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({ "archive": dest, "manifest": manifest })
        );
    } else {
        println!("Backup written to {} (sha256 {}).", dest.display(), manifest.checksum_sha256);
    }
    Ok(())
}
