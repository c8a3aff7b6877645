use crate::cli::Context;
use crate::config::Workspace;
use crate::error::Result;
use crate::store::InventoryStore;

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the workspace or database cannot be created.
pub fn execute(ctx: &Context) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let workspace = Workspace::init(&cwd)?;

    // Creates the database file and applies the schema.
    let _store = InventoryStore::open(&workspace.db_path())?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({ "workspace": workspace.dir(), "database": workspace.db_path() })
        );
    } else {
        println!("Initialized packbox workspace in {}", workspace.dir().display());
    }
    Ok(())
}
