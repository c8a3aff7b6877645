//! `packbox` (pbx) - Home inventory archive tool
//!
//! `SQLite`-backed inventory with portable CSV/ZIP export-import,
//! preview-before-commit imports, and snapshot backup/restore.

use packbox::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
