//! Export engine: store contents to a portable CSV archive, and the
//! snapshot-variant backup writer.
//!
//! Export does synchronous SQLite and zip I/O, so it runs on a
//! blocking worker thread and reports through a progress channel; the
//! async runtime only ever sees the consumer half of that channel.
//! A counting pass sizes the work up front so fractions are exact:
//! one unit per entity row plus one per photo copy. The archive is
//! written to a `.partial` sibling and renamed into place only after
//! the central directory is finalized, so a crash, failure, or
//! cancellation never leaves a half-written file at the destination.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{table, ArchiveWriter, SnapshotManifest};
use crate::engine::progress::{self, CancelFlag, ProgressSender, ProgressStream};
use crate::error::{PackboxError, Result};
use crate::model::{EntityCounts, EntityKind, Home, InsurancePolicy, Item, Label, Location};
use crate::store::{InventoryStore, SCHEMA_VERSION};

/// Which entity kinds an export includes. Included kinds with no rows
/// still get a header-only table so re-import sees every table it
/// expects.
#[derive(Debug, Clone, Copy, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ExportConfig {
    pub include_homes: bool,
    pub include_locations: bool,
    pub include_labels: bool,
    pub include_items: bool,
    pub include_policies: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_homes: true,
            include_locations: true,
            include_labels: true,
            include_items: true,
            include_policies: true,
        }
    }
}

impl ExportConfig {
    #[must_use]
    pub const fn includes(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Home => self.include_homes,
            EntityKind::Location => self.include_locations,
            EntityKind::Label => self.include_labels,
            EntityKind::Item => self.include_items,
            EntityKind::InsurancePolicy => self.include_policies,
        }
    }
}

/// Terminal summary of a completed export.
#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub archive_path: PathBuf,
    pub counts: EntityCounts,
    pub photo_count: usize,
}

/// Spawn an export on the blocking pool; the caller consumes the
/// returned stream from async code.
///
/// The store is moved into the task. Cancellation ends the stream
/// without a terminal event and removes the partial file.
#[must_use]
pub fn start(
    store: InventoryStore,
    config: ExportConfig,
    photos_dir: PathBuf,
    dest: PathBuf,
    cancel: CancelFlag,
) -> ProgressStream<ExportSummary> {
    let (tx, stream) = progress::channel();
    tokio::task::spawn_blocking(move || run(&store, &config, &photos_dir, &dest, &cancel, tx));
    stream
}

fn run(
    store: &InventoryStore,
    config: &ExportConfig,
    photos_dir: &Path,
    dest: &Path,
    cancel: &CancelFlag,
    tx: ProgressSender<ExportSummary>,
) {
    let mut tx = tx;
    let partial = partial_path(dest);
    let result = run_inner(store, config, photos_dir, dest, &partial, cancel, &mut tx);
    match result {
        Ok(summary) => {
            info!(path = %dest.display(), entities = summary.counts.total(), "export complete");
            tx.complete(summary);
        }
        Err(PackboxError::Cancelled) => {
            let _ = fs::remove_file(&partial);
            info!(path = %dest.display(), "export cancelled");
            // No terminal event: the stream simply ends.
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            tx.fail(e);
        }
    }
}

/// Sibling scratch path: `export.zip` becomes `export.zip.partial`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Rows and resolved photo sources to write, gathered up front.
struct ExportBatch {
    homes: Vec<Home>,
    locations: Vec<Location>,
    labels: Vec<Label>,
    items: Vec<Item>,
    policies: Vec<InsurancePolicy>,
    /// `(archive file name, source path)` pairs, already existence-checked.
    photos: Vec<(String, PathBuf)>,
}

impl ExportBatch {
    fn counts(&self) -> EntityCounts {
        let mut counts = EntityCounts::default();
        counts.add(EntityKind::Home, self.homes.len());
        counts.add(EntityKind::Location, self.locations.len());
        counts.add(EntityKind::Label, self.labels.len());
        counts.add(EntityKind::Item, self.items.len());
        counts.add(EntityKind::InsurancePolicy, self.policies.len());
        counts
    }
}

fn gather(store: &InventoryStore, config: &ExportConfig, photos_dir: &Path) -> Result<ExportBatch> {
    let homes = if config.include_homes {
        store.fetch_homes()?
    } else {
        Vec::new()
    };
    let locations = if config.include_locations {
        store.fetch_locations()?
    } else {
        Vec::new()
    };
    let labels = if config.include_labels {
        store.fetch_labels()?
    } else {
        Vec::new()
    };
    let items = if config.include_items {
        store.fetch_items()?
    } else {
        Vec::new()
    };
    let policies = if config.include_policies {
        store.fetch_policies()?
    } else {
        Vec::new()
    };

    // Resolve photo sources now so the total unit count is exact. A
    // referenced file that has gone missing is skipped, not fatal.
    let mut photos = Vec::new();
    for item in &items {
        let Some(photo_path) = &item.photo_path else {
            continue;
        };
        let file_name = photo_path.rsplit('/').next().unwrap_or(photo_path);
        let source = photos_dir.join(file_name);
        if source.is_file() {
            photos.push((file_name.to_string(), source));
        } else {
            warn!(item = %item.title, path = %source.display(), "photo file missing, skipping");
        }
    }

    Ok(ExportBatch {
        homes,
        locations,
        labels,
        items,
        policies,
        photos,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_inner(
    store: &InventoryStore,
    config: &ExportConfig,
    photos_dir: &Path,
    dest: &Path,
    partial: &Path,
    cancel: &CancelFlag,
    tx: &mut ProgressSender<ExportSummary>,
) -> Result<ExportSummary> {
    let batch = gather(store, config, photos_dir)?;
    let counts = batch.counts();
    let total = counts.total() + batch.photos.len();
    debug!(entities = counts.total(), photos = batch.photos.len(), "export sized");

    tx.progress(0.0);
    let mut done = 0_usize;
    // Header-only tables for empty kinds still count as progress-free
    // writes; only rows and photos advance the fraction.
    let fraction = |done: usize| {
        if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        }
    };

    let mut writer = ArchiveWriter::create(partial)?;
    for kind in EntityKind::ALL {
        if !config.includes(kind) {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(PackboxError::Cancelled);
        }
        let (text, rows) = match kind {
            EntityKind::Home => (table::encode_homes(&batch.homes)?, batch.homes.len()),
            EntityKind::Location => (
                table::encode_locations(&batch.locations)?,
                batch.locations.len(),
            ),
            EntityKind::Label => (table::encode_labels(&batch.labels)?, batch.labels.len()),
            EntityKind::Item => (table::encode_items(&batch.items)?, batch.items.len()),
            EntityKind::InsurancePolicy => (
                table::encode_policies(&batch.policies)?,
                batch.policies.len(),
            ),
        };
        writer.add_table(kind, &text)?;
        done += rows;
        tx.progress(fraction(done));
    }

    for (file_name, source) in &batch.photos {
        if cancel.is_cancelled() {
            return Err(PackboxError::Cancelled);
        }
        writer.add_photo(file_name, source)?;
        done += 1;
        tx.progress(fraction(done));
    }

    writer.finish()?;
    fs::rename(partial, dest).map_err(|e| PackboxError::ArchiveWrite {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(ExportSummary {
        archive_path: dest.to_path_buf(),
        counts,
        photo_count: batch.photos.len(),
    })
}

/// Write a snapshot-variant backup of the whole database.
///
/// `VACUUM INTO` produces a consistent copy even with the connection
/// open, so no lock juggling is needed.
///
/// # Errors
///
/// Returns `ArchiveWrite` or `Database` on failure.
pub fn write_backup(store: &InventoryStore, dest: &Path) -> Result<SnapshotManifest> {
    let scratch = partial_path(dest).with_extension("sqlite");
    let _ = fs::remove_file(&scratch);
    store.copy_database_to(&scratch)?;
    let result = crate::archive::write_snapshot(dest, &scratch, SCHEMA_VERSION);
    let _ = fs::remove_file(&scratch);
    let manifest = result?;
    info!(path = %dest.display(), checksum = %manifest.checksum_sha256, "backup written");
    Ok(manifest)
}
