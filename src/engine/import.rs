//! Import engine: preview-then-commit, plus snapshot restore staging.
//!
//! `validate` does everything that can fail for reasons the user should
//! see before anything changes: open and classify the archive, decode
//! tables, reconcile references. It never touches the store. `commit`
//! takes the resulting preview and applies it in dependency order
//! (homes, then locations and labels, then items, then policy joins),
//! regenerating every entity ID and remapping references through the
//! old-to-new map. No deduplication: importing the same archive twice
//! doubles the data, which is why callers surface the preview first.
//!
//! Commit is deliberately not transactional across the whole archive.
//! Work is applied in batches with a cancellation check at each batch
//! boundary; a mid-commit failure reports `PartialCommit` with exact
//! per-kind counts of what landed rather than rolling back.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::schema::PHOTOS_DIR;
use crate::archive::{self, ArchiveContents, SnapshotManifest};
use crate::engine::progress::{self, CancelFlag, ProgressSender, ProgressStream};
use crate::error::{PackboxError, Result};
use crate::model::{EntityCounts, EntityKind};
use crate::reconcile::{self, ImportConfig, ImportPlan, ImportPreview};
use crate::store::{InventoryStore, PENDING_RESTORE_FILE, SCHEMA_VERSION};

/// Rows committed between cancellation checks and progress reports.
pub const BATCH_SIZE: usize = 25;

/// Terminal summary of a completed commit.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub counts: EntityCounts,
    pub photo_count: usize,
    /// Homes whose primary flag was dropped because the store already
    /// had a primary home.
    pub demoted_primary_homes: usize,
}

/// Outcome of archive validation, before any mutation.
#[derive(Debug)]
pub enum ValidatedArchive {
    /// CSV variant: a preview ready to show and commit.
    Csv(Box<ImportPreview>),
    /// Snapshot variant: goes through the restore path instead.
    Snapshot(SnapshotManifest),
}

/// Open, classify, and reconcile an archive without touching the store.
///
/// # Errors
///
/// Propagates archive and reconciliation errors (`UnreadableArchive`,
/// `UnsupportedFormat`, `EmptyArchive`, `MissingTable`, decode errors).
pub fn validate(archive_path: &Path, config: &ImportConfig) -> Result<ValidatedArchive> {
    match archive::unpack_archive(archive_path)? {
        ArchiveContents::Csv(contents) => {
            let preview = reconcile::reconcile(archive_path, &contents, config)?;
            Ok(ValidatedArchive::Csv(Box::new(preview)))
        }
        ArchiveContents::Snapshot(manifest) => Ok(ValidatedArchive::Snapshot(manifest)),
    }
}

/// Spawn a commit over a validated preview on the blocking pool; the
/// caller consumes the returned stream from async code.
///
/// The store is moved into the task; reopen it from its path if the
/// caller needs it afterwards. Cancellation ends the stream without a
/// terminal event, keeping whole batches already applied.
#[must_use]
pub fn start_commit(
    store: InventoryStore,
    preview: ImportPreview,
    photos_dir: PathBuf,
    cancel: CancelFlag,
) -> ProgressStream<ImportSummary> {
    let (tx, stream) = progress::channel();
    tokio::task::spawn_blocking(move || run_commit(&store, preview, &photos_dir, &cancel, tx));
    stream
}

fn run_commit(
    store: &InventoryStore,
    preview: ImportPreview,
    photos_dir: &Path,
    cancel: &CancelFlag,
    tx: ProgressSender<ImportSummary>,
) {
    let mut tx = tx;
    let mut committed = EntityCounts::default();
    let mut photo_count = 0_usize;
    // In-flight photo copies land here first; renamed into photos_dir
    // only once fully written.
    let staging = photos_dir.join(".import-partial");

    let result = commit_inner(
        store,
        preview,
        photos_dir,
        &staging,
        cancel,
        &mut tx,
        &mut committed,
        &mut photo_count,
    );
    let _ = fs::remove_dir_all(&staging);

    match result {
        Ok(demoted_primary_homes) => {
            info!(entities = committed.total(), photos = photo_count, "import committed");
            tx.complete(ImportSummary {
                counts: committed,
                photo_count,
                demoted_primary_homes,
            });
        }
        Err(PackboxError::Cancelled) => {
            info!(entities = committed.total(), "import cancelled, committed batches kept");
            // No terminal event: the stream simply ends.
        }
        Err(e) => {
            tx.fail(PackboxError::PartialCommit {
                counts: committed,
                reason: e.to_string(),
            });
        }
    }
}

fn check_cancel(cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PackboxError::Cancelled)
    } else {
        Ok(())
    }
}

fn remap(id_map: &HashMap<Uuid, Uuid>, reference: Option<Uuid>) -> Option<Uuid> {
    reference.and_then(|old| id_map.get(&old).copied())
}

#[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
fn commit_inner(
    store: &InventoryStore,
    preview: ImportPreview,
    photos_dir: &Path,
    staging: &Path,
    cancel: &CancelFlag,
    tx: &mut ProgressSender<ImportSummary>,
    committed: &mut EntityCounts,
    photo_count: &mut usize,
) -> Result<usize> {
    let ImportPlan {
        mut homes,
        mut locations,
        mut labels,
        mut items,
        mut policies,
        photos,
        archive_path,
    } = preview.plan;

    let total = homes.len() + locations.len() + labels.len() + items.len() + policies.len()
        + photos.len();
    let mut done = 0_usize;
    let fraction = |done: usize| {
        if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        }
    };
    tx.progress(0.0);

    // The store's existing primary home wins over imported ones.
    let mut demoted_primary_homes = 0_usize;
    if store.has_primary_home()? {
        for home in &mut homes {
            if home.is_primary {
                warn!(home = %home.name, "demoting imported primary home, store already has one");
                home.is_primary = false;
                demoted_primary_homes += 1;
            }
        }
    }

    if !photos.is_empty() {
        fs::create_dir_all(staging)?;
        fs::create_dir_all(photos_dir)?;
    }

    // Old archive ID to freshly generated store ID, filled as each kind
    // commits. Parents always commit before their dependents.
    let mut id_map: HashMap<Uuid, Uuid> = HashMap::new();

    for chunk in homes.chunks_mut(BATCH_SIZE) {
        check_cancel(cancel)?;
        for home in chunk.iter_mut() {
            let new_id = Uuid::new_v4();
            id_map.insert(home.id, new_id);
            home.id = new_id;
            store.insert_home(home)?;
            committed.increment(EntityKind::Home);
        }
        done += chunk.len();
        tx.progress(fraction(done));
    }

    for chunk in locations.chunks_mut(BATCH_SIZE) {
        check_cancel(cancel)?;
        for location in chunk.iter_mut() {
            let new_id = Uuid::new_v4();
            id_map.insert(location.id, new_id);
            location.id = new_id;
            location.home_id = remap(&id_map, location.home_id);
            store.insert_location(location)?;
            committed.increment(EntityKind::Location);
        }
        done += chunk.len();
        tx.progress(fraction(done));
    }

    for chunk in labels.chunks_mut(BATCH_SIZE) {
        check_cancel(cancel)?;
        for label in chunk.iter_mut() {
            let new_id = Uuid::new_v4();
            id_map.insert(label.id, new_id);
            label.id = new_id;
            label.home_id = remap(&id_map, label.home_id);
            store.insert_label(label)?;
            committed.increment(EntityKind::Label);
        }
        done += chunk.len();
        tx.progress(fraction(done));
    }

    for chunk in items.chunks_mut(BATCH_SIZE) {
        check_cancel(cancel)?;
        let mut chunk_units = 0_usize;
        for item in chunk.iter_mut() {
            let old_id = item.id;
            let new_id = Uuid::new_v4();
            id_map.insert(old_id, new_id);
            item.id = new_id;
            item.location_id = remap(&id_map, item.location_id);
            item.label_id = remap(&id_map, item.label_id);

            // Photo first: the item row is inserted already pointing at
            // its final photo path.
            if let Some(entry) = photos.get(&old_id) {
                let extension = entry
                    .file_name
                    .rsplit('.')
                    .next()
                    .filter(|ext| *ext != entry.file_name)
                    .unwrap_or("jpg");
                let dest_name = format!("{new_id}.{extension}");
                let scratch = staging.join(&dest_name);
                if let Err(e) = archive::extract_photo(&archive_path, &entry.entry_name, &scratch)
                {
                    let _ = fs::remove_file(&scratch);
                    return Err(e);
                }
                fs::rename(&scratch, photos_dir.join(&dest_name))?;
                item.photo_path = Some(format!("{PHOTOS_DIR}/{dest_name}"));
                *photo_count += 1;
                chunk_units += 1;
            }

            store.insert_item(item)?;
            committed.increment(EntityKind::Item);
            chunk_units += 1;
        }
        done += chunk_units;
        tx.progress(fraction(done));
    }

    for chunk in policies.chunks_mut(BATCH_SIZE) {
        check_cancel(cancel)?;
        for policy in chunk.iter_mut() {
            let new_id = Uuid::new_v4();
            id_map.insert(policy.id, new_id);
            policy.id = new_id;
            policy.home_ids = policy
                .home_ids
                .iter()
                .filter_map(|old| id_map.get(old).copied())
                .collect();
            store.insert_policy(policy)?;
            committed.increment(EntityKind::InsurancePolicy);
        }
        done += chunk.len();
        tx.progress(fraction(done));
    }

    debug!(entities = committed.total(), "commit plan applied");
    Ok(demoted_primary_homes)
}

/// Stage a snapshot restore: extract and verify the database payload
/// next to the live database. The store swaps it in on next open, so a
/// running process never has its database replaced underneath it.
///
/// # Errors
///
/// Returns `SnapshotVersion` if the snapshot's schema is newer than
/// this build supports, `SnapshotChecksum` on payload corruption.
pub fn stage_restore(
    archive_path: &Path,
    manifest: &SnapshotManifest,
    db_path: &Path,
) -> Result<PathBuf> {
    if manifest.schema_version > SCHEMA_VERSION {
        return Err(PackboxError::SnapshotVersion {
            found: manifest.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    let pending = db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(PENDING_RESTORE_FILE);
    archive::read_snapshot_payload(archive_path, manifest, &pending)?;
    info!(path = %pending.display(), "restore staged, applied on next open");
    Ok(pending)
}
