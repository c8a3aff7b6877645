//! ZIP container handling.
//!
//! Two archive variants share the `.zip` container:
//!
//! - **CSV tables**: one CSV file per entity kind at a fixed top-level
//!   path plus a `photos/` directory. No manifest entry.
//! - **Snapshot**: a `manifest.json` entry describing a raw SQLite
//!   database payload (full-replacement backup/restore).
//!
//! The presence of the manifest entry is the signature that separates
//! the two. Unpacking streams entries one at a time rather than loading
//! the whole archive into memory; photo payloads are never buffered
//! here, only listed, and extracted individually on demand.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::archive::schema::{MANIFEST_FILE, PHOTOS_DIR, SNAPSHOT_DB_FILE, SNAPSHOT_FORMAT};
use crate::error::{PackboxError, Result};
use crate::model::EntityKind;

/// Manifest of the snapshot variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format: String,
    pub schema_version: i32,
    pub checksum_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// A photo entry listed inside an archive (content not yet extracted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoEntry {
    /// Full entry name inside the zip, e.g. `photos/<id>.jpg`.
    pub entry_name: String,
    /// Final path component, e.g. `<id>.jpg`.
    pub file_name: String,
}

/// Contents of a CSV-variant archive.
#[derive(Debug, Default)]
pub struct CsvContents {
    pub tables: HashMap<EntityKind, String>,
    pub photos: Vec<PhotoEntry>,
}

/// Result of sniffing and unpacking an archive.
#[derive(Debug)]
pub enum ArchiveContents {
    Csv(CsvContents),
    Snapshot(SnapshotManifest),
}

fn unreadable(path: &Path, reason: impl ToString) -> PackboxError {
    PackboxError::UnreadableArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn write_failed(path: &Path, reason: impl ToString) -> PackboxError {
    PackboxError::ArchiveWrite {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Final path component of a zip entry, rejecting traversal attempts.
fn safe_file_name(entry_name: &str) -> Option<String> {
    let name = entry_name.rsplit('/').next()?;
    if name.is_empty() || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name.to_string())
}

/// Open an archive, classify its variant, and read its table text.
///
/// # Errors
///
/// - `UnreadableArchive`: not a ZIP, or a corrupt entry.
/// - `UnsupportedFormat`: a ZIP matching neither variant signature.
/// - `EmptyArchive`: a ZIP with no entries at all.
pub fn unpack_archive(path: &Path) -> Result<ArchiveContents> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| unreadable(path, e))?;

    // Snapshot signature first: a manifest entry settles the variant.
    match archive.by_name(MANIFEST_FILE) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| unreadable(path, e))?;
            let manifest: SnapshotManifest = serde_json::from_str(&text)
                .map_err(|e| unreadable(path, format!("invalid manifest: {e}")))?;
            if manifest.format != SNAPSHOT_FORMAT {
                return Err(PackboxError::UnsupportedFormat {
                    path: path.to_path_buf(),
                });
            }
            debug!(schema_version = manifest.schema_version, "snapshot archive");
            return Ok(ArchiveContents::Snapshot(manifest));
        }
        Err(ZipError::FileNotFound) => {}
        Err(e) => return Err(unreadable(path, e)),
    }

    if archive.is_empty() {
        return Err(PackboxError::EmptyArchive {
            path: path.to_path_buf(),
        });
    }

    let mut contents = CsvContents::default();
    let photo_prefix = format!("{PHOTOS_DIR}/");

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| unreadable(path, e))?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();

        if let Some(kind) = EntityKind::from_table_file(&entry_name) {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| unreadable(path, e))?;
            contents.tables.insert(kind, text);
        } else if let Some(stripped) = entry_name.strip_prefix(&photo_prefix) {
            if let Some(file_name) = safe_file_name(stripped) {
                contents.photos.push(PhotoEntry {
                    entry_name,
                    file_name,
                });
            }
        }
        // Anything else is tolerated and ignored (forward compatibility).
    }

    if contents.tables.is_empty() && contents.photos.is_empty() {
        return Err(PackboxError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    debug!(
        tables = contents.tables.len(),
        photos = contents.photos.len(),
        "csv archive"
    );
    Ok(ArchiveContents::Csv(contents))
}

/// Stream a single photo entry out of an archive to `dest`.
///
/// # Errors
///
/// Returns `UnreadableArchive` if the entry cannot be read, or `Io` if
/// the destination cannot be written.
pub fn extract_photo(archive_path: &Path, entry_name: &str, dest: &Path) -> Result<u64> {
    let file = File::open(archive_path).map_err(|e| unreadable(archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| unreadable(archive_path, e))?;
    let mut entry = archive
        .by_name(entry_name)
        .map_err(|e| unreadable(archive_path, e))?;
    let mut out = File::create(dest)?;
    let written = io::copy(&mut entry, &mut out)?;
    Ok(written)
}

/// Incremental writer for the CSV-variant archive.
///
/// The export engine drives this entry by entry so it can report
/// progress between photo copies.
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    path: PathBuf,
}

impl ArchiveWriter {
    /// Create the archive file and the writer over it.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveWrite` if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| write_failed(path, e))?;
        Ok(Self {
            zip: ZipWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    fn options() -> FileOptions {
        FileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    /// Add one entity table at its fixed top-level path.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveWrite` on failure.
    pub fn add_table(&mut self, kind: EntityKind, csv_text: &str) -> Result<()> {
        self.zip
            .start_file(kind.table_file(), Self::options())
            .and_then(|()| self.zip.write_all(csv_text.as_bytes()).map_err(Into::into))
            .map_err(|e| write_failed(&self.path, e))
    }

    /// Copy one photo file under `photos/<file_name>`.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveWrite` on failure.
    pub fn add_photo(&mut self, file_name: &str, source: &Path) -> Result<u64> {
        let entry_name = format!("{PHOTOS_DIR}/{file_name}");
        self.zip
            .start_file(entry_name, Self::options())
            .map_err(|e| write_failed(&self.path, e))?;
        let mut input = File::open(source).map_err(|e| write_failed(&self.path, e))?;
        io::copy(&mut input, &mut self.zip).map_err(|e| write_failed(&self.path, e))
    }

    /// Finalize the central directory and flush.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveWrite` on failure.
    pub fn finish(mut self) -> Result<()> {
        self.zip
            .finish()
            .map(|_| ())
            .map_err(|e| write_failed(&self.path, e))
    }
}

/// One-shot CSV-variant packer (tests and small exports).
///
/// # Errors
///
/// Returns `ArchiveWrite` on any write failure.
pub fn pack_archive(
    dest: &Path,
    tables: &HashMap<EntityKind, String>,
    photos: &[(String, PathBuf)],
) -> Result<()> {
    let mut writer = ArchiveWriter::create(dest)?;
    // Deterministic table order: dependency order of the kinds.
    for kind in EntityKind::ALL {
        if let Some(text) = tables.get(&kind) {
            writer.add_table(kind, text)?;
        }
    }
    for (file_name, source) in photos {
        writer.add_photo(file_name, source)?;
    }
    writer.finish()
}

fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write a snapshot-variant archive wrapping the raw database file.
///
/// # Errors
///
/// Returns `ArchiveWrite` on failure, `Io` if the database cannot be read.
pub fn write_snapshot(dest: &Path, db_path: &Path, schema_version: i32) -> Result<SnapshotManifest> {
    let manifest = SnapshotManifest {
        format: SNAPSHOT_FORMAT.to_string(),
        schema_version,
        checksum_sha256: sha256_hex(db_path)?,
        created_at: Utc::now(),
    };
    let manifest_json = serde_json::to_string_pretty(&manifest)?;

    let file = File::create(dest).map_err(|e| write_failed(dest, e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_FILE, options)
        .and_then(|()| zip.write_all(manifest_json.as_bytes()).map_err(Into::into))
        .map_err(|e| write_failed(dest, e))?;

    zip.start_file(SNAPSHOT_DB_FILE, options)
        .map_err(|e| write_failed(dest, e))?;
    let mut db = File::open(db_path).map_err(|e| write_failed(dest, e))?;
    io::copy(&mut db, &mut zip).map_err(|e| write_failed(dest, e))?;

    zip.finish().map_err(|e| write_failed(dest, e))?;
    Ok(manifest)
}

/// Extract and checksum-verify the snapshot database payload.
///
/// The partially written destination is removed on checksum mismatch.
///
/// # Errors
///
/// Returns `UnreadableArchive` if the payload entry is missing,
/// `SnapshotChecksum` on a hash mismatch.
pub fn read_snapshot_payload(
    archive_path: &Path,
    manifest: &SnapshotManifest,
    dest: &Path,
) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| unreadable(archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| unreadable(archive_path, e))?;
    let mut entry = archive
        .by_name(SNAPSHOT_DB_FILE)
        .map_err(|e| unreadable(archive_path, e))?;

    let mut out = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = entry.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        out.write_all(&buffer[..read])?;
    }
    drop(out);

    let found = format!("{:x}", hasher.finalize());
    if found != manifest.checksum_sha256 {
        let _ = std::fs::remove_file(dest);
        return Err(PackboxError::SnapshotChecksum {
            expected: manifest.checksum_sha256.clone(),
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::table;
    use crate::model::Item;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    #[test]
    fn test_pack_unpack_csv_variant() {
        let dir = temp_dir();
        let archive_path = dir.path().join("export.zip");

        let item = Item::new("Bookshelf");
        let mut tables = HashMap::new();
        tables.insert(
            EntityKind::Item,
            table::encode_items(std::slice::from_ref(&item)).unwrap(),
        );

        let photo_src = dir.path().join("photo.jpg");
        std::fs::write(&photo_src, b"not really a jpeg").unwrap();
        let photos = vec![(format!("{}.jpg", item.id), photo_src)];

        pack_archive(&archive_path, &tables, &photos).unwrap();

        match unpack_archive(&archive_path).unwrap() {
            ArchiveContents::Csv(contents) => {
                assert!(contents.tables.contains_key(&EntityKind::Item));
                assert_eq!(contents.photos.len(), 1);
                assert_eq!(contents.photos[0].file_name, format!("{}.jpg", item.id));
            }
            ArchiveContents::Snapshot(_) => panic!("expected csv variant"),
        }
    }

    #[test]
    fn test_extract_photo_roundtrip() {
        let dir = temp_dir();
        let archive_path = dir.path().join("export.zip");

        let photo_src = dir.path().join("photo.jpg");
        std::fs::write(&photo_src, b"pixels").unwrap();
        pack_archive(
            &archive_path,
            &HashMap::new(),
            &[("a.jpg".to_string(), photo_src)],
        )
        .unwrap();

        let dest = dir.path().join("out.jpg");
        let written = extract_photo(&archive_path, "photos/a.jpg", &dest).unwrap();
        assert_eq!(written, 6);
        assert_eq!(std::fs::read(&dest).unwrap(), b"pixels");
    }

    #[test]
    fn test_not_a_zip_is_unreadable() {
        let dir = temp_dir();
        let path = dir.path().join("junk.zip");
        std::fs::write(&path, b"definitely not a zip file").unwrap();
        assert!(matches!(
            unpack_archive(&path),
            Err(PackboxError::UnreadableArchive { .. })
        ));
    }

    #[test]
    fn test_unknown_entries_only_is_unsupported() {
        let dir = temp_dir();
        let path = dir.path().join("other.zip");
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("readme.txt", FileOptions::default()).unwrap();
        zip.write_all(b"hello").unwrap();
        zip.finish().unwrap();

        assert!(matches!(
            unpack_archive(&path),
            Err(PackboxError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_zero_entry_zip_is_empty() {
        let dir = temp_dir();
        let path = dir.path().join("empty.zip");
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.finish().unwrap();

        assert!(matches!(
            unpack_archive(&path),
            Err(PackboxError::EmptyArchive { .. })
        ));
    }

    #[test]
    fn test_snapshot_roundtrip_with_checksum() {
        let dir = temp_dir();
        let db_path = dir.path().join("inventory.sqlite");
        std::fs::write(&db_path, b"sqlite-bytes-stand-in").unwrap();

        let snapshot_path = dir.path().join("backup.zip");
        let manifest = write_snapshot(&snapshot_path, &db_path, 1).unwrap();
        assert_eq!(manifest.format, SNAPSHOT_FORMAT);

        match unpack_archive(&snapshot_path).unwrap() {
            ArchiveContents::Snapshot(read_back) => {
                assert_eq!(read_back.checksum_sha256, manifest.checksum_sha256);
            }
            ArchiveContents::Csv(_) => panic!("expected snapshot variant"),
        }

        let restored = dir.path().join("restored.sqlite");
        read_snapshot_payload(&snapshot_path, &manifest, &restored).unwrap();
        assert_eq!(
            std::fs::read(&restored).unwrap(),
            b"sqlite-bytes-stand-in"
        );
    }

    #[test]
    fn test_snapshot_checksum_mismatch_rejected() {
        let dir = temp_dir();
        let db_path = dir.path().join("inventory.sqlite");
        std::fs::write(&db_path, b"original").unwrap();

        let snapshot_path = dir.path().join("backup.zip");
        let mut manifest = write_snapshot(&snapshot_path, &db_path, 1).unwrap();
        manifest.checksum_sha256 = "0".repeat(64);

        let restored = dir.path().join("restored.sqlite");
        let err = read_snapshot_payload(&snapshot_path, &manifest, &restored).unwrap_err();
        assert!(matches!(err, PackboxError::SnapshotChecksum { .. }));
        assert!(!restored.exists());
    }

    #[test]
    fn test_safe_file_name_rejects_traversal() {
        assert_eq!(safe_file_name("a/b/c.jpg"), Some("c.jpg".to_string()));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name(""), None);
    }
}
