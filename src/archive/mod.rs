//! Archive codec: lossless conversion between entity collections and a
//! self-describing portable archive.
//!
//! - [`schema`] - per-kind column order and required columns
//! - [`table`] - CSV encode/decode per entity kind
//! - [`container`] - ZIP packing/unpacking and variant sniffing

pub mod container;
pub mod schema;
pub mod table;

pub use container::{
    extract_photo, pack_archive, read_snapshot_payload, unpack_archive, write_snapshot,
    ArchiveContents, ArchiveWriter, CsvContents, PhotoEntry, SnapshotManifest,
};
pub use table::{decode_table, RawRow};
