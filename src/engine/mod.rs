//! Long-running operations over the store: export, import, backup and
//! restore. Each runs as a task behind a [`progress`] channel so the
//! caller can render progress and cancel cooperatively.

pub mod export;
pub mod import;
pub mod progress;

pub use export::{write_backup, ExportConfig, ExportSummary};
pub use import::{stage_restore, validate, ImportSummary, ValidatedArchive, BATCH_SIZE};
pub use progress::{CancelFlag, ProgressEvent, ProgressStream};
