//! `packbox` - Home inventory store with portable export/import.
//!
//! This crate provides the core functionality for the `pbx` CLI tool:
//! a `SQLite`-backed home inventory whose contents move between
//! installations as self-describing ZIP archives (CSV tables plus
//! photos), with preview-before-commit imports and full database
//! snapshot backups.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Home, Location, Label, Item, policy, Money)
//! - [`store`] - `SQLite` database layer
//! - [`archive`] - CSV/ZIP archive codec and snapshot container
//! - [`reconcile`] - Archive rows to insert-ready entities
//! - [`engine`] - Export/import/backup/restore with progress streams
//! - [`config`] - Workspace discovery and configuration
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod util;

pub use error::{PackboxError, Result};
