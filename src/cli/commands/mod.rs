//! Command handlers, one module per subcommand.

pub mod add;
pub mod backup;
pub mod export;
pub mod import;
pub mod init;
pub mod list;
pub mod preview;
pub mod restore;
