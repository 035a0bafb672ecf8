//! Filesystem side of the core: everything that reads or writes the vault.

pub mod approval_dirs;
pub mod config;
pub mod group_store;
pub mod inbox;
pub mod init;
pub mod state_store;
pub mod task_doc;
