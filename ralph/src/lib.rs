//! Task-queue and iteration-control core for a file-based business automation
//! vault.
//!
//! External watchers drop task files into an inbox. A loop runner claims one,
//! opens a state record for it and then advances, checks and archives that
//! record until the task completes or its iteration budget runs out.
//!
//! - **[`core`]**: pure, deterministic logic (state transitions, selection,
//!   estimation, health classification). No I/O.
//! - **[`io`]**: filesystem access (task documents, state and group records,
//!   approval folders, config and layout).
//! - Components ([`states`], [`groups`], [`approval`], [`estimate`],
//!   [`health`]) combine the two and are composed into one [`service::Ralph`]
//!   per process, which [`dispatch`] exposes over line-delimited JSON-RPC.

pub mod approval;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod estimate;
pub mod exit_codes;
pub mod groups;
pub mod health;
pub mod io;
pub mod logging;
pub mod protocol;
pub mod service;
pub mod states;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
