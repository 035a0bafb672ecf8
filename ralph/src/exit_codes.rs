//! Stable exit codes for `ralph` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, config or vault layout, or any other failure.
pub const INVALID: i32 = 1;
/// `ralph claim` found no claimable task.
pub const EMPTY: i32 = 2;
/// `ralph health` reported `warning` or `critical`.
pub const DEGRADED: i32 = 3;
