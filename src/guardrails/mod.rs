//! Static policy applied before a request is forwarded upstream.

pub mod cost;
pub mod limits;
pub mod repo_allowlist;
pub mod sql;

pub use cost::{clamp_rows, enforce_estimated_bytes};
pub use limits::clamp_int;
pub use repo_allowlist::RepoAllowlist;
pub use sql::{ensure_select, normalize_sql, reject_multiple_statements};
