use crate::error::ToolError;

/// Fail fast when the dry-run estimate exceeds the byte cap. A missing
/// estimate or a non-positive cap disables the check.
pub fn enforce_estimated_bytes(estimated_bytes: Option<i64>, max_bytes: i64) -> Result<(), ToolError> {
    match estimated_bytes {
        Some(estimated) if max_bytes > 0 && estimated > max_bytes => Err(ToolError::rejected(format!(
            "Query rejected: estimated bytes processed ({estimated}) exceeds cap ({max_bytes})."
        ))),
        _ => Ok(()),
    }
}

/// Number of rows returned to the client. This limits the payload only; it
/// does not change what the query costs.
pub fn clamp_rows(requested: Option<i64>, default: i64, hard_max: i64) -> i64 {
    let n = match requested {
        Some(n) if n > 0 => n,
        _ => default,
    };
    n.min(hard_max)
}
