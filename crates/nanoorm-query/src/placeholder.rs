//! Collision-resistant bind parameter names.

use nanoorm_core::sanitize_identifier;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

/// A process-unique hex token. Every call returns a new one.
pub fn unique_suffix() -> String {
    format!("{:x}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// A fresh placeholder name for `column`: `<sanitized column>_<unique>`.
pub fn placeholder_for(column: &str) -> String {
    format!("{}_{}", sanitize_identifier(column), unique_suffix())
}
