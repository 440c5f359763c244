//! Shared utilities for the joe workspace.
//!
//! - **limits**: shared constants and thresholds
//! - **excerpts** (feature): head/tail truncation for long plan/query text
//! - **redact** (feature): password/secret redaction for log and debug output
//! - **table** (feature): simple fixed-width table rendering for psql-style output

pub mod limits;

#[cfg(feature = "excerpts")]
pub mod excerpts;

#[cfg(feature = "redact")]
pub mod redact;

#[cfg(feature = "table")]
pub mod table;

pub use limits::*;

#[cfg(feature = "excerpts")]
pub use excerpts::cut_text;

#[cfg(feature = "redact")]
pub use redact::Redacted;

#[cfg(feature = "table")]
pub use table::render_table;
