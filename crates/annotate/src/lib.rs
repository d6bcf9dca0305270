//! # stamp-annotate
//!
//! Comment-dialect registry and the annotation codec: given a file's
//! comment syntax and a set of modification-metadata fields, synthesizes
//! the machine-generated annotation block, locates previously written
//! blocks in arbitrary source text, and rewrites documents so exactly one
//! fresh block survives at the top.
//!
//! ```text
//! path ──> DialectRegistry::resolve ──> CommentDialect
//!                                            │
//! fields ─────────────> codec::replace(text, dialect, fields, fmt)
//!                                            │
//!                        remove stale blocks + prepend fresh block
//! ```
//!
//! Pure text processing: no filesystem access, no async. `replace` is
//! idempotent, so re-running it over its own output is always safe.

mod codec;
mod dialect;
mod fields;

pub use codec::{locate, locate_all, replace, synthesize, TimestampBlock};
pub use dialect::{BlockTokens, CommentDialect, DialectRegistry, WrapTokens};
pub use fields::{
    format_timestamp, AnnotationFields, DEFAULT_TIMESTAMP_FORMAT, LABEL_MODIFIED, LABEL_PREVIOUS,
    LABEL_SIZE,
};
