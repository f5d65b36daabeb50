//! Agora domain primitives shared by every other crate.
//!
//! Nothing in here performs I/O; the modules hold identifiers, error types,
//! well-known constants and the small pure helpers (subscription-pattern
//! matching, search tokenization, audit redaction) that the event and
//! worker crates build on.

pub mod audit;
pub mod channels;
pub mod error;
pub mod payload;
pub mod search;
pub mod subscription;
pub mod types;
