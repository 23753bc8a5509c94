//! Validated value types for the call metadata pipeline.
//!
//! Everything that crosses a crate boundary as "a string with rules" lives here so the rules are
//! checked once, at construction, and never again:
//!
//! - [`NonEmptyText`] backs every `CallSummary` field, which must never be blank.
//! - [`BucketName`] and [`ObjectKey`] address objects in the store and reject anything that could
//!   escape a bucket when the store is backed by a filesystem.

mod key;
mod text;

pub use key::{BucketName, KeyError, ObjectKey};
pub use text::{NonEmptyText, TextError};
