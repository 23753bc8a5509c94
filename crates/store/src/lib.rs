//! Object store access for the call metadata pipeline.
//!
//! The pipeline only ever talks to storage through the [`ObjectStore`] trait. Two backends ship
//! with this crate:
//!
//! - [`FsObjectStore`] maps buckets to directories under a root, for local runs and the CLI.
//! - [`MemoryObjectStore`] keeps everything in a map, for tests and dry runs.
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! └── <bucket>/
//!     └── <key segments…>/
//!         └── <file name>
//! ```
//!
//! ## Etags
//!
//! Every [`ObjectMeta`] carries an etag: the lowercase hex SHA-256 of the object body. Two
//! objects with identical bytes have identical etags regardless of backend, which is what makes
//! [`ObjectStore::put_if_match`] usable as a compare-and-swap.
//!
//! ## Example Usage
//!
//! ```no_run
//! use callmeta_store::{FsObjectStore, ObjectStore};
//! use callmeta_types::{BucketName, ObjectKey};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsObjectStore::new(Path::new("object_store"))?;
//! let bucket = BucketName::parse("preload")?;
//! let key = ObjectKey::parse("incoming/call-0001.xml")?;
//!
//! if store.exists(&bucket, &key)? {
//!     let body = store.get(&bucket, &key)?;
//!     println!("{} bytes", body.len());
//! }
//! # Ok(())
//! # }
//! ```

mod fs;
mod memory;
mod meta;

use callmeta_types::{BucketName, KeyError, ObjectKey};
use std::path::Path;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use meta::{etag_for, ObjectMeta};

/// Errors that can occur during object store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid store root: {0}")]
    InvalidRoot(String),

    /// No object exists at the given address
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: BucketName, key: ObjectKey },

    /// A conditional write saw a different etag than the caller expected
    #[error(
        "Precondition failed for {bucket}/{key}: expected etag {expected}, found {}",
        actual.as_deref().unwrap_or("no object")
    )]
    PreconditionFailed {
        bucket: BucketName,
        key: ObjectKey,
        expected: String,
        actual: Option<String>,
    },

    /// Bucket or key validation failed
    #[error("Invalid address: {0}")]
    Key(#[from] KeyError),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A bucket/key addressed blob store.
///
/// Implementations must be safe to share between threads; each pipeline invocation holds the
/// store behind an `Arc`.
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Returns metadata for an existing object.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no object exists at the address.
    fn head(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<ObjectMeta>;

    /// Reads the full body of an object.
    fn get(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<Vec<u8>>;

    /// Writes (or overwrites) an object.
    fn put(&self, bucket: &BucketName, key: &ObjectKey, body: &[u8]) -> StoreResult<ObjectMeta>;

    /// Overwrites an object only if its current etag equals `expected_etag`.
    ///
    /// # Errors
    ///
    /// [`StoreError::PreconditionFailed`] when the object is missing or has changed.
    fn put_if_match(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: &[u8],
        expected_etag: &str,
    ) -> StoreResult<ObjectMeta>;

    /// Copies an object, leaving the source in place.
    fn copy(
        &self,
        source_bucket: &BucketName,
        source_key: &ObjectKey,
        target_bucket: &BucketName,
        target_key: &ObjectKey,
    ) -> StoreResult<ObjectMeta> {
        let body = self.get(source_bucket, source_key)?;
        self.put(target_bucket, target_key, &body)
    }

    /// Uploads a local file as an object.
    fn upload_file(
        &self,
        source_path: &Path,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StoreResult<ObjectMeta> {
        let body = std::fs::read(source_path).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read upload source {}: {}", source_path.display(), e),
            ))
        })?;
        self.put(bucket, key, &body)
    }

    /// Single existence check. Only [`StoreError::NotFound`] maps to `false`.
    fn exists(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<bool> {
        match self.head(bucket, key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
