//! Filesystem-backed object store.
//!
//! Each bucket is a directory directly under the store root and each key maps onto nested
//! directories below it. Keys are validated by [`ObjectKey`] before they get here, so a key can
//! never name a path outside its bucket.
//!
//! Writes and copies go to a temporary file in the target directory and are renamed into place,
//! so a reader never observes a half-written object. Conditional writes compare etags and then
//! rename; the compare and the rename are not atomic with respect to other processes.

use crate::{ObjectMeta, ObjectStore, StoreError, StoreResult};
use callmeta_types::{BucketName, KeyError, ObjectKey};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Bytes read from the head of a file for media-type sniffing.
const SNIFF_LEN: u64 = 8 * 1024;

/// Object store rooted at a local directory
#[derive(Debug)]
pub struct FsObjectStore {
    /// Canonicalised root directory holding one directory per bucket
    root_directory: PathBuf,
}

impl FsObjectStore {
    /// Opens a store rooted at an existing directory
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRoot`] if the directory does not exist, is not a directory,
    /// or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> StoreResult<Self> {
        if !root_directory.exists() {
            return Err(StoreError::InvalidRoot(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(StoreError::InvalidRoot(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            StoreError::InvalidRoot(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Creates the bucket directory if it is missing.
    pub fn create_bucket(&self, bucket: &BucketName) -> StoreResult<PathBuf> {
        let path = self.bucket_path(bucket);
        fs::create_dir_all(&path).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create bucket directory {}: {}", path.display(), e),
            ))
        })?;
        Ok(path)
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    fn bucket_path(&self, bucket: &BucketName) -> PathBuf {
        self.root_directory.join(bucket.as_str())
    }

    fn object_path(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<PathBuf> {
        if key.is_folder_marker() {
            return Err(KeyError::FolderMarker(key.to_string()).into());
        }
        Ok(key
            .segments()
            .fold(self.bucket_path(bucket), |path, segment| path.join(segment)))
    }

    fn not_found(bucket: &BucketName, key: &ObjectKey) -> StoreError {
        StoreError::NotFound {
            bucket: bucket.clone(),
            key: key.clone(),
        }
    }

    fn write_atomically(&self, path: &Path, body: &[u8]) -> StoreResult<()> {
        self.stage_and_persist(path, |staged| staged.write_all(body))
    }

    /// Fill a temporary file beside `path`, sync it, then rename it over `path`.
    fn stage_and_persist(
        &self,
        path: &Path,
        fill: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
    ) -> StoreResult<()> {
        let parent = path.parent().unwrap_or(&self.root_directory);
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory {}: {}", parent.display(), e),
            ))
        })?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        fill(staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.error.kind(),
                format!("Failed to write object to {}: {}", path.display(), e.error),
            ))
        })?;
        Ok(())
    }

    fn current_etag(&self, path: &Path) -> StoreResult<Option<String>> {
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

impl ObjectStore for FsObjectStore {
    fn head(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(Self::not_found(bucket, key));
        }

        let metadata = fs::metadata(&path)?;
        let last_modified: DateTime<Utc> = metadata.modified()?.into();
        let etag = self.current_etag(&path)?.ok_or_else(|| Self::not_found(bucket, key))?;

        let mut sniff = Vec::new();
        fs::File::open(&path)?
            .take(SNIFF_LEN)
            .read_to_end(&mut sniff)?;

        Ok(ObjectMeta {
            bucket: bucket.clone(),
            key: key.clone(),
            size_bytes: metadata.len(),
            etag,
            media_type: infer::get(&sniff).map(|kind| kind.mime_type().to_owned()),
            last_modified,
        })
    }

    fn get(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(bucket, key))
            }
            Err(e) => Err(StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read object from {}: {}", path.display(), e),
            ))),
        }
    }

    fn put(&self, bucket: &BucketName, key: &ObjectKey, body: &[u8]) -> StoreResult<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        self.write_atomically(&path, body)?;
        tracing::debug!(%bucket, %key, size = body.len(), "object written");
        Ok(ObjectMeta::describe(bucket, key, body, Utc::now()))
    }

    fn put_if_match(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: &[u8],
        expected_etag: &str,
    ) -> StoreResult<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        let actual = self.current_etag(&path)?;
        if actual.as_deref() != Some(expected_etag) {
            return Err(StoreError::PreconditionFailed {
                bucket: bucket.clone(),
                key: key.clone(),
                expected: expected_etag.to_owned(),
                actual,
            });
        }
        self.put(bucket, key, body)
    }

    fn copy(
        &self,
        source_bucket: &BucketName,
        source_key: &ObjectKey,
        target_bucket: &BucketName,
        target_key: &ObjectKey,
    ) -> StoreResult<ObjectMeta> {
        let source = self.object_path(source_bucket, source_key)?;
        if !source.is_file() {
            return Err(Self::not_found(source_bucket, source_key));
        }
        let target = self.object_path(target_bucket, target_key)?;
        let mut reader = fs::File::open(&source)?;
        self.stage_and_persist(&target, |staged| std::io::copy(&mut reader, staged).map(|_| ()))
            .map_err(|e| match e {
                StoreError::Io(e) => StoreError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to copy {} to {}: {}",
                        source.display(),
                        target.display(),
                        e
                    ),
                )),
                other => other,
            })?;
        self.head(target_bucket, target_key)
    }
}
