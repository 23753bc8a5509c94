//! In-memory object store.

use crate::{ObjectMeta, ObjectStore, StoreError, StoreResult};
use callmeta_types::{BucketName, KeyError, ObjectKey};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store that keeps every object in a process-local map.
///
/// Writes are counted so callers can assert that an operation touched storage (or did not).
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(BucketName, ObjectKey), StoredObject>>,
    writes: Mutex<u64>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put`/`copy` calls so far.
    pub fn write_count(&self) -> u64 {
        *lock(&self.writes)
    }

    /// All keys currently stored in `bucket`, in lexical order.
    pub fn keys(&self, bucket: &BucketName) -> Vec<ObjectKey> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn record_write(&self) {
        *lock(&self.writes) += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn reject_folder_marker(key: &ObjectKey) -> StoreResult<()> {
    if key.is_folder_marker() {
        return Err(KeyError::FolderMarker(key.to_string()).into());
    }
    Ok(())
}

impl ObjectStore for MemoryObjectStore {
    fn head(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<ObjectMeta> {
        let objects = lock(&self.objects);
        let stored = objects
            .get(&(bucket.clone(), key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.clone(),
                key: key.clone(),
            })?;
        Ok(ObjectMeta::describe(
            bucket,
            key,
            &stored.body,
            stored.last_modified,
        ))
    }

    fn get(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.clone(), key.clone()))
            .map(|stored| stored.body.clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.clone(),
                key: key.clone(),
            })
    }

    fn put(&self, bucket: &BucketName, key: &ObjectKey, body: &[u8]) -> StoreResult<ObjectMeta> {
        reject_folder_marker(key)?;
        let last_modified = Utc::now();
        lock(&self.objects).insert(
            (bucket.clone(), key.clone()),
            StoredObject {
                body: body.to_vec(),
                last_modified,
            },
        );
        self.record_write();
        Ok(ObjectMeta::describe(bucket, key, body, last_modified))
    }

    fn put_if_match(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: &[u8],
        expected_etag: &str,
    ) -> StoreResult<ObjectMeta> {
        reject_folder_marker(key)?;
        let mut objects = lock(&self.objects);
        let address = (bucket.clone(), key.clone());
        let actual = objects
            .get(&address)
            .map(|stored| crate::etag_for(&stored.body));
        if actual.as_deref() != Some(expected_etag) {
            return Err(StoreError::PreconditionFailed {
                bucket: bucket.clone(),
                key: key.clone(),
                expected: expected_etag.to_owned(),
                actual,
            });
        }

        let last_modified = Utc::now();
        objects.insert(
            address,
            StoredObject {
                body: body.to_vec(),
                last_modified,
            },
        );
        drop(objects);
        self.record_write();
        Ok(ObjectMeta::describe(bucket, key, body, last_modified))
    }
}
