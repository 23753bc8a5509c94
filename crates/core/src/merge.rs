//! Stage 2: merging normalized metadata into an interim result document.

use crate::constants::{JSON_EXTENSION, MERGE_KEY};
use crate::poll::{CompanionWaiter, PollPolicy, Sleeper};
use crate::{PipelineError, PipelineResult};
use callmeta_store::{etag_for, ObjectMeta, ObjectStore};
use callmeta_types::{BucketName, ObjectKey};
use serde_json::{Map, Value};

/// Insert `metadata` under the reserved merge key.
///
/// Every other key of `interim` is left untouched; an earlier merge result is replaced.
pub fn merge_into(interim: &mut Map<String, Value>, metadata: Value) {
    interim.insert(MERGE_KEY.to_owned(), metadata);
}

/// Where one merge reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTarget {
    pub metadata_bucket: BucketName,
    pub metadata_key: ObjectKey,
    pub interim_bucket: BucketName,
    pub interim_key: ObjectKey,
}

impl MergeTarget {
    /// Resolve the metadata document for the pipeline key: same key, `json` extension, ingest
    /// bucket.
    pub fn resolve(
        ingest_bucket: &BucketName,
        output_bucket: &BucketName,
        key: &ObjectKey,
        interim_key: &ObjectKey,
    ) -> PipelineResult<Self> {
        Ok(Self {
            metadata_bucket: ingest_bucket.clone(),
            metadata_key: key.with_extension(JSON_EXTENSION)?,
            interim_bucket: output_bucket.clone(),
            interim_key: interim_key.clone(),
        })
    }
}

/// Loads, merges and persists the interim result document.
#[derive(Debug)]
pub struct MetadataMerger<'a> {
    store: &'a dyn ObjectStore,
    sleeper: &'a dyn Sleeper,
    poll: PollPolicy,
    guard_writes: bool,
}

impl<'a> MetadataMerger<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        sleeper: &'a dyn Sleeper,
        poll: PollPolicy,
        guard_writes: bool,
    ) -> Self {
        Self {
            store,
            sleeper,
            poll,
            guard_writes,
        }
    }

    /// Run the merge for `target`.
    ///
    /// # Errors
    ///
    /// - `WaitTimedOut` if the metadata document never appears.
    /// - `MalformedDocument` / `InterimNotObject` for unparsable or non-object documents.
    /// - `Store(NotFound)` if the interim document is missing.
    /// - `Store(PreconditionFailed)` if guarded writes are on and the document changed meanwhile.
    pub fn merge(&self, target: &MergeTarget) -> PipelineResult<ObjectMeta> {
        tracing::info!(
            metadata = %format!("{}/{}", target.metadata_bucket, target.metadata_key),
            interim = %format!("{}/{}", target.interim_bucket, target.interim_key),
            "merging call metadata"
        );

        CompanionWaiter::new(self.store, self.sleeper, self.poll)
            .wait_for(&target.metadata_bucket, &target.metadata_key)?;

        let metadata = self.read_json(&target.metadata_bucket, &target.metadata_key)?;

        let interim_body = self.store.get(&target.interim_bucket, &target.interim_key)?;
        let mut interim = match parse_json(&interim_body, &target.interim_bucket, &target.interim_key)? {
            Value::Object(map) => map,
            _ => {
                return Err(PipelineError::InterimNotObject {
                    bucket: target.interim_bucket.clone(),
                    key: target.interim_key.clone(),
                })
            }
        };

        merge_into(&mut interim, metadata);
        let merged =
            serde_json::to_vec(&Value::Object(interim)).map_err(PipelineError::JsonSerialization)?;

        let written = if self.guard_writes {
            let expected = etag_for(&interim_body);
            self.store
                .put_if_match(&target.interim_bucket, &target.interim_key, &merged, &expected)?
        } else {
            self.store
                .put(&target.interim_bucket, &target.interim_key, &merged)?
        };

        tracing::info!(
            key = %target.interim_key,
            etag = %written.etag,
            guarded = self.guard_writes,
            "interim result updated"
        );
        Ok(written)
    }

    fn read_json(&self, bucket: &BucketName, key: &ObjectKey) -> PipelineResult<Value> {
        let body = self.store.get(bucket, key)?;
        parse_json(&body, bucket, key)
    }
}

fn parse_json(body: &[u8], bucket: &BucketName, key: &ObjectKey) -> PipelineResult<Value> {
    serde_json::from_slice(body).map_err(|source| PipelineError::MalformedDocument {
        bucket: bucket.clone(),
        key: key.clone(),
        source,
    })
}
