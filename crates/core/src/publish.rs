//! Handoff of staged artifacts into the ingestion area.

use crate::artifacts::ArtifactSet;
use crate::PipelineResult;
use callmeta_store::{ObjectMeta, ObjectStore};
use callmeta_types::{BucketName, ObjectKey};

/// Objects written by one handoff.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifacts {
    pub json: ObjectMeta,
    pub xml: ObjectMeta,
    pub audio: ObjectMeta,
}

/// Publishes a call's artifacts to `<ingest bucket>/<prefix>/<filename>`.
#[derive(Debug)]
pub struct HandoffPublisher<'a> {
    store: &'a dyn ObjectStore,
    ingest_bucket: &'a BucketName,
    prefix: &'a str,
}

impl<'a> HandoffPublisher<'a> {
    pub fn new(store: &'a dyn ObjectStore, ingest_bucket: &'a BucketName, prefix: &'a str) -> Self {
        Self {
            store,
            ingest_bucket,
            prefix,
        }
    }

    /// Ingestion-area key for `file_name`.
    pub fn target_key(&self, file_name: &str) -> PipelineResult<ObjectKey> {
        Ok(ObjectKey::under_prefix(self.prefix, file_name)?)
    }

    /// Upload the JSON, then the XML, then copy the source audio under its canonical name.
    ///
    /// The audio copy is only attempted once both metadata uploads have succeeded. A failure at
    /// any step aborts the handoff; earlier writes are left in place.
    pub fn publish(
        &self,
        set: &ArtifactSet,
        audio_bucket: &BucketName,
        audio_key: &ObjectKey,
    ) -> PipelineResult<PublishedArtifacts> {
        let json_key = self.target_key(&set.json_filename)?;
        let xml_key = self.target_key(&set.xml_filename)?;
        let audio_target = self.target_key(&set.audio_filename)?;

        let json = self
            .store
            .upload_file(&set.json_path(), self.ingest_bucket, &json_key)?;
        tracing::info!(bucket = %self.ingest_bucket, key = %json_key, "uploaded normalized metadata");

        let xml = self
            .store
            .upload_file(&set.xml_path(), self.ingest_bucket, &xml_key)?;
        tracing::info!(bucket = %self.ingest_bucket, key = %xml_key, "uploaded canonical record");

        let audio = self
            .store
            .copy(audio_bucket, audio_key, self.ingest_bucket, &audio_target)?;
        tracing::info!(
            source = %format!("{audio_bucket}/{audio_key}"),
            bucket = %self.ingest_bucket,
            key = %audio_target,
            "copied call audio"
        );

        Ok(PublishedArtifacts { json, xml, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use callmeta_store::{MemoryObjectStore, StoreError, StoreResult};
    use std::fs;
    use tempfile::TempDir;

    /// Memory store that refuses writes to keys with a given extension.
    #[derive(Debug)]
    struct RejectingStore {
        inner: MemoryObjectStore,
        reject_extension: &'static str,
    }

    impl ObjectStore for RejectingStore {
        fn head(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<ObjectMeta> {
            self.inner.head(bucket, key)
        }

        fn get(&self, bucket: &BucketName, key: &ObjectKey) -> StoreResult<Vec<u8>> {
            self.inner.get(bucket, key)
        }

        fn put(&self, bucket: &BucketName, key: &ObjectKey, body: &[u8]) -> StoreResult<ObjectMeta> {
            if key.as_str().ends_with(self.reject_extension) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(bucket, key, body)
        }

        fn put_if_match(
            &self,
            bucket: &BucketName,
            key: &ObjectKey,
            body: &[u8],
            expected_etag: &str,
        ) -> StoreResult<ObjectMeta> {
            self.inner.put_if_match(bucket, key, body, expected_etag)
        }
    }

    struct Fixture {
        _scratch: TempDir,
        set: ArtifactSet,
        preload: BucketName,
        ingest: BucketName,
        audio_key: ObjectKey,
    }

    fn fixture(store: &dyn ObjectStore) -> Fixture {
        let scratch = TempDir::new().unwrap();
        let set = ArtifactSet {
            audio_filename: "Base_orig.wav".into(),
            json_filename: "Base_orig.json".into(),
            xml_filename: "Base_orig.xml".into(),
            local_path: scratch.path().to_path_buf(),
        };
        fs::write(set.json_path(), br#"{"recording":{}}"#).unwrap();
        fs::write(set.xml_path(), b"<recording/>").unwrap();

        let preload = BucketName::parse("preload").unwrap();
        let audio_key = ObjectKey::parse("drop/call-1.wav").unwrap();
        store.put(&preload, &audio_key, b"RIFFdata").unwrap();

        Fixture {
            _scratch: scratch,
            set,
            preload,
            ingest: BucketName::parse("ingest").unwrap(),
            audio_key,
        }
    }

    #[test]
    fn publishes_three_objects_under_prefix() {
        let store = MemoryObjectStore::new();
        let f = fixture(&store);

        let published = HandoffPublisher::new(&store, &f.ingest, "originalAudio")
            .publish(&f.set, &f.preload, &f.audio_key)
            .unwrap();

        assert_eq!(published.json.key.as_str(), "originalAudio/Base_orig.json");
        assert_eq!(published.xml.key.as_str(), "originalAudio/Base_orig.xml");
        assert_eq!(published.audio.key.as_str(), "originalAudio/Base_orig.wav");

        let copied = store
            .get(&f.ingest, &ObjectKey::parse("originalAudio/Base_orig.wav").unwrap())
            .unwrap();
        assert_eq!(copied, b"RIFFdata");
        // Copy, not move.
        assert!(store.exists(&f.preload, &f.audio_key).unwrap());
    }

    #[test]
    fn failed_xml_upload_skips_audio_copy() {
        let store = RejectingStore {
            inner: MemoryObjectStore::new(),
            reject_extension: ".xml",
        };
        let f = fixture(&store);

        let err = HandoffPublisher::new(&store, &f.ingest, "originalAudio")
            .publish(&f.set, &f.preload, &f.audio_key)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Store(StoreError::Io(_))));
        let ingest_keys = store.inner.keys(&f.ingest);
        assert_eq!(
            ingest_keys
                .iter()
                .map(ObjectKey::as_str)
                .collect::<Vec<_>>(),
            vec!["originalAudio/Base_orig.json"]
        );
    }

    #[test]
    fn blank_prefix_publishes_at_bucket_root() {
        let store = MemoryObjectStore::new();
        let f = fixture(&store);

        let published = HandoffPublisher::new(&store, &f.ingest, "")
            .publish(&f.set, &f.preload, &f.audio_key)
            .unwrap();
        assert_eq!(published.audio.key.as_str(), "Base_orig.wav");
    }
}
