//! Stage 1: normalize a new call record and hand it off.

use crate::artifacts::{scratch_dir, ArtifactWriter};
use crate::config::PipelineConfig;
use crate::constants::{AUDIO_EXTENSION, STAGE_ONE_STATUS_CODE};
use crate::events::{FileNames, PreloadEvent, PreloadOutcome};
use crate::extract::FieldExtractor;
use crate::naming::ArtifactNames;
use crate::poll::{CompanionWaiter, Sleeper};
use crate::publish::HandoffPublisher;
use crate::record::CallRecord;
use crate::{PipelineError, PipelineResult};
use callmeta_store::ObjectStore;

/// Why a preload event was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    FolderMarker,
    PatternMismatch,
}

/// Runs stage 1 for one event.
#[derive(Debug)]
pub struct PreloadHandler<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn ObjectStore,
    sleeper: &'a dyn Sleeper,
}

impl<'a> PreloadHandler<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a dyn ObjectStore,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            store,
            sleeper,
        }
    }

    /// Whether `event` is outside stage 1's remit.
    pub fn skip_reason(&self, event: &PreloadEvent) -> Option<SkipReason> {
        let file_name = event.object_key.file_name();
        if file_name.is_empty() {
            Some(SkipReason::FolderMarker)
        } else if !self.config.preload_key_pattern().is_match(file_name) {
            Some(SkipReason::PatternMismatch)
        } else {
            None
        }
    }

    /// Normalize the record named by `event`, wait for its audio, and publish all three
    /// artifacts.
    ///
    /// Skipped events produce an outcome with empty file names and touch nothing.
    pub fn handle(&self, event: &PreloadEvent) -> PipelineResult<PreloadOutcome> {
        let bucket = &event.bucket;
        let key = &event.object_key;

        if let Some(reason) = self.skip_reason(event) {
            let body = match reason {
                SkipReason::FolderMarker => {
                    format!("Folder creation event at '{key}', no object to process")
                }
                SkipReason::PatternMismatch => format!(
                    "Object key '{key}' does not match the preload key pattern '{}'. Skipping.",
                    self.config.preload_key_pattern()
                ),
            };
            tracing::warn!(%bucket, %key, ?reason, "{body}");
            return Ok(outcome(event, body, FileNames::Empty {}));
        }

        match self.store.exists(bucket, key) {
            Ok(true) => {}
            Ok(false) => return Err(source_missing(event)),
            Err(e) => {
                tracing::error!(%bucket, %key, error = %e, "source metadata check failed");
                return Err(source_missing(event));
            }
        }

        let audio_key = key.with_extension(AUDIO_EXTENSION)?;
        CompanionWaiter::new(self.store, self.sleeper, self.config.poll())
            .wait_for(bucket, &audio_key)?;

        let mut record = CallRecord::parse(&self.store.get(bucket, key)?)?;
        let summary = FieldExtractor::new(self.config.display_timezone()).summarize(&mut record)?;
        tracing::info!(
            call_guid = %summary.call_guid,
            agent = %summary.agent_name,
            extension = %summary.agent_extension,
            direction = %summary.call_direction,
            caller = %summary.caller_number,
            organization = %summary.organization,
            start = %summary.start_time,
            end = %summary.end_time,
            "call summary extracted"
        );

        let names = ArtifactNames::derive(&summary);
        let scratch = scratch_dir(self.config.scratch_root())?;
        let set = ArtifactWriter::new(scratch.path()).write(&record, &names)?;

        HandoffPublisher::new(
            self.store,
            self.config.ingest_bucket(),
            self.config.raw_audio_prefix(),
        )
        .publish(&set, bucket, &audio_key)?;

        let body = format!(
            "s3://{bucket}/{key} pushed to {}/{}",
            self.config.ingest_bucket(),
            self.config.raw_audio_prefix()
        );
        tracing::info!(%bucket, %key, base = %names.base, "{body}");
        Ok(outcome(event, body, FileNames::Set(set)))
    }
}

fn outcome(event: &PreloadEvent, body: String, file_names: FileNames) -> PreloadOutcome {
    PreloadOutcome {
        status_code: STAGE_ONE_STATUS_CODE,
        body,
        bucket: event.bucket.to_string(),
        key: event.object_key.to_string(),
        file_names,
    }
}

fn source_missing(event: &PreloadEvent) -> PipelineError {
    PipelineError::SourceMissing {
        bucket: event.bucket.clone(),
        key: event.object_key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::poll::{PollPolicy, ThreadSleeper};
    use callmeta_store::MemoryObjectStore;
    use callmeta_types::{BucketName, ObjectKey};
    use tempfile::TempDir;

    const RECORD: &[u8] = br#"<recording>
  <id>3f2c-77aa</id>
  <callerNumber>15551234567</callerNumber>
  <employee><firstName>Grace</firstName><lastName>Hopper</lastName><phoneNumber>4021</phoneNumber></employee>
</recording>"#;

    fn config(scratch: &TempDir) -> PipelineConfig {
        PipelineConfig::new(PipelineSettings {
            ingest_bucket: "ingest".into(),
            output_bucket: "output".into(),
            scratch_root: Some(scratch.path().to_path_buf()),
            ..PipelineSettings::default()
        })
        .unwrap()
        .with_poll(PollPolicy::new(1, 1).unwrap())
    }

    fn event(key: &str) -> PreloadEvent {
        PreloadEvent::new(
            BucketName::parse("drop").unwrap(),
            ObjectKey::parse(key).unwrap(),
        )
    }

    #[test]
    fn pattern_mismatch_is_skipped_without_side_effects() {
        let scratch = TempDir::new().unwrap();
        let config = config(&scratch);
        let store = MemoryObjectStore::new();

        let outcome = PreloadHandler::new(&config, &store, &ThreadSleeper)
            .handle(&event("notes/readme.txt"))
            .unwrap();

        assert_eq!(outcome.status_code, 200);
        assert!(outcome.is_skipped());
        assert!(outcome.body.contains("does not match"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn folder_marker_is_skipped() {
        let scratch = TempDir::new().unwrap();
        let config = config(&scratch);
        let store = MemoryObjectStore::new();

        let outcome = PreloadHandler::new(&config, &store, &ThreadSleeper)
            .handle(&event("incoming/"))
            .unwrap();

        assert!(outcome.is_skipped());
        assert!(outcome.body.starts_with("Folder creation event"));
    }

    #[test]
    fn missing_source_fails_before_waiting() {
        let scratch = TempDir::new().unwrap();
        let config = config(&scratch);
        let store = MemoryObjectStore::new();

        let err = PreloadHandler::new(&config, &store, &ThreadSleeper)
            .handle(&event("in/call.xml"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceMissing { .. }));
    }

    #[test]
    fn missing_audio_times_out_without_publishing() {
        let scratch = TempDir::new().unwrap();
        let config = config(&scratch);
        let store = MemoryObjectStore::new();
        let ev = event("in/call.xml");
        store.put(&ev.bucket, &ev.object_key, RECORD).unwrap();

        let err = PreloadHandler::new(&config, &store, &ThreadSleeper)
            .handle(&ev)
            .unwrap_err();

        assert!(matches!(err, PipelineError::WaitTimedOut { .. }));
        assert!(store.keys(config.ingest_bucket()).is_empty());
    }

    #[test]
    fn publishes_artifacts_and_reports_removed_scratch_path() {
        let scratch = TempDir::new().unwrap();
        let config = config(&scratch);
        let store = MemoryObjectStore::new();
        let ev = event("in/call.XML");
        store.put(&ev.bucket, &ev.object_key, RECORD).unwrap();
        store
            .put(&ev.bucket, &ObjectKey::parse("in/call.wav").unwrap(), b"RIFF")
            .unwrap();

        let outcome = PreloadHandler::new(&config, &store, &ThreadSleeper)
            .handle(&ev)
            .unwrap();

        let base = "Mitel_GUID_3f2c-77aa_AGENT_GraceHopper-x4021_CUSTOMER_15551234567_ORG_Unknown_orig";
        let set = outcome.file_names.artifact_set().unwrap();
        assert_eq!(set.audio_filename, format!("{base}.wav"));
        assert_eq!(outcome.body, "s3://drop/in/call.XML pushed to ingest/originalAudio");

        let keys: Vec<String> = store
            .keys(config.ingest_bucket())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            keys,
            vec![
                format!("originalAudio/{base}.json"),
                format!("originalAudio/{base}.wav"),
                format!("originalAudio/{base}.xml"),
            ]
        );
        assert!(!set.local_path.exists());
    }
}
