//! Staging of normalized artifacts in per-invocation scratch space.

use crate::constants::SCRATCH_DIR_PREFIX;
use crate::naming::ArtifactNames;
use crate::record::CallRecord;
use crate::{PipelineError, PipelineResult};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The staged artifacts of one call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSet {
    pub audio_filename: String,
    pub json_filename: String,
    pub xml_filename: String,
    /// Scratch directory the JSON and XML files were staged in.
    ///
    /// The directory belongs to one invocation and is removed once publishing finishes, so in a
    /// reported stage-1 result this path is informational only and no longer exists.
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub local_path: PathBuf,
}

impl ArtifactSet {
    pub fn json_path(&self) -> PathBuf {
        self.local_path.join(&self.json_filename)
    }

    pub fn xml_path(&self) -> PathBuf {
        self.local_path.join(&self.xml_filename)
    }
}

/// Create a scratch directory for one invocation, under `root` or the system temp directory.
///
/// The directory and everything in it is removed when the returned guard is dropped.
pub fn scratch_dir(root: Option<&Path>) -> PipelineResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_DIR_PREFIX);
    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };
    dir.map_err(PipelineError::ScratchDirCreation)
}

/// Serializes an enriched record into its JSON and XML artifacts.
#[derive(Debug)]
pub struct ArtifactWriter<'a> {
    directory: &'a Path,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(directory: &'a Path) -> Self {
        Self { directory }
    }

    /// Write `<names.json>` and `<names.xml>` into the scratch directory.
    ///
    /// # Errors
    ///
    /// Serialization failures and file write failures are both fatal.
    pub fn write(&self, record: &CallRecord, names: &ArtifactNames) -> PipelineResult<ArtifactSet> {
        let json = serde_json::to_vec(&record.to_json()).map_err(PipelineError::JsonSerialization)?;
        let xml = record.to_xml()?;

        let set = ArtifactSet {
            audio_filename: names.audio.clone(),
            json_filename: names.json.clone(),
            xml_filename: names.xml.clone(),
            local_path: self.directory.to_path_buf(),
        };

        fs::write(set.json_path(), json).map_err(PipelineError::ScratchWrite)?;
        fs::write(set.xml_path(), xml).map_err(PipelineError::ScratchWrite)?;

        tracing::info!(
            json = %set.json_filename,
            xml = %set.xml_filename,
            directory = %self.directory.display(),
            "staged normalized artifacts"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FieldExtractor;

    fn enriched_record() -> (CallRecord, ArtifactNames) {
        let mut record = CallRecord::parse(
            br#"<recording><id>g-1</id><employee><firstName>Ada</firstName><lastName>King</lastName></employee></recording>"#,
        )
        .unwrap();
        let summary = FieldExtractor::new(chrono_tz::UTC)
            .summarize(&mut record)
            .unwrap();
        (record, ArtifactNames::derive(&summary))
    }

    #[test]
    fn writes_both_documents_under_canonical_names() {
        let temp_dir = TempDir::new().unwrap();
        let (record, names) = enriched_record();

        let set = ArtifactWriter::new(temp_dir.path())
            .write(&record, &names)
            .unwrap();

        assert_eq!(set.audio_filename, names.audio);
        assert_eq!(set.local_path, temp_dir.path());

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(set.json_path()).unwrap()).unwrap();
        assert_eq!(json["recording"]["id"], "g-1");
        assert_eq!(json["recording"]["callSummary"]["agentName"], "Ada King");

        let xml = fs::read(set.xml_path()).unwrap();
        let reparsed = CallRecord::parse(&xml).unwrap();
        assert_eq!(reparsed, record);
    }

    #[test]
    fn missing_directory_is_a_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let gone = temp_dir.path().join("gone");
        let (record, names) = enriched_record();

        let err = ArtifactWriter::new(&gone).write(&record, &names).unwrap_err();
        assert!(matches!(err, PipelineError::ScratchWrite(_)));
    }

    #[test]
    fn scratch_dir_is_created_under_root_and_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let path = {
            let scratch = scratch_dir(Some(root.path())).unwrap();
            let path = scratch.path().to_path_buf();
            assert!(path.starts_with(root.path()));
            assert!(path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SCRATCH_DIR_PREFIX));
            path
        };
        assert!(!path.exists());
    }
}
