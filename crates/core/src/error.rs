use callmeta_store::StoreError;
use callmeta_types::{BucketName, KeyError, ObjectKey};

/// Coarse classification of fatal failures.
///
/// Callers use this to pick a response (HTTP status, exit code, orchestrator retry) without
/// matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    /// A required object never became readable within its wait budget.
    MissingDependency,
    /// The input can never succeed as given; retrying is pointless.
    MalformedInput,
    /// A conditional write lost a race with another writer.
    Conflict,
    /// Configuration, scratch I/O or storage backend trouble.
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("call record is not well-formed XML: {0}")]
    MalformedRecord(String),
    #[error("call record has no call identifier (id)")]
    MissingCallGuid,
    #[error("document {bucket}/{key} is not valid JSON: {source}")]
    MalformedDocument {
        bucket: BucketName,
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("interim result document {bucket}/{key} is not a JSON object")]
    InterimNotObject { bucket: BucketName, key: ObjectKey },

    #[error(
        "error getting object {key} from bucket {bucket}; make sure it exists and the store is reachable"
    )]
    SourceMissing { bucket: BucketName, key: ObjectKey },
    #[error("object {bucket}/{key} not found after {attempts} attempt(s) in {wait_seconds} seconds")]
    WaitTimedOut {
        bucket: BucketName,
        key: ObjectKey,
        attempts: u32,
        wait_seconds: u64,
    },

    #[error("failed to serialize XML: {0}")]
    XmlSerialization(String),
    #[error("failed to serialize JSON: {0}")]
    JsonSerialization(serde_json::Error),
    #[error("failed to create scratch directory: {0}")]
    ScratchDirCreation(std::io::Error),
    #[error("failed to write scratch file: {0}")]
    ScratchWrite(std::io::Error),
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("invalid storage address: {0}")]
    Key(#[from] KeyError),
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::SourceMissing { .. } | PipelineError::WaitTimedOut { .. } => {
                FailureClass::MissingDependency
            }
            PipelineError::Store(StoreError::NotFound { .. }) => FailureClass::MissingDependency,
            PipelineError::InvalidEvent(_)
            | PipelineError::MalformedRecord(_)
            | PipelineError::MissingCallGuid
            | PipelineError::MalformedDocument { .. }
            | PipelineError::InterimNotObject { .. }
            | PipelineError::Key(_) => FailureClass::MalformedInput,
            PipelineError::Store(StoreError::PreconditionFailed { .. }) => FailureClass::Conflict,
            PipelineError::InvalidConfig(_)
            | PipelineError::XmlSerialization(_)
            | PipelineError::JsonSerialization(_)
            | PipelineError::ScratchDirCreation(_)
            | PipelineError::ScratchWrite(_)
            | PipelineError::ConfigRead(_)
            | PipelineError::YamlDeserialization(_)
            | PipelineError::Store(_) => FailureClass::Infrastructure,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
