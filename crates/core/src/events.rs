//! Trigger events and stage results.
//!
//! Events arrive as loosely-typed JSON from the orchestrator or from object-store notifications.
//! Parsing goes through `serde_path_to_error` so a rejected event names the offending field.

use crate::artifacts::ArtifactSet;
use crate::{PipelineError, PipelineResult};
use callmeta_types::{BucketName, ObjectKey};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

fn parse_value<T: DeserializeOwned>(value: &Value) -> PipelineResult<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        PipelineError::InvalidEvent(format!("{path}: {}", e.into_inner()))
    })
}

/// Stage-1 trigger: a new metadata object at `bucket/objectKey`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PreloadEvent {
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "telephony-drop"))]
    pub bucket: BucketName,
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "incoming/3f2c-77aa.xml"))]
    pub object_key: ObjectKey,
}

#[derive(serde::Deserialize)]
struct Notification {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(serde::Deserialize)]
struct NotificationRecord {
    s3: NotificationEntity,
}

#[derive(serde::Deserialize)]
struct NotificationEntity {
    bucket: NotificationBucket,
    object: NotificationObject,
}

#[derive(serde::Deserialize)]
struct NotificationBucket {
    name: String,
}

#[derive(serde::Deserialize)]
struct NotificationObject {
    key: String,
}

/// Decode an object key as it appears in store notifications: `+` is a space, then
/// percent-escapes are expanded.
pub fn decode_notification_key(raw: &str) -> PipelineResult<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| PipelineError::InvalidEvent(format!("object key is not valid UTF-8: {e}")))
}

impl PreloadEvent {
    pub fn new(bucket: BucketName, object_key: ObjectKey) -> Self {
        Self { bucket, object_key }
    }

    /// Accepts either `{bucket, objectKey}` or a store notification envelope
    /// (`{"Records":[{"s3":{"bucket":{"name"},"object":{"key"}}}]}`), taking the first record.
    pub fn from_value(value: &Value) -> PipelineResult<Self> {
        if value.get("Records").is_none() {
            return parse_value(value);
        }

        let notification: Notification = parse_value(value)?;
        let record = notification
            .records
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::InvalidEvent("Records: empty notification".into()))?;

        let key = decode_notification_key(&record.s3.object.key)?;
        Ok(Self {
            bucket: BucketName::parse(&record.s3.bucket.name)?,
            object_key: ObjectKey::parse(key)?,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> PipelineResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidEvent(e.to_string()))?;
        Self::from_value(&value)
    }
}

/// Artifact names reported by stage 1: the full set, or `{}` when the object was skipped.
///
/// `localPath` in a reported set names the already-removed scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FileNames {
    Set(ArtifactSet),
    Empty {},
}

impl FileNames {
    pub fn artifact_set(&self) -> Option<&ArtifactSet> {
        match self {
            FileNames::Set(set) => Some(set),
            FileNames::Empty {} => None,
        }
    }
}

/// Stage-1 result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PreloadOutcome {
    pub status_code: u16,
    pub body: String,
    pub bucket: String,
    pub key: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub file_names: FileNames,
}

impl PreloadOutcome {
    pub fn is_skipped(&self) -> bool {
        self.file_names.artifact_set().is_none()
    }
}

/// Required fields of a stage-2 trigger.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// Pipeline key of the call; its `.json` sibling in the ingest bucket is the metadata.
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "originalAudio/Mitel_GUID_3f2c_AGENT_Agent-x1_CUSTOMER_1_ORG_Unknown_orig.wav"))]
    pub key: ObjectKey,
    /// Interim result document in the output bucket.
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "interim/job-7.json"))]
    pub interim_results_file: ObjectKey,
}

/// Stage-2 trigger. Keeps the whole orchestrator document so it can be handed back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeEvent {
    request: MergeRequest,
    document: Map<String, Value>,
}

impl MergeEvent {
    pub fn from_value(value: Value) -> PipelineResult<Self> {
        let request = parse_value(&value)?;
        match value {
            Value::Object(document) => Ok(Self { request, document }),
            _ => Err(PipelineError::InvalidEvent(
                "merge event must be a JSON object".into(),
            )),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> PipelineResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidEvent(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn key(&self) -> &ObjectKey {
        &self.request.key
    }

    pub fn interim_results_file(&self) -> &ObjectKey {
        &self.request.interim_results_file
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.document)
    }
}

impl serde::Serialize for MergeEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.document.serialize(serializer)
    }
}
