use callmeta_types::{BucketName, ObjectKey};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Metadata for a stored object
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub bucket: BucketName,

    pub key: ObjectKey,

    /// Size of the object in bytes
    pub size_bytes: u64,

    /// Lowercase hex SHA-256 of the body
    pub etag: String,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort sniffing of the leading bytes; `None` for plain text formats such as XML and
    /// JSON that carry no magic number.
    pub media_type: Option<String>,

    /// UTC timestamp of the last write
    pub last_modified: DateTime<Utc>,
}

impl ObjectMeta {
    pub(crate) fn describe(
        bucket: &BucketName,
        key: &ObjectKey,
        body: &[u8],
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            bucket: bucket.clone(),
            key: key.clone(),
            size_bytes: body.len() as u64,
            etag: etag_for(body),
            media_type: infer::get(body).map(|kind| kind.mime_type().to_owned()),
            last_modified,
        }
    }
}

/// Computes the etag of a body.
pub fn etag_for(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
