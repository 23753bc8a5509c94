//! Bucket and object-key addressing.

use std::fmt;

/// Errors raised when a bucket name or object key fails validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    /// Bucket names must be non-empty and must not contain separators
    #[error("invalid bucket name: {0:?}")]
    InvalidBucket(String),

    /// Object keys must be relative, `/`-separated and free of traversal segments
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A folder marker has no file component to rename
    #[error("object key {0:?} is a folder marker and has no file name")]
    FolderMarker(String),
}

/// Name of a bucket in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketName(String);

impl BucketName {
    /// Validates a bucket name.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidBucket`] if the name is blank, contains `/`, `\` or NUL, or is
    /// one of the relative directory names `.` / `..`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, KeyError> {
        let name = input.as_ref().trim();
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(KeyError::InvalidBucket(input.as_ref().to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key of an object within a bucket.
///
/// Keys are relative and `/`-separated. A key that ends in `/` is a folder marker: it is a valid
/// key (folder-creation notifications carry one) but it has an empty [`file_name`].
///
/// [`file_name`]: ObjectKey::file_name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validates an object key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] for empty keys, absolute keys, backslashes or NUL bytes,
    /// and keys with empty (`a//b`), `.` or `..` segments.
    pub fn parse(input: impl Into<String>) -> Result<Self, KeyError> {
        let key = input.into();
        let reject = |reason| KeyError::InvalidKey {
            key: key.clone(),
            reason,
        };

        if key.is_empty() {
            return Err(reject("key is empty"));
        }
        if key.starts_with('/') {
            return Err(reject("key must be relative"));
        }
        if key.contains(['\\', '\0']) {
            return Err(reject("key contains a backslash or NUL byte"));
        }

        let body = key.strip_suffix('/').unwrap_or(&key);
        for segment in body.split('/') {
            match segment {
                "" => return Err(reject("key contains an empty segment")),
                "." | ".." => return Err(reject("key contains a relative segment")),
                _ => {}
            }
        }

        Ok(Self(key))
    }

    /// Builds `<prefix>/<file_name>`, or just `<file_name>` when the prefix is blank.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] if the combined key fails validation.
    pub fn under_prefix(prefix: &str, file_name: &str) -> Result<Self, KeyError> {
        let prefix = prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            Self::parse(file_name)
        } else {
            Self::parse(format!("{prefix}/{file_name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment; empty for folder markers.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_folder_marker(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Non-empty path segments in order, file name last.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Returns a sibling key whose file extension is replaced by `extension`.
    ///
    /// A file name without an extension (or whose only dot is leading, like `.env`) gets
    /// `extension` appended.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::FolderMarker`] for folder markers.
    pub fn with_extension(&self, extension: &str) -> Result<Self, KeyError> {
        if self.is_folder_marker() {
            return Err(KeyError::FolderMarker(self.0.clone()));
        }

        let file_name = self.file_name();
        let dir = &self.0[..self.0.len() - file_name.len()];
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };
        let extension = extension.trim_start_matches('.');

        Self::parse(format!("{dir}{stem}.{extension}"))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ObjectKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectKey::parse(s).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for BucketName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for BucketName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BucketName::parse(s).map_err(serde::de::Error::custom)
    }
}
