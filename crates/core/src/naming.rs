//! Canonical artifact filenames.
//!
//! One call produces three artifacts (audio, normalized JSON, canonical XML) whose names share a
//! single base. The base is the handoff key downstream consumers use to pair the artifacts, so
//! it must be a pure function of the summary.

use crate::constants::{
    AUDIO_EXTENSION, FILENAME_ORIGINAL_TAG, FILENAME_VENDOR_TAG, JSON_EXTENSION, XML_EXTENSION,
};
use crate::extract::CallSummary;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static DISALLOWED: OnceLock<Regex> = OnceLock::new();

fn disallowed() -> &'static Regex {
    DISALLOWED.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern is valid"))
}

/// Strip everything except ASCII letters, digits and underscore.
pub fn sanitize(input: &str) -> String {
    disallowed().replace_all(input, "").into_owned()
}

/// Filename stem shared by a call's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBaseName(String);

impl CanonicalBaseName {
    /// Compose the base name. Agent and organization are sanitized; guid, extension and caller
    /// number are embedded as given.
    pub fn derive(summary: &CallSummary) -> Self {
        Self(format!(
            "{vendor}_GUID_{guid}_AGENT_{agent}-x{extension}_CUSTOMER_{caller}_ORG_{org}_{orig}",
            vendor = FILENAME_VENDOR_TAG,
            guid = summary.call_guid,
            agent = sanitize(summary.agent_name.as_str()),
            extension = summary.agent_extension,
            caller = summary.caller_number,
            org = sanitize(summary.organization.as_str()),
            orig = FILENAME_ORIGINAL_TAG,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<base>.<extension>`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for CanonicalBaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three canonical filenames of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub base: CanonicalBaseName,
    pub audio: String,
    pub json: String,
    pub xml: String,
}

impl ArtifactNames {
    pub fn derive(summary: &CallSummary) -> Self {
        let base = CanonicalBaseName::derive(summary);
        Self {
            audio: base.file_name(AUDIO_EXTENSION),
            json: base.file_name(JSON_EXTENSION),
            xml: base.file_name(XML_EXTENSION),
            base,
        }
    }
}
