//! Constants used throughout the call metadata core crate.
//!
//! Naming literals, node names, defaults and environment variable names live here so the
//! bit-exact parts of the handoff contract are defined exactly once.

/// Default for agent names when no usable employee node exists.
pub const DEFAULT_AGENT_NAME: &str = "Agent";

/// Default for every other optional summary field.
pub const UNKNOWN: &str = "Unknown";

/// Name of the node injected into the call record holding the summary.
pub const CALL_SUMMARY_NODE: &str = "callSummary";

/// Last name the recorder gives to voicemail pseudo-employees.
pub const VOICEMAIL_LAST_NAME: &str = "Voicemail";

/// Conversation parameter carrying the organization name.
pub const ORGANIZATION_PARAMETER: &str = "Organization";

/// Reserved top-level key under which stage 2 merges the normalized metadata.
pub const MERGE_KEY: &str = "MitelMetadata";

/// Display format for converted call start/end times.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Leading token of every canonical filename.
pub const FILENAME_VENDOR_TAG: &str = "Mitel";

/// Trailing token of every canonical base name.
pub const FILENAME_ORIGINAL_TAG: &str = "orig";

/// Extension of the companion audio object and of the canonical audio filename.
pub const AUDIO_EXTENSION: &str = "wav";

/// Extension of the normalized JSON metadata artifact.
pub const JSON_EXTENSION: &str = "json";

/// Extension of the canonical XML metadata artifact.
pub const XML_EXTENSION: &str = "xml";

/// Default prefix for artifacts in the ingest bucket.
pub const DEFAULT_RAW_AUDIO_PREFIX: &str = "originalAudio";

/// Default acceptance pattern for preload object filenames.
pub const DEFAULT_PRELOAD_KEY_REGEX: &str = r"(?i)\.xml$";

/// Default total wait for a companion or metadata object, in seconds.
pub const DEFAULT_WAIT_SECONDS: u64 = 120;

/// Default pause between existence checks, in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 20;

/// Default IANA timezone for displayed call times.
pub const DEFAULT_DISPLAY_TIMEZONE: &str = "America/New_York";

/// Prefix of per-invocation scratch directories.
pub const SCRATCH_DIR_PREFIX: &str = "callmeta-";

pub const ENV_INGEST_BUCKET: &str = "CALLMETA_INGEST_BUCKET";
pub const ENV_RAW_AUDIO_PREFIX: &str = "CALLMETA_RAW_AUDIO_PREFIX";
pub const ENV_OUTPUT_BUCKET: &str = "CALLMETA_OUTPUT_BUCKET";
pub const ENV_PRELOAD_KEY_REGEX: &str = "CALLMETA_PRELOAD_KEY_REGEX";
pub const ENV_WAIT_SECONDS: &str = "CALLMETA_WAIT_SECONDS";
pub const ENV_CHECK_INTERVAL_SECONDS: &str = "CALLMETA_CHECK_INTERVAL_SECONDS";
pub const ENV_DISPLAY_TIMEZONE: &str = "CALLMETA_DISPLAY_TIMEZONE";
pub const ENV_GUARD_INTERIM_WRITES: &str = "CALLMETA_GUARD_INTERIM_WRITES";
pub const ENV_SCRATCH_ROOT: &str = "CALLMETA_SCRATCH_ROOT";

/// Status code reported in every stage-1 result.
pub const STAGE_ONE_STATUS_CODE: u16 = 200;
