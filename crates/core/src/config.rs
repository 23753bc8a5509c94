//! Pipeline runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the pipeline service.
//! Nothing in this crate reads process-wide environment variables while handling an event; the
//! binaries read the environment (or a YAML file) and hand the result to
//! [`PipelineConfig::new`].
//!
//! Resolution happens in two layers:
//!
//! - [`PipelineSettings`] is the raw, serde-friendly shape. It can come from YAML, from an
//!   environment-style lookup function, or both (lookup values override file values).
//! - [`PipelineConfig`] is the validated form: bucket names are checked, the acceptance regex is
//!   compiled, the poll policy is bounded and the display timezone is a known IANA zone.

use crate::constants::{
    DEFAULT_CHECK_INTERVAL_SECONDS, DEFAULT_DISPLAY_TIMEZONE, DEFAULT_PRELOAD_KEY_REGEX,
    DEFAULT_RAW_AUDIO_PREFIX, DEFAULT_WAIT_SECONDS, ENV_CHECK_INTERVAL_SECONDS,
    ENV_DISPLAY_TIMEZONE, ENV_GUARD_INTERIM_WRITES, ENV_INGEST_BUCKET, ENV_OUTPUT_BUCKET,
    ENV_PRELOAD_KEY_REGEX, ENV_RAW_AUDIO_PREFIX, ENV_SCRATCH_ROOT, ENV_WAIT_SECONDS,
};
use crate::poll::PollPolicy;
use crate::{PipelineError, PipelineResult};
use callmeta_types::{BucketName, ObjectKey};
use chrono_tz::Tz;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Unvalidated pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Bucket receiving the normalized artifacts (and holding them for stage 2).
    pub ingest_bucket: String,
    /// Prefix under which artifacts are written in the ingest bucket.
    pub raw_audio_prefix: String,
    /// Bucket holding interim result documents.
    pub output_bucket: String,
    /// Regex searched against the filename of each preload object key.
    pub preload_key_regex: String,
    pub wait_seconds: u64,
    pub check_interval_seconds: u64,
    /// IANA timezone for displayed call times.
    pub display_timezone: String,
    /// Use an etag-conditional write when overwriting interim result documents.
    pub guard_interim_writes: bool,
    /// Parent directory for per-invocation scratch directories; system temp when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ingest_bucket: String::new(),
            raw_audio_prefix: DEFAULT_RAW_AUDIO_PREFIX.into(),
            output_bucket: String::new(),
            preload_key_regex: DEFAULT_PRELOAD_KEY_REGEX.into(),
            wait_seconds: DEFAULT_WAIT_SECONDS,
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECONDS,
            display_timezone: DEFAULT_DISPLAY_TIMEZONE.into(),
            guard_interim_writes: false,
            scratch_root: None,
        }
    }
}

impl PipelineSettings {
    /// Parse settings from a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(yaml).map_err(PipelineError::YamlDeserialization)
    }

    pub fn from_yaml_file(path: &Path) -> PipelineResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(PipelineError::ConfigRead)?;
        Self::from_yaml_str(&yaml)
    }

    /// Build settings from defaults plus an environment-style lookup.
    ///
    /// Binaries pass `|name| std::env::var(name).ok()`; tests pass a closure over a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        Self::default().with_lookup(lookup)
    }

    /// Override fields for which `lookup` returns a non-blank value.
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = value(ENV_INGEST_BUCKET) {
            self.ingest_bucket = v;
        }
        if let Some(v) = value(ENV_RAW_AUDIO_PREFIX) {
            self.raw_audio_prefix = v;
        }
        if let Some(v) = value(ENV_OUTPUT_BUCKET) {
            self.output_bucket = v;
        }
        if let Some(v) = value(ENV_PRELOAD_KEY_REGEX) {
            self.preload_key_regex = v;
        }
        if let Some(v) = value(ENV_WAIT_SECONDS) {
            self.wait_seconds = parse_seconds(ENV_WAIT_SECONDS, &v)?;
        }
        if let Some(v) = value(ENV_CHECK_INTERVAL_SECONDS) {
            self.check_interval_seconds = parse_seconds(ENV_CHECK_INTERVAL_SECONDS, &v)?;
        }
        if let Some(v) = value(ENV_DISPLAY_TIMEZONE) {
            self.display_timezone = v;
        }
        if let Some(v) = value(ENV_GUARD_INTERIM_WRITES) {
            self.guard_interim_writes = parse_flag(ENV_GUARD_INTERIM_WRITES, &v)?;
        }
        if let Some(v) = value(ENV_SCRATCH_ROOT) {
            self.scratch_root = Some(PathBuf::from(v));
        }

        Ok(self)
    }
}

fn parse_seconds(name: &str, value: &str) -> PipelineResult<u64> {
    value.parse::<u64>().map_err(|_| {
        PipelineError::InvalidConfig(format!(
            "{name} must be a whole number of seconds, got {value:?}"
        ))
    })
}

fn parse_flag(name: &str, value: &str) -> PipelineResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::InvalidConfig(format!(
            "{name} must be true or false, got {value:?}"
        ))),
    }
}

/// Validated pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    ingest_bucket: BucketName,
    raw_audio_prefix: String,
    output_bucket: BucketName,
    preload_key_pattern: Regex,
    poll: PollPolicy,
    display_timezone: Tz,
    guard_interim_writes: bool,
    scratch_root: Option<PathBuf>,
}

impl PipelineConfig {
    /// Validate settings into a `PipelineConfig`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfig` if:
    /// - either bucket name is blank or malformed,
    /// - the artifact prefix cannot form a valid object key,
    /// - the acceptance regex does not compile,
    /// - the check interval is zero,
    /// - the display timezone is not a known IANA zone,
    /// - the scratch root is set but is not an existing directory.
    pub fn new(settings: PipelineSettings) -> PipelineResult<Self> {
        let ingest_bucket = BucketName::parse(&settings.ingest_bucket).map_err(|e| {
            PipelineError::InvalidConfig(format!("ingest_bucket: {e}"))
        })?;
        let output_bucket = BucketName::parse(&settings.output_bucket).map_err(|e| {
            PipelineError::InvalidConfig(format!("output_bucket: {e}"))
        })?;

        ObjectKey::under_prefix(&settings.raw_audio_prefix, "check").map_err(|e| {
            PipelineError::InvalidConfig(format!("raw_audio_prefix: {e}"))
        })?;

        let preload_key_pattern = Regex::new(&settings.preload_key_regex).map_err(|e| {
            PipelineError::InvalidConfig(format!("preload_key_regex: {e}"))
        })?;

        let poll = PollPolicy::new(settings.wait_seconds, settings.check_interval_seconds)?;

        let display_timezone: Tz = settings.display_timezone.parse().map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "display_timezone {:?} is not a known IANA timezone",
                settings.display_timezone
            ))
        })?;

        if let Some(root) = &settings.scratch_root {
            if !root.is_dir() {
                return Err(PipelineError::InvalidConfig(format!(
                    "scratch_root is not a directory: {}",
                    root.display()
                )));
            }
        }

        Ok(Self {
            ingest_bucket,
            raw_audio_prefix: settings.raw_audio_prefix.trim().trim_matches('/').to_string(),
            output_bucket,
            preload_key_pattern,
            poll,
            display_timezone,
            guard_interim_writes: settings.guard_interim_writes,
            scratch_root: settings.scratch_root,
        })
    }

    pub fn ingest_bucket(&self) -> &BucketName {
        &self.ingest_bucket
    }

    pub fn raw_audio_prefix(&self) -> &str {
        &self.raw_audio_prefix
    }

    pub fn output_bucket(&self) -> &BucketName {
        &self.output_bucket
    }

    pub fn preload_key_pattern(&self) -> &Regex {
        &self.preload_key_pattern
    }

    pub fn poll(&self) -> PollPolicy {
        self.poll
    }

    pub fn display_timezone(&self) -> Tz {
        self.display_timezone
    }

    pub fn guard_interim_writes(&self) -> bool {
        self.guard_interim_writes
    }

    pub fn scratch_root(&self) -> Option<&Path> {
        self.scratch_root.as_deref()
    }

    /// Returns a copy with a different poll policy.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            ingest_bucket: "pca-input".into(),
            output_bucket: "pca-output".into(),
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn defaults_validate_once_buckets_are_set() {
        let cfg = PipelineConfig::new(settings()).unwrap();

        assert_eq!(cfg.ingest_bucket().as_str(), "pca-input");
        assert_eq!(cfg.raw_audio_prefix(), "originalAudio");
        assert_eq!(cfg.poll(), PollPolicy::new(120, 20).unwrap());
        assert_eq!(cfg.display_timezone(), chrono_tz::America::New_York);
        assert!(!cfg.guard_interim_writes());
        assert!(cfg.preload_key_pattern().is_match("call-0001.XML"));
    }

    #[test]
    fn missing_bucket_is_rejected() {
        let result = PipelineConfig::new(PipelineSettings::default());
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn bad_regex_timezone_and_interval_are_rejected() {
        let bad_regex = PipelineSettings {
            preload_key_regex: "([".into(),
            ..settings()
        };
        assert!(PipelineConfig::new(bad_regex).is_err());

        let bad_tz = PipelineSettings {
            display_timezone: "Mars/Olympus_Mons".into(),
            ..settings()
        };
        assert!(PipelineConfig::new(bad_tz).is_err());

        let zero_interval = PipelineSettings {
            check_interval_seconds: 0,
            ..settings()
        };
        assert!(PipelineConfig::new(zero_interval).is_err());
    }

    #[test]
    fn scratch_root_must_exist() {
        let temp = tempfile::TempDir::new().unwrap();
        let ok = PipelineSettings {
            scratch_root: Some(temp.path().to_path_buf()),
            ..settings()
        };
        assert_eq!(
            PipelineConfig::new(ok).unwrap().scratch_root(),
            Some(temp.path())
        );

        let missing = PipelineSettings {
            scratch_root: Some(temp.path().join("nope")),
            ..settings()
        };
        assert!(PipelineConfig::new(missing).is_err());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_INGEST_BUCKET, "in"),
            (ENV_OUTPUT_BUCKET, "out"),
            (ENV_WAIT_SECONDS, "40"),
            (ENV_CHECK_INTERVAL_SECONDS, " 20 "),
            (ENV_GUARD_INTERIM_WRITES, "true"),
            (ENV_RAW_AUDIO_PREFIX, ""),
        ]);

        let settings =
            PipelineSettings::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.ingest_bucket, "in");
        assert_eq!(settings.wait_seconds, 40);
        assert_eq!(settings.check_interval_seconds, 20);
        assert!(settings.guard_interim_writes);
        // Blank values do not clobber defaults.
        assert_eq!(settings.raw_audio_prefix, DEFAULT_RAW_AUDIO_PREFIX);
    }

    #[test]
    fn lookup_rejects_non_numeric_seconds() {
        let result = PipelineSettings::from_lookup(|name| {
            (name == ENV_WAIT_SECONDS).then(|| "two minutes".to_string())
        });
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn yaml_settings_fill_defaults() {
        let yaml = "ingest_bucket: pca-input\noutput_bucket: pca-output\ncheck_interval_seconds: 10\n";
        let settings = PipelineSettings::from_yaml_str(yaml).unwrap();

        assert_eq!(settings.check_interval_seconds, 10);
        assert_eq!(settings.wait_seconds, DEFAULT_WAIT_SECONDS);
        assert!(PipelineConfig::new(settings).is_ok());
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        let result = PipelineSettings::from_yaml_str("ingest_buckett: typo\n");
        assert!(matches!(result, Err(PipelineError::YamlDeserialization(_))));
    }
}
