//! # Call Metadata Core
//!
//! Core logic for the call metadata normalization and handoff pipeline.
//!
//! Stage 1 takes a call record dropped by the telephony recorder, derives a flat call summary,
//! names the call's artifacts canonically, stages a JSON and an XML rendering in scratch space,
//! waits for the companion audio and publishes all three to the ingestion area. Stage 2 later
//! merges the normalized metadata into the orchestrator's interim result document.
//!
//! - [`record`]: call record tree, XML parsing and the two renderings
//! - [`extract`]: `FieldExtractor` and the `CallSummary` it produces
//! - [`naming`]: canonical base name and artifact filenames
//! - [`artifacts`]: `ArtifactWriter` and scratch directories
//! - [`poll`]: bounded existence polling (`CompanionWaiter`)
//! - [`publish`]: `HandoffPublisher`
//! - [`merge`]: `MetadataMerger`
//! - [`pipeline`]: `CallPipeline`, the service both binaries drive
//!
//! **No transport concerns**: HTTP routing lives in `api-rest`, argument parsing in `callmeta-cli`.

pub mod artifacts;
pub mod config;
pub mod constants;
pub mod display_time;
pub mod error;
pub mod events;
pub mod extract;
pub mod merge;
pub mod naming;
pub mod pipeline;
pub mod poll;
pub mod preload;
pub mod publish;
pub mod record;

pub use artifacts::{ArtifactSet, ArtifactWriter};
pub use config::{PipelineConfig, PipelineSettings};
pub use error::{FailureClass, PipelineError, PipelineResult};
pub use events::{FileNames, MergeEvent, MergeRequest, PreloadEvent, PreloadOutcome};
pub use extract::{CallSummary, FieldExtractor};
pub use merge::{merge_into, MetadataMerger};
pub use naming::{sanitize, ArtifactNames, CanonicalBaseName};
pub use pipeline::CallPipeline;
pub use poll::{CompanionWaiter, PollPolicy, Sleeper, ThreadSleeper};
pub use publish::HandoffPublisher;
pub use record::CallRecord;

pub use callmeta_store::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use callmeta_types::{BucketName, ObjectKey};
