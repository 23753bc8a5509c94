//! Service entry point shared by the CLI and the REST surface.

use crate::config::PipelineConfig;
use crate::events::{MergeEvent, PreloadEvent, PreloadOutcome};
use crate::merge::{MergeTarget, MetadataMerger};
use crate::poll::{Sleeper, ThreadSleeper};
use crate::preload::PreloadHandler;
use crate::PipelineResult;
use callmeta_store::ObjectStore;
use std::sync::Arc;

/// The two pipeline stages bound to one configuration and object store.
///
/// Cheap to clone; every invocation runs synchronously on the calling thread.
#[derive(Clone, Debug)]
pub struct CallPipeline {
    config: Arc<PipelineConfig>,
    store: Arc<dyn ObjectStore>,
    sleeper: Arc<dyn Sleeper>,
}

impl CallPipeline {
    pub fn new(config: Arc<PipelineConfig>, store: Arc<dyn ObjectStore>) -> Self {
        Self::with_sleeper(config, store, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        config: Arc<PipelineConfig>,
        store: Arc<dyn ObjectStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            store,
            sleeper,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1.
    pub fn handle_preload(&self, event: &PreloadEvent) -> PipelineResult<PreloadOutcome> {
        let span = tracing::info_span!(
            "preload",
            invocation = %uuid::Uuid::new_v4(),
            bucket = %event.bucket,
            key = %event.object_key,
        );
        let _guard = span.enter();

        let result =
            PreloadHandler::new(&self.config, self.store.as_ref(), self.sleeper.as_ref())
                .handle(event);
        if let Err(e) = &result {
            tracing::error!(error = %e, class = ?e.class(), "preload failed");
        }
        result
    }

    /// Stage 2. Returns the triggering event unchanged.
    pub fn handle_merge(&self, event: MergeEvent) -> PipelineResult<MergeEvent> {
        let span = tracing::info_span!(
            "merge",
            invocation = %uuid::Uuid::new_v4(),
            key = %event.key(),
            interim = %event.interim_results_file(),
        );
        let _guard = span.enter();

        let result = MergeTarget::resolve(
            self.config.ingest_bucket(),
            self.config.output_bucket(),
            event.key(),
            event.interim_results_file(),
        )
        .and_then(|target| {
            MetadataMerger::new(
                self.store.as_ref(),
                self.sleeper.as_ref(),
                self.config.poll(),
                self.config.guard_interim_writes(),
            )
            .merge(&target)
        });

        match result {
            Ok(_) => Ok(event),
            Err(e) => {
                tracing::error!(error = %e, class = ?e.class(), "merge failed");
                Err(e)
            }
        }
    }
}
