use callmeta_core::{
    ArtifactNames, CallPipeline, CallRecord, FieldExtractor, FsObjectStore, MergeEvent,
    PipelineConfig, PipelineSettings, PreloadEvent,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "callmeta")]
#[command(about = "Call metadata normalization and handoff pipeline CLI")]
struct Cli {
    /// YAML settings file; CALLMETA_* environment variables override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory backing the object store (one sub-directory per bucket)
    #[arg(long, global = true, default_value = ".")]
    store_root: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run stage 1 for a metadata object
    Preload {
        /// Bucket holding the call record
        #[arg(long)]
        bucket: String,
        /// Key of the call record
        #[arg(long)]
        key: String,
    },
    /// Run stage 2: merge normalized metadata into an interim result document
    Merge {
        /// Pipeline key of the call
        #[arg(long)]
        key: String,
        /// Interim result document key in the output bucket
        #[arg(long)]
        interim_results_file: String,
    },
    /// Print the call summary and canonical filenames of a local call record
    Summarize {
        /// Path to the XML call record
        xml_path: PathBuf,
        /// Display timezone; defaults to the configured one
        #[arg(long)]
        timezone: Option<String>,
    },
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<PipelineSettings> {
    let settings = match path {
        Some(path) => PipelineSettings::from_yaml_file(path)?,
        None => PipelineSettings::default(),
    };
    Ok(settings.with_lookup(|name| std::env::var(name).ok())?)
}

fn pipeline(settings: PipelineSettings, store_root: &Path) -> anyhow::Result<CallPipeline> {
    let config = Arc::new(PipelineConfig::new(settings)?);
    let store = Arc::new(FsObjectStore::new(store_root)?);
    Ok(CallPipeline::new(config, store))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("callmeta_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Preload { bucket, key } => {
            let event = PreloadEvent::from_value(&serde_json::json!({
                "bucket": bucket,
                "objectKey": key,
            }))?;
            let outcome = pipeline(settings, &cli.store_root)?
                .handle_preload(&event)
                .inspect_err(|e| tracing::error!(class = ?e.class(), "{e}"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Merge {
            key,
            interim_results_file,
        } => {
            let event = MergeEvent::from_value(serde_json::json!({
                "key": key,
                "interimResultsFile": interim_results_file,
            }))?;
            let event = pipeline(settings, &cli.store_root)?
                .handle_merge(event)
                .inspect_err(|e| tracing::error!(class = ?e.class(), "{e}"))?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Commands::Summarize { xml_path, timezone } => {
            let extractor = FieldExtractor::for_timezone(
                timezone.as_deref().unwrap_or(&settings.display_timezone),
            )?;
            let bytes = std::fs::read(&xml_path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", xml_path.display(), e))?;
            let summary = extractor.extract(&CallRecord::parse(&bytes)?)?;
            let names = ArtifactNames::derive(&summary);

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "summary": summary,
                    "fileNames": {
                        "audioFilename": names.audio,
                        "jsonFilename": names.json,
                        "xmlFilename": names.xml,
                    },
                }))?
            );
        }
    }

    Ok(())
}
