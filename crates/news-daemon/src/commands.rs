//! Command implementations for `newsd`.
//!
//! Handles:
//! - start: register the pipeline jobs and run them until SIGINT/SIGTERM
//! - import: ingest articles from a JSON Lines file
//! - detect, sweep, label, analyze, topics: run one pipeline stage and print
//!   its summary
//! - events, topics list/show, stats: read-only queries

use std::fs;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use news_events::{EventAnalyzer, EventStorage};
use news_scheduler::jobs::{
    create_event_analysis_job, create_event_detection_job, create_event_labeling_job,
    create_topic_detection_job,
};
use news_scheduler::SchedulerService;
use news_storage::Storage;
use news_topics::TopicStorage;
use news_types::RunSummary;
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, EventCommands, TopicCommands};
use crate::import::import_articles;
use crate::pipeline::{load_model, Pipeline};
use crate::settings::Settings;

/// Load settings, apply CLI overrides and validate the result.
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Open storage, creating parent directories as needed.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

fn report(summary: &RunSummary) -> Result<()> {
    for error in &summary.errors {
        warn!(item = %error.item, kind = %error.kind, "{}", error.message);
    }
    print_json(summary)
}

/// Parse the command line, then dispatch.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Start => start_daemon(settings).await,
        Commands::Import { file } => handle_import(&settings, &file),
        Commands::Detect => handle_detect(&settings),
        Commands::Sweep => handle_sweep(&settings),
        Commands::Label { event_id } => handle_label(&settings, event_id.as_deref()),
        Commands::Analyze { event_id } => handle_analyze(&settings, event_id.as_deref()),
        Commands::Events { command } => handle_events(&settings, command),
        Commands::Topics { command } => handle_topics(&settings, command),
        Commands::Stats => show_stats(&settings),
    }
}

/// Run the scheduled jobs until interrupted.
pub async fn start_daemon(settings: Settings) -> Result<()> {
    info!("News daemon starting...");
    info!("  Database path: {}", settings.db_path);
    info!("  Log level: {}", settings.log_level);

    let storage = open_storage(&settings)?;
    let model = load_model(&settings)?;
    let pipeline = Pipeline::new(&settings, storage.clone(), model)?;

    let mut scheduler = SchedulerService::new(settings.scheduler.clone())
        .await
        .context("Failed to create scheduler")?;
    register_jobs(&scheduler, &pipeline, &settings).await?;
    scheduler.start().await.context("Failed to start scheduler")?;

    wait_for_shutdown().await;

    scheduler
        .shutdown()
        .await
        .context("Scheduler shutdown failed")?;
    storage.flush().context("Failed to flush storage")?;
    info!("News daemon stopped");
    Ok(())
}

/// Register every enabled pipeline job.
pub async fn register_jobs(
    scheduler: &SchedulerService,
    pipeline: &Pipeline,
    settings: &Settings,
) -> Result<()> {
    let jobs = &settings.jobs;

    if jobs.event_detection.enabled {
        create_event_detection_job(
            scheduler,
            pipeline.lifecycle.clone(),
            pipeline.source.clone(),
            &jobs.event_detection,
        )
        .await
        .context("Failed to register event detection job")?;
    }
    if jobs.event_labeling.enabled {
        create_event_labeling_job(scheduler, pipeline.labeler.clone(), &jobs.event_labeling)
            .await
            .context("Failed to register event labeling job")?;
    }
    if jobs.event_analysis.enabled {
        create_event_analysis_job(scheduler, pipeline.analyzer.clone(), &jobs.event_analysis)
            .await
            .context("Failed to register event analysis job")?;
    }
    if jobs.topic_detection.enabled {
        create_topic_detection_job(
            scheduler,
            pipeline.aggregator.clone(),
            pipeline.hierarchy.clone(),
            &jobs.topic_detection,
        )
        .await
        .context("Failed to register topic detection job")?;
    }

    info!(jobs = scheduler.registry().job_count(), "Registered pipeline jobs");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

fn handle_import(settings: &Settings, path: &str) -> Result<()> {
    let storage = open_storage(settings)?;
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path))?;
    let report = import_articles(&storage, BufReader::new(file))?;
    print_json(&report)
}

fn pipeline_for(settings: &Settings) -> Result<Pipeline> {
    let storage = open_storage(settings)?;
    let model = load_model(settings)?;
    Pipeline::new(settings, storage, model)
}

fn handle_detect(settings: &Settings) -> Result<()> {
    let pipeline = pipeline_for(settings)?;
    let summary = pipeline
        .lifecycle
        .detect_and_merge_events(pipeline.source.as_ref(), Utc::now(), &CancellationToken::new())
        .context("Event detection failed")?;
    report(&summary)
}

fn handle_sweep(settings: &Settings) -> Result<()> {
    let pipeline = pipeline_for(settings)?;
    let summary = pipeline
        .lifecycle
        .sweep_stale_events(Utc::now(), &CancellationToken::new())
        .context("Staleness sweep failed")?;
    report(&summary)
}

fn handle_label(settings: &Settings, event_id: Option<&str>) -> Result<()> {
    let pipeline = pipeline_for(settings)?;
    let summary = match event_id {
        Some(id) => pipeline.labeler.label_event(id, Utc::now()),
        None => pipeline
            .labeler
            .label_pending(Utc::now(), &CancellationToken::new())
            .context("Labeling failed")?,
    };
    report(&summary)
}

fn handle_analyze(settings: &Settings, event_id: Option<&str>) -> Result<()> {
    let storage = open_storage(settings)?;
    let analyzer = EventAnalyzer::new(Arc::new(EventStorage::new(storage)));
    let summary = match event_id {
        Some(id) => analyzer.analyze_event(id, Utc::now()),
        None => analyzer
            .analyze_pending(Utc::now(), &CancellationToken::new())
            .context("Analysis failed")?,
    };
    report(&summary)
}

fn handle_events(settings: &Settings, command: EventCommands) -> Result<()> {
    let storage = open_storage(settings)?;
    let events = EventStorage::new(storage.clone());

    match command {
        EventCommands::List { status } => {
            let events = events.list_events(status.map(Into::into))?;
            print_json(&events)
        }
        EventCommands::Show { event_id } => {
            let topics = TopicStorage::new(storage);
            let event = events.require_event(&event_id)?;
            print_json(&json!({
                "event": event,
                "links": events.links_for_event(&event_id)?,
                "labels": events.labels_for_event(&event_id)?,
                "analysis": events.get_analysis(&event_id)?,
                "topics": topics.topics_for_event(&event_id)?,
            }))
        }
    }
}

fn handle_topics(settings: &Settings, command: TopicCommands) -> Result<()> {
    match command {
        TopicCommands::Detect => {
            let pipeline = pipeline_for(settings)?;
            let cancel = CancellationToken::new();
            let now = Utc::now();
            let detection = pipeline
                .aggregator
                .detect_topics(now, &cancel)
                .context("Topic detection failed")?;
            let mut summary = detection.summary;
            let classified = pipeline
                .hierarchy
                .classify_topics(&detection.created, Utc::now(), &cancel)
                .context("Topic classification failed")?;
            summary.absorb(classified);
            report(&summary)
        }
        TopicCommands::Classify { topic_id } => {
            let pipeline = pipeline_for(settings)?;
            let summary = match topic_id {
                Some(id) => pipeline.hierarchy.classify_topic(&id, Utc::now()),
                None => pipeline
                    .hierarchy
                    .classify_all(Utc::now(), &CancellationToken::new())
                    .context("Topic classification failed")?,
            };
            report(&summary)
        }
        TopicCommands::List => {
            let topics = TopicStorage::new(open_storage(settings)?);
            print_json(&topics.list_topics()?)
        }
        TopicCommands::Show { topic_id } => {
            let topics = TopicStorage::new(open_storage(settings)?);
            let topic = topics.require_topic(&topic_id)?;
            print_json(&json!({
                "topic": topic,
                "events": topics.events_for_topic(&topic_id)?,
                "parents": topics.parents_of(&topic_id)?,
                "children": topics.children_of(&topic_id)?,
            }))
        }
    }
}

/// Print entity counts and raw database statistics.
pub fn show_stats(settings: &Settings) -> Result<()> {
    let storage = open_storage(settings)?;
    let events = EventStorage::new(storage.clone());
    let topics = TopicStorage::new(storage.clone());

    print_json(&json!({
        "events": events.stats()?,
        "topics": topics.stats()?,
        "storage": storage.get_stats()?,
    }))
}
