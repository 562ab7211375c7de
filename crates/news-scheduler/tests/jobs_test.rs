//! Pipeline jobs driven by the real scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use news_embeddings::{EmbeddingModel, TableEmbedder};
use news_events::{EventLifecycle, EventStorage, EventsConfig, MemorySource};
use news_scheduler::jobs::{create_event_detection_job, event_detection};
use news_scheduler::{JobResult, JobSchedule, SchedulerConfig, SchedulerService};
use news_storage::Storage;
use news_types::{Article, EventStatus};
use tempfile::TempDir;

fn model() -> Arc<dyn EmbeddingModel> {
    Arc::new(
        TableEmbedder::new(4)
            .with_rule("Bank", TableEmbedder::axis(4, 0))
            .with_rule("Bakery", TableEmbedder::axis(4, 1)),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_event_detection_job_creates_events() {
    let temp = TempDir::new().unwrap();
    let storage = Arc::new(Storage::open(temp.path()).unwrap());
    let events = Arc::new(EventStorage::new(storage));
    let lifecycle =
        Arc::new(EventLifecycle::new(events.clone(), model(), &EventsConfig::default()).unwrap());

    let published = Utc::now() - chrono::Duration::minutes(30);
    let source = Arc::new(MemorySource::new(
        "fixture",
        vec![
            Article::new("1", "bbc", "Central Bank Raises Rates", published),
            Article::new(
                "2",
                "cnn",
                "Central Bank Hikes Interest Rates",
                published + chrono::Duration::minutes(5),
            ),
            Article::new(
                "3",
                "nyt",
                "Local Bakery Opens Downtown",
                published + chrono::Duration::minutes(10),
            ),
        ],
    ));

    let mut scheduler = SchedulerService::new(SchedulerConfig {
        shutdown_timeout_secs: 5,
        ..Default::default()
    })
    .await
    .unwrap();

    create_event_detection_job(
        &scheduler,
        lifecycle,
        source,
        &JobSchedule::new("*/1 * * * * *", 0, 30),
    )
    .await
    .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown().await.unwrap();

    let status = scheduler
        .registry()
        .get_status(event_detection::JOB_NAME)
        .unwrap();
    assert!(status.run_count >= 1);
    assert_eq!(status.error_count, 0);
    assert!(matches!(
        status.last_result,
        Some(JobResult::Success) | Some(JobResult::Skipped(_))
    ));

    // Later runs only re-read the lone bakery article, so exactly one event exists
    let active = events.list_events(Some(EventStatus::Active)).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Central Bank Raises Rates");
    assert_eq!(events.article_count(&active[0].event_id).unwrap(), 2);
}
