use tempfile::{tempdir, TempDir};

use queuectl::error::QueueError;
use queuectl::queue::{JobRegistry, JobSpec, JobState};
use queuectl::store::JsonStore;

fn open_registry() -> (TempDir, JobRegistry) {
    let dir = tempdir().unwrap();
    let store = JsonStore::open(dir.path()).unwrap();
    let registry = JobRegistry::open(store).unwrap();
    (dir, registry)
}

/// Enqueue a failing job with no retry budget and run it to the DLQ.
async fn bury(registry: &JobRegistry, id: &str) {
    let spec =
        JobSpec::parse(&format!(r#"{{"id":"{id}","command":"false","max_retries":0}}"#)).unwrap();
    registry.enqueue(spec).await.unwrap();
    registry.select_eligible(1).await.unwrap();
    registry.record_outcome(id, false).await.unwrap();
}

#[tokio::test]
async fn retry_restores_job_with_fresh_budget() {
    let (_dir, registry) = open_registry();
    bury(&registry, "j2").await;
    assert!(registry.list(None).await.unwrap().is_empty());

    let job = registry.dlq_retry("j2").await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.next_eligible_at, None);

    let active = registry.list(None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "j2");
    assert!(registry.dlq_jobs().await.unwrap().is_empty());

    // Immediately claimable.
    assert_eq!(registry.select_eligible(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn retry_unknown_id_is_not_found() {
    let (_dir, registry) = open_registry();
    bury(&registry, "j1").await;

    let err = registry.dlq_retry("other").await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));

    // Nothing moved.
    assert_eq!(registry.dlq_jobs().await.unwrap().len(), 1);
    assert!(registry.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_refuses_to_shadow_an_active_job() {
    let (_dir, registry) = open_registry();
    bury(&registry, "j1").await;

    // The id has been reused in the active collection since.
    let spec = JobSpec::parse(r#"{"id":"j1","command":"true"}"#).unwrap();
    registry.enqueue(spec).await.unwrap();

    let err = registry.dlq_retry("j1").await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidInput(_)));
    assert_eq!(registry.dlq_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn clear_empties_the_dlq() {
    let (_dir, registry) = open_registry();
    bury(&registry, "j1").await;
    bury(&registry, "j2").await;

    assert_eq!(registry.dlq_clear().await.unwrap(), 2);
    assert!(registry.dlq_jobs().await.unwrap().is_empty());
    assert!(matches!(
        registry.dlq_retry("j1").await.unwrap_err(),
        QueueError::NotFound(_)
    ));
}

#[tokio::test]
async fn migration_survives_process_restarts() {
    let (dir, registry) = open_registry();
    bury(&registry, "j1").await;
    drop(registry);

    let registry = JobRegistry::open(JsonStore::open(dir.path()).unwrap()).unwrap();
    let dead = registry.dlq_jobs().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, "j1");
    assert!(registry.list(None).await.unwrap().is_empty());
}
