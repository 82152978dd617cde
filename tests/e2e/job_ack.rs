use crate::utils;
use pgjobstore::{CancellationToken, Error};
use std::time::Duration;

async fn entries(local: &str) -> i64 {
    utils::ad_hoc_count(&format!("SELECT COUNT(*) FROM {local}.job_queue"))
        .await
        .unwrap()
}

#[tokio::test]
async fn acknowledge_removes_job_from_queue() {
    let local = "acknowledge_removes_job_from_queue";
    let s = utils::fresh_storage(local).await;
    let job_id = utils::enqueue(&s, "default").await;
    assert_eq!(entries(local).await, 1);

    let mut job = s
        .dequeue(["default"], Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();
    job.acknowledge().await.unwrap();
    assert_eq!(entries(local).await, 0);

    // the job record itself is the framework's business
    assert!(s.monitoring_api().job(job_id).await.unwrap().is_some());

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn acknowledge_twice() {
    let local = "acknowledge_twice";
    let s = utils::fresh_storage(local).await;
    let job_id = utils::enqueue(&s, "default").await;

    let mut job = s
        .dequeue(["default"], Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();
    job.acknowledge().await.unwrap();
    match job.acknowledge().await {
        Err(Error::StaleClaim { job_id: stale }) => assert_eq!(stale, job_id),
        other => panic!("expected stale claim, got {:?}", other),
    }

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn acknowledge_after_claim_was_taken_over() {
    let local = "acknowledge_after_claim_was_taken_over";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .invisibility_timeout(Duration::from_secs(1))
        .connect()
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let job_id = utils::enqueue(&s, "default").await;

    let mut slow = s
        .dequeue(["default"], Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let mut fast = s
        .dequeue(["default"], Duration::from_secs(2), &cancel)
        .await
        .unwrap();
    assert_eq!(fast.job_id(), job_id);

    // the slow worker's result must be discarded
    assert!(matches!(
        slow.acknowledge().await,
        Err(Error::StaleClaim { .. })
    ));
    assert!(matches!(slow.requeue().await, Err(Error::StaleClaim { .. })));
    assert_eq!(entries(local).await, 1);

    fast.acknowledge().await.unwrap();
    assert_eq!(entries(local).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn requeue_makes_job_available_again() {
    let local = "requeue_makes_job_available_again";
    let s = utils::fresh_storage(local).await;
    let cancel = CancellationToken::new();
    let job_id = utils::enqueue(&s, "default").await;

    let mut job = s
        .dequeue(["default"], Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    let token = job.fetch_token();
    job.requeue().await.unwrap();

    let stats = s.monitoring_api().queue("default").await.unwrap();
    assert_eq!((stats.enqueued, stats.fetched), (1, 0));

    // settled already
    assert!(matches!(
        job.acknowledge().await,
        Err(Error::StaleClaim { .. })
    ));

    let mut again = s
        .dequeue(["default"], Duration::from_millis(100), &cancel)
        .await
        .unwrap();
    assert_eq!(again.job_id(), job_id);
    assert_ne!(again.fetch_token(), token);
    again.acknowledge().await.unwrap();

    utils::drop_schema(local).await.unwrap();
}
