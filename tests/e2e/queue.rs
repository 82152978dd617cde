use crate::utils;
use pgjobstore::{CancellationToken, Error, JobState, QueueStats};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn unknown_queue() {
    let local = "unknown_queue";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .queues(["critical", "default"])
        .connect()
        .await
        .unwrap();

    assert!(s.queue_provider("critical").is_ok());
    match s.queue_provider("emails") {
        Err(Error::UnknownQueue { name }) => assert_eq!(name, "emails"),
        other => panic!("expected unknown queue, got {:?}", other),
    }

    let err = s
        .dequeue(
            ["default", "emails"],
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownQueue { .. }));

    // the whole write transaction is discarded
    let job_id = s
        .create_expired_job(json!({}), Duration::from_secs(60))
        .await
        .unwrap();
    let mut tx = s.write_transaction();
    tx.set_job_state(job_id, JobState::Enqueued, None, json!({"queue": "emails"}))
        .add_to_queue("emails", job_id)
        .persist_job(job_id);
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, Error::UnknownQueue { .. }));

    let job = s.monitoring_api().job(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, Some(JobState::Created));
    assert!(job.expire_at.is_some());
    assert!(s.monitoring_api().queues().await.unwrap().is_empty());

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn queue_provider_serves_its_queues() {
    let local = "queue_provider_serves_its_queues";
    let s = utils::fresh_storage(local).await;
    let job_id = utils::enqueue(&s, "default").await;

    let provider = s.queue_provider("default").unwrap();
    let stats = provider.monitoring_api().queue("default").await.unwrap();
    assert_eq!(stats.enqueued, 1);

    let mut job = provider
        .job_queue()
        .dequeue(
            &["default".to_string()],
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(job.job_id(), job_id);
    job.acknowledge().await.unwrap();

    // enqueue on the caller's own transaction
    let other = s
        .create_expired_job(json!({}), Duration::from_secs(60))
        .await
        .unwrap();
    let mut conn = s.get_connection().await.unwrap();
    provider
        .job_queue()
        .enqueue(&mut conn, "default", other)
        .await
        .unwrap();
    conn.release().await.unwrap();
    let stats = provider.monitoring_api().queue("default").await.unwrap();
    assert_eq!(stats.enqueued, 1);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn queues_stats() {
    let local = "queues_stats";
    let s = utils::fresh_storage(local).await;
    assert!(s.monitoring_api().queues().await.unwrap().is_empty());

    for _ in 0..2 {
        utils::enqueue(&s, "default").await;
    }
    utils::enqueue(&s, "critical").await;
    let mut job = s
        .dequeue(["default"], Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();

    let queues = s.monitoring_api().queues().await.unwrap();
    assert_eq!(
        queues,
        vec![
            QueueStats {
                name: "critical".into(),
                enqueued: 1,
                fetched: 0,
            },
            QueueStats {
                name: "default".into(),
                enqueued: 1,
                fetched: 1,
            },
        ]
    );

    // never used queues are just empty
    let stats = s.monitoring_api().queue("emails").await.unwrap();
    assert_eq!((stats.enqueued, stats.fetched), (0, 0));

    job.acknowledge().await.unwrap();
    utils::drop_schema(local).await.unwrap();
}
