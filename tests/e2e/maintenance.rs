use crate::utils;
use pgjobstore::{CancellationToken, MaintenanceComponent, Storage};
use serde_json::json;
use std::time::Duration;

async fn count(stmt: String) -> i64 {
    utils::ad_hoc_count(&stmt).await.unwrap()
}

async fn backdate(local: &str, table: &str) {
    utils::ad_hoc_sql([format!(
        "UPDATE {local}.{table} SET expire_at = now() - interval '1 hour' WHERE expire_at IS NOT NULL;"
    )])
    .await
    .unwrap();
}

async fn increments(s: &Storage, key: &str, n: usize) {
    let mut tx = s.write_transaction();
    for _ in 0..n {
        tx.increment_counter(key);
    }
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn expired_jobs_are_removed() {
    let local = "expired_jobs_are_removed";
    let s = utils::fresh_storage(local).await;
    let cancel = CancellationToken::new();

    let kept = utils::enqueue(&s, "default").await;
    let gone = utils::enqueue(&s, "default").await;
    let mut tx = s.write_transaction();
    tx.expire_job(gone, Duration::from_secs(60));
    tx.commit().await.unwrap();
    backdate(local, "job").await;

    let removed = s.expiration_manager().run_once(&cancel).await.unwrap();
    assert_eq!(removed, 1);
    assert!(s.monitoring_api().job(gone).await.unwrap().is_none());
    assert!(s.monitoring_api().job(kept).await.unwrap().is_some());

    // queue entry and state history go along with the job
    assert_eq!(
        count(format!("SELECT COUNT(*) FROM {local}.job_queue WHERE job_id = '{gone}'")).await,
        0
    );
    assert_eq!(
        count(format!("SELECT COUNT(*) FROM {local}.state WHERE job_id = '{gone}'")).await,
        0
    );
    assert_eq!(s.monitoring_api().queue("default").await.unwrap().enqueued, 1);

    // nothing left to do
    assert_eq!(s.expiration_manager().run_once(&cancel).await.unwrap(), 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn expiration_works_in_batches() {
    let local = "expiration_works_in_batches";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .delete_batch_size(2)
        .connect()
        .await
        .unwrap();

    for _ in 0..5 {
        s.create_expired_job(json!({}), Duration::from_secs(60))
            .await
            .unwrap();
    }
    backdate(local, "job").await;

    let removed = s
        .expiration_manager()
        .run_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(removed, 5);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.job")).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn cancelled_expiration_stops_between_batches() {
    let local = "cancelled_expiration_stops_between_batches";
    let s = utils::fresh_storage(local).await;
    s.create_expired_job(json!({}), Duration::from_secs(60))
        .await
        .unwrap();
    backdate(local, "job").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let removed = s.expiration_manager().run_once(&cancel).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.job")).await, 1);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn expired_collections_and_counters_are_removed() {
    let local = "expired_collections_and_counters_are_removed";
    let s = utils::fresh_storage(local).await;
    let cancel = CancellationToken::new();

    let mut tx = s.write_transaction();
    tx.add_to_set("schedule", "job-1", 1.0)
        .insert_to_list("log", "entry")
        .set_range_in_hash("recurring", [("cron", "* * * * *")])
        .add_to_counter("stats:daily", 3, Some(Duration::from_secs(60)))
        .add_to_set("forever", "job-2", 1.0)
        .expire_set("schedule", Duration::from_secs(60))
        .expire_list("log", Duration::from_secs(60))
        .expire_hash("recurring", Duration::from_secs(60));
    tx.commit().await.unwrap();
    assert_eq!(s.counters_aggregator().run_once(&cancel).await.unwrap(), 1);

    for table in ["set", "list", "hash", "aggregated_counter"] {
        backdate(local, table).await;
    }
    let removed = s.expiration_manager().run_once(&cancel).await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(s.monitoring_api().counter("stats:daily").await.unwrap(), 0);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.set")).await, 1);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.list")).await, 0);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.hash")).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn counters_are_aggregated() {
    let local = "counters_are_aggregated";
    let s = utils::fresh_storage(local).await;
    let cancel = CancellationToken::new();

    increments(&s, "stats:succeeded", 5).await;
    increments(&s, "stats:failed", 3).await;

    let folded = s.counters_aggregator().run_once(&cancel).await.unwrap();
    assert_eq!(folded, 8);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.counter")).await, 0);
    assert_eq!(
        count(format!("SELECT COUNT(*) FROM {local}.aggregated_counter")).await,
        2
    );
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 5);
    assert_eq!(s.monitoring_api().counter("stats:failed").await.unwrap(), 3);

    // folded on top of the existing total
    increments(&s, "stats:succeeded", 2).await;
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 7);
    assert_eq!(s.counters_aggregator().run_once(&cancel).await.unwrap(), 2);
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 7);
    assert_eq!(s.counters_aggregator().run_once(&cancel).await.unwrap(), 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn counters_are_aggregated_in_batches() {
    let local = "counters_are_aggregated_in_batches";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .aggregate_batch_size(2)
        .connect()
        .await
        .unwrap();

    increments(&s, "stats:succeeded", 7).await;
    let folded = s
        .counters_aggregator()
        .run_once(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(folded, 7);
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 7);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.counter")).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn no_increment_is_lost_during_aggregation() {
    let local = "no_increment_is_lost_during_aggregation";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .aggregate_batch_size(5)
        .connect()
        .await
        .unwrap();

    let writer = {
        let s = s.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                increments(&s, "stats:succeeded", 2).await;
            }
        })
    };
    let aggregator = s.counters_aggregator();
    let cancel = CancellationToken::new();
    while !writer.is_finished() {
        aggregator.run_once(&cancel).await.unwrap();
        let value = s.monitoring_api().counter("stats:succeeded").await.unwrap();
        assert_eq!(value % 2, 0);
    }
    writer.await.unwrap();
    aggregator.run_once(&cancel).await.unwrap();

    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 100);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.counter")).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn components_run_until_cancelled() {
    let local = "components_run_until_cancelled";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .job_expiration_check_interval(Duration::from_millis(50))
        .counters_aggregate_interval(Duration::from_millis(50))
        .connect()
        .await
        .unwrap();

    let components = s.components();
    let names: Vec<_> = components.iter().map(|c| c.name()).collect();
    assert_eq!(names, ["expiration manager", "counters aggregator"]);

    increments(&s, "stats:succeeded", 3).await;
    s.create_expired_job(json!({}), Duration::from_secs(60))
        .await
        .unwrap();
    backdate(local, "job").await;

    let cancel = CancellationToken::new();
    let handles: Vec<_> = components
        .into_iter()
        .map(|c| {
            let cancel = cancel.clone();
            tokio::spawn(async move { c.execute(cancel).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.counter")).await, 0);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.job")).await, 0);
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 3);

    cancel.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn failing_table_does_not_stop_the_sweep() {
    let local = "failing_table_does_not_stop_the_sweep";
    let s = utils::fresh_storage(local).await;
    let cancel = CancellationToken::new();

    let job_id = s
        .create_expired_job(json!({}), Duration::from_secs(60))
        .await
        .unwrap();
    let mut tx = s.write_transaction();
    tx.insert_to_list("log", "entry")
        .expire_list("log", Duration::from_secs(60));
    tx.commit().await.unwrap();
    backdate(local, "job").await;
    backdate(local, "list").await;

    // a table the storage knows nothing about keeps the job from being deleted
    utils::ad_hoc_sql([
        format!("CREATE TABLE {local}.attachment (job_id uuid REFERENCES {local}.job (id));"),
        format!("INSERT INTO {local}.attachment VALUES ('{job_id}');"),
    ])
    .await
    .unwrap();

    for _ in 0..3 {
        let err = s.expiration_manager().run_once(&cancel).await.unwrap_err();
        assert!(matches!(err, pgjobstore::Error::Sqlx(_)));
    }
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.list")).await, 0);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.job")).await, 1);

    utils::ad_hoc_sql([format!("DROP TABLE {local}.attachment;")])
        .await
        .unwrap();
    assert_eq!(s.expiration_manager().run_once(&cancel).await.unwrap(), 1);
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.job")).await, 0);

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn failed_pass_is_followed_by_the_next_one() {
    let local = "failed_pass_is_followed_by_the_next_one";
    utils::drop_schema(local).await.unwrap();
    let s = utils::builder(local)
        .counters_aggregate_interval(Duration::from_millis(50))
        .connect()
        .await
        .unwrap();

    increments(&s, "stats:succeeded", 3).await;
    // every pass fails while the table is gone
    utils::ad_hoc_sql([format!("ALTER TABLE {local}.counter RENAME TO counter_away;")])
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let aggregator = s.counters_aggregator();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { aggregator.execute(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_finished());
    assert_eq!(
        count(format!("SELECT COUNT(*) FROM {local}.counter_away")).await,
        3
    );

    utils::ad_hoc_sql([format!("ALTER TABLE {local}.counter_away RENAME TO counter;")])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(count(format!("SELECT COUNT(*) FROM {local}.counter")).await, 0);
    assert_eq!(s.monitoring_api().counter("stats:succeeded").await.unwrap(), 3);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    utils::drop_schema(local).await.unwrap();
}
