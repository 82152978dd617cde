use clap::Parser;
use pgjobstore::{CancellationToken, Error, JobState, MaintenanceComponent, Storage};
use serde_json::json;
use std::sync::{atomic, Arc};
use std::time::Duration;

lazy_static::lazy_static! {
    static ref SCHEMA_NAME: String = format!("schema_{}", uuid::Uuid::new_v4().as_simple());
}

static QUEUES: &[&str] = &["critical", "default"];

#[derive(Parser)]
#[command(version, about = "Loadtest for the PostgreSQL job storage.", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = 30_000)]
    jobs_count: usize,

    #[arg(short, long, default_value_t = 10)]
    threads_count: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    log::info!("Running a loadtest with the following settings: jobs_count={}, threads_count={}. Schema name will be {}", cli.jobs_count, cli.threads_count, SCHEMA_NAME.as_str());

    let jobs_sent = Arc::new(atomic::AtomicUsize::new(0));
    let jobs_acked = Arc::new(atomic::AtomicUsize::new(0));
    let stale_claims = Arc::new(atomic::AtomicUsize::new(0));

    let s = Storage::builder()
        .schema(SCHEMA_NAME.as_str())
        .queue_poll_interval(Duration::from_millis(50))
        .connect()
        .await
        .expect("connected and installed schema");

    let cancel = CancellationToken::new();
    let components = s
        .components()
        .into_iter()
        .map(|c| {
            let cancel = cancel.clone();
            tokio::spawn(async move { c.execute(cancel).await })
        })
        .collect::<Vec<_>>();

    let start = std::time::Instant::now();

    let mut set = tokio::task::JoinSet::new();
    let threads_count = cli.threads_count;
    let jobs_count = cli.jobs_count;
    let _: Vec<_> = (0..threads_count)
        .map(|_| {
            let jobs_sent = jobs_sent.clone();
            let jobs_acked = jobs_acked.clone();
            let stale_claims = stale_claims.clone();
            let s = s.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                for idx in 0..jobs_count {
                    if idx % 2 == 0 {
                        if jobs_sent.fetch_add(1, atomic::Ordering::SeqCst) >= jobs_count {
                            return Ok(idx);
                        }
                        let queue = QUEUES[idx % 4 / 2];
                        let job_id = s
                            .create_expired_job(json!({"key": "value"}), Duration::from_secs(3600))
                            .await?;
                        let mut tx = s.write_transaction();
                        tx.set_job_state(job_id, JobState::Enqueued, None, json!({"queue": queue}))
                            .add_to_queue(queue, job_id)
                            .persist_job(job_id)
                            .increment_counter("stats:enqueued");
                        tx.commit().await?;
                    } else {
                        let mut job = match s
                            .dequeue(QUEUES.iter().copied(), Duration::from_secs(1), &cancel)
                            .await
                        {
                            Ok(job) => job,
                            Err(Error::QueueEmpty) => continue,
                            Err(e) => return Err(e),
                        };
                        match job.acknowledge().await {
                            Ok(()) => {}
                            Err(Error::StaleClaim { .. }) => {
                                stale_claims.fetch_add(1, atomic::Ordering::SeqCst);
                                continue;
                            }
                            Err(e) => return Err(e),
                        }
                        let mut tx = s.write_transaction();
                        tx.set_job_state(job.job_id(), JobState::Succeeded, None, json!({}))
                            .expire_job(job.job_id(), Duration::from_secs(60))
                            .increment_counter("stats:succeeded");
                        tx.commit().await?;
                        if jobs_acked.fetch_add(1, atomic::Ordering::SeqCst) >= jobs_count {
                            return Ok(idx);
                        }
                    }
                }
                Ok::<usize, Error>(jobs_count)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(threads_count);
    while let Some(res) = set.join_next().await {
        results.push(res.unwrap());
    }

    let time_elapsed = start.elapsed();
    let seconds_elapsed = (time_elapsed.as_secs() * 1_000_000_000
        + time_elapsed.subsec_nanos() as u64) as f64
        / 1_000_000_000.0;

    cancel.cancel();
    for component in components {
        component.await.unwrap();
    }

    log::info!(
        "Sent {} jobs and acknowledged {} jobs ({} stale claims) in {:.2} seconds, rate: {} jobs per second. Results: {:?}",
        jobs_sent.load(atomic::Ordering::SeqCst),
        jobs_acked.load(atomic::Ordering::SeqCst),
        stale_claims.load(atomic::Ordering::SeqCst),
        seconds_elapsed,
        jobs_count as f64 / seconds_elapsed,
        results,
    );
}
