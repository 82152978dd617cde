use crate::job::JobState;

pub(crate) fn check_if_app_installed(schema: &str) -> String {
    format!(
        "
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables WHERE table_schema = '{schema}' AND table_name = 'version'
        );
        "
    )
}

pub(crate) fn get_app(schema: &str) -> String {
    format!("SELECT version, installed_on FROM {schema}.version ORDER BY version DESC LIMIT 1;")
}

pub(crate) fn insert_version(schema: &str, version: u8) -> String {
    format!(
        "INSERT INTO {schema}.version (version) VALUES ({}) ON CONFLICT DO NOTHING;",
        version
    )
}

pub(crate) fn create_job(schema: &str) -> String {
    format!(
        "
        INSERT INTO {schema}.job (state_name, data, expire_at)
        VALUES ('{}'::{schema}.job_state, $1, now() + $2 * interval '1 second')
        RETURNING id;
        ",
        JobState::Created,
    )
}

pub(crate) fn get_job(schema: &str) -> String {
    format!(
        "
        SELECT id, state_name::text AS state_name, data, created_at, expire_at
        FROM {schema}.job
        WHERE id = $1;
        "
    )
}

pub(crate) fn set_job_state(schema: &str) -> String {
    format!(
        "
        WITH s AS (
            INSERT INTO {schema}.state (job_id, name, reason, data)
            VALUES ($1, $2::{schema}.job_state, $3, $4)
            RETURNING job_id, name
        )
        UPDATE {schema}.job j SET state_name = s.name
        FROM s
        WHERE j.id = s.job_id;
        "
    )
}

pub(crate) fn expire_job(schema: &str) -> String {
    format!("UPDATE {schema}.job SET expire_at = now() + $2 * interval '1 second' WHERE id = $1;")
}

pub(crate) fn persist_job(schema: &str) -> String {
    format!("UPDATE {schema}.job SET expire_at = NULL WHERE id = $1;")
}

pub(crate) fn enqueue(schema: &str) -> String {
    format!("INSERT INTO {schema}.job_queue (job_id, queue) VALUES ($1, $2);")
}

/// Claims the oldest eligible entry of the earliest listed queue.
///
/// Eligible means never claimed, or claimed more than `$2` seconds ago.
/// `SKIP LOCKED` makes concurrent fetchers pass over rows locked by one another
/// instead of waiting on them, so every row ends up with at most one claimant.
pub(crate) fn fetch_next_job(schema: &str) -> String {
    format!(
        r#"
        WITH next AS (
            SELECT id FROM {schema}.job_queue
            WHERE queue = ANY($1)
              AND (fetched_at IS NULL OR fetched_at <= now() - $2 * interval '1 second')
            ORDER BY array_position($1, queue), enqueued_at, id
            LIMIT 1
            FOR UPDATE
            SKIP LOCKED
        )
        UPDATE {schema}.job_queue q SET
            fetch_token = $3,
            fetched_at = now()
        FROM next
        WHERE q.id = next.id
        RETURNING q.id, q.job_id, q.queue, q.fetch_token, q.fetched_at;
        "#
    )
}

pub(crate) fn acknowledge(schema: &str) -> String {
    format!("DELETE FROM {schema}.job_queue WHERE id = $1 AND fetch_token = $2;")
}

pub(crate) fn requeue(schema: &str) -> String {
    format!(
        "UPDATE {schema}.job_queue SET fetch_token = NULL, fetched_at = NULL WHERE id = $1 AND fetch_token = $2;"
    )
}

pub(crate) fn increment_counter(schema: &str) -> String {
    format!(
        "
        INSERT INTO {schema}.counter (key, value, expire_at)
        VALUES ($1, $2, now() + $3::float8 * interval '1 second');
        "
    )
}

pub(crate) fn add_to_set(schema: &str) -> String {
    format!(
        "
        INSERT INTO {schema}.set (key, value, score) VALUES ($1, $2, $3)
        ON CONFLICT (key, value) DO UPDATE SET score = EXCLUDED.score;
        "
    )
}

pub(crate) fn remove_from_set(schema: &str) -> String {
    format!("DELETE FROM {schema}.set WHERE key = $1 AND value = $2;")
}

pub(crate) fn insert_to_list(schema: &str) -> String {
    format!("INSERT INTO {schema}.list (key, value) VALUES ($1, $2);")
}

pub(crate) fn set_range_in_hash(schema: &str) -> String {
    format!(
        "
        INSERT INTO {schema}.hash (key, field, value)
        SELECT $1, f, v FROM UNNEST($2::text[], $3::text[]) AS t(f, v)
        ON CONFLICT (key, field) DO UPDATE SET value = EXCLUDED.value;
        "
    )
}

pub(crate) fn expire_collection(schema: &str, table: &str) -> String {
    format!("UPDATE {schema}.{table} SET expire_at = now() + $2 * interval '1 second' WHERE key = $1;")
}

pub(crate) fn persist_collection(schema: &str, table: &str) -> String {
    format!("UPDATE {schema}.{table} SET expire_at = NULL WHERE key = $1;")
}

/// Removes up to `$1` expired rows, skipping rows someone else holds a lock on.
pub(crate) fn delete_expired(schema: &str, table: &str, key_column: &str) -> String {
    format!(
        "
        DELETE FROM {schema}.{table}
        WHERE {key_column} IN (
            SELECT {key_column} FROM {schema}.{table}
            WHERE expire_at < now()
            LIMIT $1
            FOR UPDATE
            SKIP LOCKED
        );
        "
    )
}

/// Folds up to `$1` raw increments into the aggregated counters.
///
/// Only rows locked by this statement are summed and deleted, increments inserted
/// concurrently are left for the next pass. Returns the number of raw rows consumed.
pub(crate) fn aggregate_counters(schema: &str) -> String {
    format!(
        r#"
        WITH consumed AS (
            DELETE FROM {schema}.counter
            WHERE id IN (
                SELECT id FROM {schema}.counter
                ORDER BY id
                LIMIT $1
                FOR UPDATE
                SKIP LOCKED
            )
            RETURNING key, value, expire_at
        ), folded AS (
            INSERT INTO {schema}.aggregated_counter (key, value, expire_at)
            SELECT key, SUM(value)::bigint, MAX(expire_at) FROM consumed GROUP BY key
            ON CONFLICT (key) DO UPDATE SET
                value = {schema}.aggregated_counter.value + EXCLUDED.value,
                expire_at = GREATEST({schema}.aggregated_counter.expire_at, EXCLUDED.expire_at)
            RETURNING 1
        )
        SELECT COUNT(*) FROM consumed;
        "#
    )
}

pub(crate) fn get_queues(schema: &str) -> String {
    format!(
        "
        SELECT
            queue,
            COUNT(*) FILTER (WHERE fetch_token IS NULL) AS enqueued,
            COUNT(*) FILTER (WHERE fetch_token IS NOT NULL) AS fetched
        FROM {schema}.job_queue
        GROUP BY queue
        ORDER BY queue;
        "
    )
}

pub(crate) fn get_queue(schema: &str) -> String {
    format!(
        "
        SELECT
            $1::text AS queue,
            COUNT(*) FILTER (WHERE fetch_token IS NULL) AS enqueued,
            COUNT(*) FILTER (WHERE fetch_token IS NOT NULL) AS fetched
        FROM {schema}.job_queue
        WHERE queue = $1;
        "
    )
}

/// Aggregated value plus whatever raw increments have not been folded yet.
///
/// Both are read by the same statement, so a concurrent fold is never observed halfway.
pub(crate) fn get_counter(schema: &str) -> String {
    format!(
        "
        SELECT (
            COALESCE((SELECT value FROM {schema}.aggregated_counter WHERE key = $1), 0)
            + COALESCE((SELECT SUM(value) FROM {schema}.counter WHERE key = $1), 0)
        )::bigint;
        "
    )
}
