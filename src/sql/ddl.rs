use crate::job::JobState;

pub(crate) fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {};", schema)
}

pub(super) fn create_job_state_enum(schema: &str) -> String {
    format!(
        "
        DO $$
        BEGIN
            IF NOT EXISTS (SELECT 1 FROM pg_type typ INNER JOIN pg_namespace nsp on (typ.typnamespace = nsp.oid) where typ.typname = 'job_state' AND nsp.nspname = '{schema}') THEN
                CREATE TYPE {schema}.job_state AS ENUM ('{}', '{}', '{}', '{}', '{}', '{}');
            END IF;
        END $$;
        ",
        JobState::Created,
        JobState::Enqueued,
        JobState::Processing,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Deleted,
    )
}

pub(super) fn create_version_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.version (
            version int primary key,
            installed_on timestamptz not null default now()
        );
        "
    )
}

pub(super) fn create_job_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.job (
            id uuid not null default gen_random_uuid(),
            state_name {schema}.job_state,
            data jsonb,
            created_at timestamptz not null default now(),
            expire_at timestamptz,
            PRIMARY KEY (id)
        );
        CREATE INDEX IF NOT EXISTS job_expire_at_i ON {schema}.job (expire_at) WHERE expire_at IS NOT NULL;
        "
    )
}

pub(super) fn create_state_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.state (
            id bigserial,
            job_id uuid not null REFERENCES {schema}.job (id) ON DELETE CASCADE,
            name {schema}.job_state not null,
            reason text,
            data jsonb,
            created_at timestamptz not null default now(),
            PRIMARY KEY (id)
        );
        CREATE INDEX IF NOT EXISTS state_job_id_i ON {schema}.state (job_id);
        "
    )
}

/// A claimed entry has both `fetch_token` and `fetched_at` set, a pending one has neither.
pub(super) fn create_job_queue_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.job_queue (
            id bigserial,
            job_id uuid not null REFERENCES {schema}.job (id) ON DELETE CASCADE,
            queue text not null,
            enqueued_at timestamptz not null default now(),
            fetch_token uuid,
            fetched_at timestamptz,
            PRIMARY KEY (id),
            CONSTRAINT claim_consistent CHECK ((fetch_token IS NULL) = (fetched_at IS NULL))
        );
        CREATE INDEX IF NOT EXISTS job_queue_fetch_i ON {schema}.job_queue (queue, fetched_at, enqueued_at);
        CREATE INDEX IF NOT EXISTS job_queue_job_id_i ON {schema}.job_queue (job_id);
        "
    )
}

pub(super) fn create_counter_tables(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.counter (
            id bigserial,
            key text not null,
            value bigint not null,
            expire_at timestamptz,
            PRIMARY KEY (id)
        );
        CREATE INDEX IF NOT EXISTS counter_key_i ON {schema}.counter (key);
        CREATE TABLE IF NOT EXISTS {schema}.aggregated_counter (
            key text not null,
            value bigint not null,
            expire_at timestamptz,
            PRIMARY KEY (key)
        );
        CREATE INDEX IF NOT EXISTS aggregated_counter_expire_at_i ON {schema}.aggregated_counter (expire_at) WHERE expire_at IS NOT NULL;
        "
    )
}

pub(super) fn create_collection_tables(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.set (
            id bigserial,
            key text not null,
            value text not null,
            score float8 not null default 0,
            expire_at timestamptz,
            PRIMARY KEY (id),
            UNIQUE (key, value)
        );
        CREATE TABLE IF NOT EXISTS {schema}.list (
            id bigserial,
            key text not null,
            value text,
            expire_at timestamptz,
            PRIMARY KEY (id)
        );
        CREATE INDEX IF NOT EXISTS list_key_i ON {schema}.list (key);
        CREATE TABLE IF NOT EXISTS {schema}.hash (
            id bigserial,
            key text not null,
            field text not null,
            value text,
            expire_at timestamptz,
            PRIMARY KEY (id),
            UNIQUE (key, field)
        );
        "
    )
}
