pub(crate) mod ddl;
pub(crate) mod dml;

fn locked<I>(schema: &str, stmts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    format!(
        "
        BEGIN;
        SET LOCAL lock_timeout = '30s';
        SET LOCAL idle_in_transaction_session_timeout = '30s';
        SELECT pg_advisory_xact_lock(('x' || encode(sha224((current_database() || '.pgjobstore.{schema}')::bytea), 'hex'))::bit(64)::bigint);
        {};
        COMMIT;
        ",
        stmts.into_iter().collect::<Vec<_>>().join("\n"),
    )
}

///
/// \d
///```md
///                          List of relations
///    Schema   |        Name        |   Type   |  Owner
/// ------------+--------------------+----------+----------
///  pgjobstore | aggregated_counter | table    | postgres
///  pgjobstore | counter            | table    | postgres
///  pgjobstore | hash               | table    | postgres
///  pgjobstore | job                | table    | postgres
///  pgjobstore | job_queue          | table    | postgres
///  pgjobstore | list               | table    | postgres
///  pgjobstore | set                | table    | postgres
///  pgjobstore | state              | table    | postgres
///  pgjobstore | version            | table    | postgres
/// ```
///
pub(crate) fn install_app(schema: &str) -> String {
    locked(
        schema,
        [
            ddl::create_schema(schema),
            ddl::create_job_state_enum(schema),
            ddl::create_version_table(schema),
            ddl::create_job_table(schema),
            ddl::create_state_table(schema),
            ddl::create_job_queue_table(schema),
            ddl::create_counter_tables(schema),
            ddl::create_collection_tables(schema),
            dml::insert_version(schema, crate::CURRENT_SCHEMA_VERSION),
        ],
    )
}
