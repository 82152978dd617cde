use crate::sql::dml;

/// Tables swept by the expiration manager, with the column used to address their rows.
pub(crate) const EXPIRABLE_TABLES: [(&str, &str); 5] = [
    ("job", "id"),
    ("aggregated_counter", "key"),
    ("set", "id"),
    ("list", "id"),
    ("hash", "id"),
];

/// Collection kinds the framework may put an expiry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collection {
    Set,
    List,
    Hash,
}

/// Statements compiled once for a specific schema.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub(crate) create_job: String,
    pub(crate) get_job: String,
    pub(crate) set_job_state: String,
    pub(crate) expire_job: String,
    pub(crate) persist_job: String,

    pub(crate) enqueue: String,
    pub(crate) fetch_next_job: String,
    pub(crate) acknowledge: String,
    pub(crate) requeue: String,

    pub(crate) increment_counter: String,
    pub(crate) aggregate_counters: String,

    pub(crate) add_to_set: String,
    pub(crate) remove_from_set: String,
    pub(crate) insert_to_list: String,
    pub(crate) set_range_in_hash: String,
    expire_set: String,
    expire_list: String,
    expire_hash: String,
    persist_set: String,
    persist_list: String,
    persist_hash: String,

    /// `(table, statement)`, in the order of [`EXPIRABLE_TABLES`].
    pub(crate) delete_expired: Vec<(&'static str, String)>,

    pub(crate) get_queue: String,
    pub(crate) get_queues: String,
    pub(crate) get_counter: String,
}

impl Statements {
    pub(crate) fn for_schema(schema: &str) -> Self {
        Statements {
            create_job: dml::create_job(schema),
            get_job: dml::get_job(schema),
            set_job_state: dml::set_job_state(schema),
            expire_job: dml::expire_job(schema),
            persist_job: dml::persist_job(schema),
            enqueue: dml::enqueue(schema),
            fetch_next_job: dml::fetch_next_job(schema),
            acknowledge: dml::acknowledge(schema),
            requeue: dml::requeue(schema),
            increment_counter: dml::increment_counter(schema),
            aggregate_counters: dml::aggregate_counters(schema),
            add_to_set: dml::add_to_set(schema),
            remove_from_set: dml::remove_from_set(schema),
            insert_to_list: dml::insert_to_list(schema),
            set_range_in_hash: dml::set_range_in_hash(schema),
            expire_set: dml::expire_collection(schema, "set"),
            expire_list: dml::expire_collection(schema, "list"),
            expire_hash: dml::expire_collection(schema, "hash"),
            persist_set: dml::persist_collection(schema, "set"),
            persist_list: dml::persist_collection(schema, "list"),
            persist_hash: dml::persist_collection(schema, "hash"),
            delete_expired: EXPIRABLE_TABLES
                .iter()
                .map(|&(table, key)| (table, dml::delete_expired(schema, table, key)))
                .collect(),
            get_queue: dml::get_queue(schema),
            get_queues: dml::get_queues(schema),
            get_counter: dml::get_counter(schema),
        }
    }

    pub(crate) fn expire(&self, collection: Collection) -> &str {
        match collection {
            Collection::Set => &self.expire_set,
            Collection::List => &self.expire_list,
            Collection::Hash => &self.expire_hash,
        }
    }

    pub(crate) fn persist(&self, collection: Collection) -> &str {
        match collection {
            Collection::Set => &self.persist_set,
            Collection::List => &self.persist_list,
            Collection::Hash => &self.persist_hash,
        }
    }
}
