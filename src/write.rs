use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use std::sync::Arc;
use std::time::Duration;

use crate::stmt::{Collection, Statements};
use crate::{ConnectionManager, Error, JobId, JobState, QueueProviderRegistry};

#[derive(Debug, Clone)]
enum Command {
    SetJobState {
        job_id: JobId,
        state: JobState,
        reason: Option<String>,
        data: serde_json::Value,
    },
    ExpireJob {
        job_id: JobId,
        expire_in: Duration,
    },
    PersistJob {
        job_id: JobId,
    },
    AddToQueue {
        queue_name: String,
        job_id: JobId,
    },
    IncrementCounter {
        key: String,
        value: i64,
        expire_in: Option<Duration>,
    },
    AddToSet {
        key: String,
        value: String,
        score: f64,
    },
    RemoveFromSet {
        key: String,
        value: String,
    },
    InsertToList {
        key: String,
        value: String,
    },
    SetRangeInHash {
        key: String,
        fields: Vec<String>,
        values: Vec<String>,
    },
    Expire {
        collection: Collection,
        key: String,
        expire_in: Duration,
    },
    Persist {
        collection: Collection,
        key: String,
    },
}

impl Command {
    async fn apply(
        self,
        conn: &mut PgConnection,
        stmt: &Statements,
        registry: &QueueProviderRegistry,
    ) -> Result<(), Error> {
        match self {
            Command::SetJobState {
                job_id,
                state,
                reason,
                data,
            } => {
                sqlx::query(&stmt.set_job_state)
                    .bind(job_id)
                    .bind(state.to_string())
                    .bind(reason)
                    .bind(Json(data))
                    .execute(conn)
                    .await?;
            }
            Command::ExpireJob { job_id, expire_in } => {
                sqlx::query(&stmt.expire_job)
                    .bind(job_id)
                    .bind(expire_in.as_secs_f64())
                    .execute(conn)
                    .await?;
            }
            Command::PersistJob { job_id } => {
                sqlx::query(&stmt.persist_job)
                    .bind(job_id)
                    .execute(conn)
                    .await?;
            }
            Command::AddToQueue { queue_name, job_id } => {
                registry
                    .get(&queue_name)?
                    .job_queue()
                    .enqueue(conn, &queue_name, job_id)
                    .await?;
            }
            Command::IncrementCounter {
                key,
                value,
                expire_in,
            } => {
                sqlx::query(&stmt.increment_counter)
                    .bind(key)
                    .bind(value)
                    .bind(expire_in.map(|d| d.as_secs_f64()))
                    .execute(conn)
                    .await?;
            }
            Command::AddToSet { key, value, score } => {
                sqlx::query(&stmt.add_to_set)
                    .bind(key)
                    .bind(value)
                    .bind(score)
                    .execute(conn)
                    .await?;
            }
            Command::RemoveFromSet { key, value } => {
                sqlx::query(&stmt.remove_from_set)
                    .bind(key)
                    .bind(value)
                    .execute(conn)
                    .await?;
            }
            Command::InsertToList { key, value } => {
                sqlx::query(&stmt.insert_to_list)
                    .bind(key)
                    .bind(value)
                    .execute(conn)
                    .await?;
            }
            Command::SetRangeInHash {
                key,
                fields,
                values,
            } => {
                sqlx::query(&stmt.set_range_in_hash)
                    .bind(key)
                    .bind(fields)
                    .bind(values)
                    .execute(conn)
                    .await?;
            }
            Command::Expire {
                collection,
                key,
                expire_in,
            } => {
                sqlx::query(stmt.expire(collection))
                    .bind(key)
                    .bind(expire_in.as_secs_f64())
                    .execute(conn)
                    .await?;
            }
            Command::Persist { collection, key } => {
                sqlx::query(stmt.persist(collection))
                    .bind(key)
                    .execute(conn)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Buffer of writes applied atomically on [`WriteTransaction::commit`].
///
/// Either every command takes effect or none does. Dropping the buffer
/// without committing discards it.
#[derive(Debug, Clone)]
#[must_use = "nothing is written until the transaction is committed"]
pub struct WriteTransaction {
    manager: ConnectionManager,
    stmt: Arc<Statements>,
    registry: Arc<QueueProviderRegistry>,
    commands: Vec<Command>,
}

impl WriteTransaction {
    pub(crate) fn new(
        manager: ConnectionManager,
        stmt: Arc<Statements>,
        registry: Arc<QueueProviderRegistry>,
    ) -> Self {
        WriteTransaction {
            manager,
            stmt,
            registry,
            commands: Vec::new(),
        }
    }

    /// Number of buffered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Move the job to `state`, recording it in the job's state history.
    pub fn set_job_state<D>(
        &mut self,
        job_id: JobId,
        state: JobState,
        reason: Option<&str>,
        data: D,
    ) -> &mut Self
    where
        D: Into<serde_json::Value>,
    {
        self.commands.push(Command::SetJobState {
            job_id,
            state,
            reason: reason.map(ToString::to_string),
            data: data.into(),
        });
        self
    }

    /// Make the job eligible for cleanup once `expire_in` has passed.
    pub fn expire_job(&mut self, job_id: JobId, expire_in: Duration) -> &mut Self {
        self.commands.push(Command::ExpireJob { job_id, expire_in });
        self
    }

    /// Keep the job forever.
    pub fn persist_job(&mut self, job_id: JobId) -> &mut Self {
        self.commands.push(Command::PersistJob { job_id });
        self
    }

    /// Put the job onto a queue.
    ///
    /// Committing fails with [`Error::UnknownQueue`] if no provider serves this queue.
    pub fn add_to_queue<Q>(&mut self, queue_name: Q, job_id: JobId) -> &mut Self
    where
        Q: Into<String>,
    {
        self.commands.push(Command::AddToQueue {
            queue_name: queue_name.into(),
            job_id,
        });
        self
    }

    /// Record an increment of `1` for the counter.
    pub fn increment_counter<K>(&mut self, key: K) -> &mut Self
    where
        K: Into<String>,
    {
        self.add_to_counter(key, 1, None)
    }

    /// Record a decrement of `1` for the counter.
    pub fn decrement_counter<K>(&mut self, key: K) -> &mut Self
    where
        K: Into<String>,
    {
        self.add_to_counter(key, -1, None)
    }

    /// Record an arbitrary (possibly negative) increment for the counter.
    ///
    /// With `expire_in` set, the aggregated counter becomes eligible for cleanup
    /// once that much time has passed.
    pub fn add_to_counter<K>(&mut self, key: K, value: i64, expire_in: Option<Duration>) -> &mut Self
    where
        K: Into<String>,
    {
        self.commands.push(Command::IncrementCounter {
            key: key.into(),
            value,
            expire_in,
        });
        self
    }

    /// Add a value to the set, updating its score if already present.
    pub fn add_to_set<K, V>(&mut self, key: K, value: V, score: f64) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.commands.push(Command::AddToSet {
            key: key.into(),
            value: value.into(),
            score,
        });
        self
    }

    /// Remove a value from the set.
    pub fn remove_from_set<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.commands.push(Command::RemoveFromSet {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Append a value to the list.
    pub fn insert_to_list<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.commands.push(Command::InsertToList {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Insert or overwrite fields of the hash.
    pub fn set_range_in_hash<K, I, F, V>(&mut self, key: K, pairs: I) -> &mut Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let (fields, values) = pairs
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .unzip();
        self.commands.push(Command::SetRangeInHash {
            key: key.into(),
            fields,
            values,
        });
        self
    }

    /// Make the whole set eligible for cleanup once `expire_in` has passed.
    pub fn expire_set<K: Into<String>>(&mut self, key: K, expire_in: Duration) -> &mut Self {
        self.expire(Collection::Set, key.into(), expire_in)
    }

    /// Make the whole list eligible for cleanup once `expire_in` has passed.
    pub fn expire_list<K: Into<String>>(&mut self, key: K, expire_in: Duration) -> &mut Self {
        self.expire(Collection::List, key.into(), expire_in)
    }

    /// Make the whole hash eligible for cleanup once `expire_in` has passed.
    pub fn expire_hash<K: Into<String>>(&mut self, key: K, expire_in: Duration) -> &mut Self {
        self.expire(Collection::Hash, key.into(), expire_in)
    }

    /// Keep the set forever.
    pub fn persist_set<K: Into<String>>(&mut self, key: K) -> &mut Self {
        self.persist(Collection::Set, key.into())
    }

    /// Keep the list forever.
    pub fn persist_list<K: Into<String>>(&mut self, key: K) -> &mut Self {
        self.persist(Collection::List, key.into())
    }

    /// Keep the hash forever.
    pub fn persist_hash<K: Into<String>>(&mut self, key: K) -> &mut Self {
        self.persist(Collection::Hash, key.into())
    }

    fn expire(&mut self, collection: Collection, key: String, expire_in: Duration) -> &mut Self {
        self.commands.push(Command::Expire {
            collection,
            key,
            expire_in,
        });
        self
    }

    fn persist(&mut self, collection: Collection, key: String) -> &mut Self {
        self.commands.push(Command::Persist { collection, key });
        self
    }

    /// Apply every buffered command in a single transaction.
    pub async fn commit(self) -> Result<(), Error> {
        let WriteTransaction {
            manager,
            stmt,
            registry,
            commands,
        } = self;
        if commands.is_empty() {
            return Ok(());
        }
        let count = commands.len();
        manager
            .with_transaction(move |conn| {
                Box::pin(async move {
                    for command in commands {
                        command.apply(&mut *conn, &stmt, &registry).await?;
                    }
                    Ok(())
                })
            })
            .await?;
        tracing::debug!(count, "committed write transaction");
        Ok(())
    }
}
