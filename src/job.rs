use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// Identifier of a job record.
pub type JobId = Uuid;

/// Lifecycle state of a job.
///
/// The storage only records these; transitions are driven by the job-processing
/// framework on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum JobState {
    /// Created, but not yet placed onto a queue.
    Created,
    /// Sitting in a queue, waiting to be fetched.
    Enqueued,
    /// Fetched by a worker.
    Processing,
    /// Processed successfully.
    Succeeded,
    /// Processing failed.
    Failed,
    /// Deleted by the framework or a user.
    Deleted,
}

impl JobState {
    pub(crate) const ALL: [JobState; 6] = [
        JobState::Created,
        JobState::Enqueued,
        JobState::Processing,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Deleted,
    ];
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Enqueued => "enqueued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<String> for JobState {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobState::ALL
            .into_iter()
            .find(|state| state.to_string() == value)
            .ok_or_else(|| format!("Unsupported job state: {}", value))
    }
}

/// Job details as seen by the monitoring API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    /// Job's identifier.
    pub id: JobId,

    /// Job's current state, if any has been set yet.
    pub state: Option<JobState>,

    /// Reference to the job's payload.
    ///
    /// The storage does not interpret it.
    pub data: serde_json::Value,

    /// Date and time when this job was created.
    pub created_at: DateTime<Utc>,

    /// When this job becomes eligible for cleanup, if ever.
    pub expire_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, PgRow> for JobDetails {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let id: Uuid = row.try_get("id")?;
        let state: Option<JobState> =
            row.try_get("state_name")
                .and_then(|v: Option<String>| match v {
                    None => Ok(None),
                    Some(v) => JobState::try_from(v).map(Some).map_err(|e| {
                        sqlx::Error::ColumnDecode {
                            index: "state_name".to_string(),
                            source: e.into(),
                        }
                    }),
                })?;
        let data: Option<serde_json::Value> = row.try_get("data")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let expire_at: Option<DateTime<Utc>> = row.try_get("expire_at")?;
        Ok(JobDetails {
            id,
            state,
            data: data.unwrap_or(serde_json::Value::Null),
            created_at,
            expire_at,
        })
    }
}
