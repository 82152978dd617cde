use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Default, FromRow)]
pub(crate) struct App {
    pub(crate) version: i32,
    pub(crate) installed_on: DateTime<Utc>,
}
