/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Job identifiers are time-ordered UUIDs so ids sort by creation.
pub type JobId = uuid::Uuid;
