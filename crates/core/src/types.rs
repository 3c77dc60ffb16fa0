/// Job primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Museum, city and prediction rows use UUIDv7 identities.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
