//! Identity types for SCOUT entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a row in the configuration store.
pub type ConfigId = Uuid;

/// Identifier of a consumer request handled by the coordinator.
pub type RequestId = Uuid;

/// Identifier of a research job tracked by the scheduler.
pub type JobId = Uuid;

/// Opaque identifier of one cache build. Regenerated on every rebuild.
pub type SessionId = Uuid;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}
