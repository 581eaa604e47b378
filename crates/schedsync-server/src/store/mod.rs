//! Storage traits.
//!
//! The orchestrator and workflows only see these object-safe traits; the
//! backing implementation is injected at startup. [`memory`] provides
//! in-process implementations.

pub mod memory;

use std::time::Duration;

use schedsync_calendar::BoxFuture;
use schedsync_core::{Group, GroupFilter, GroupId, Schedule, ScheduleFilter, UserId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store for sessions and login state.
pub trait CredentialStore: Send + Sync {
    /// Stores a value. A zero `ttl` means the entry never expires.
    fn set(&self, key: String, value: String, ttl: Duration) -> BoxFuture<'_, StoreResult<()>>;

    /// Returns the value, or `None` if absent or expired.
    fn get(&self, key: String) -> BoxFuture<'_, StoreResult<Option<String>>>;

    /// Removes the value. Removing an absent key succeeds.
    fn delete(&self, key: String) -> BoxFuture<'_, StoreResult<()>>;
}

/// Mapping from a group to its external calendar.
pub trait CalendarBindingStore: Send + Sync {
    /// Returns the bound calendar id.
    fn calendar_for(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<Option<String>>>;

    /// Binds the group to a calendar, replacing any previous binding.
    fn bind(&self, group_id: GroupId, calendar_id: String) -> BoxFuture<'_, StoreResult<()>>;

    /// Removes the binding. Removing an absent binding succeeds.
    fn unbind(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<()>>;
}

/// Relational store for schedule rows.
pub trait ScheduleStore: Send + Sync {
    /// Persists a row.
    fn create_schedule(&self, schedule: Schedule) -> BoxFuture<'_, StoreResult<()>>;

    /// Returns the rows matching every set criterion, ordered by start.
    fn schedules(&self, filter: ScheduleFilter) -> BoxFuture<'_, StoreResult<Vec<Schedule>>>;

    /// Deletes every row of the group run by the trainer. Returns the count.
    fn delete_schedules(
        &self,
        group_id: GroupId,
        trainer_id: UserId,
    ) -> BoxFuture<'_, StoreResult<usize>>;
}

/// Relational store for groups.
pub trait GroupStore: Send + Sync {
    /// Persists a new group.
    fn create_group(&self, group: Group) -> BoxFuture<'_, StoreResult<()>>;

    /// Adds a student to the group owning `link` and returns the group.
    ///
    /// Fails with [`StoreError::NotFound`] for an unknown link and
    /// [`StoreError::Conflict`] if the user already participates.
    fn add_student(&self, link: String, student_id: UserId) -> BoxFuture<'_, StoreResult<Group>>;

    /// Returns the groups matching the filter.
    fn groups(&self, filter: GroupFilter) -> BoxFuture<'_, StoreResult<Vec<Group>>>;

    /// Returns a single group.
    fn group(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<Group>>;

    /// Deletes a group owned by the trainer.
    fn delete_group(&self, group_id: GroupId, trainer_id: UserId)
    -> BoxFuture<'_, StoreResult<()>>;
}
