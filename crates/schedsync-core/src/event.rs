//! Calendar events and domain events.
//!
//! [`CalendarEvent`] is the transient payload mirrored into a participant's
//! external calendar. [`DomainEvent`] is an immutable fact handed to the
//! event publisher once a booking or membership change has been persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::Group;
use crate::ids::{GroupId, ScheduleId, UserId};
use crate::schedule::Schedule;

/// Topic for newly persisted schedule rows.
pub const TOPIC_SCHEDULE_CREATED: &str = "schedule.schedule.created";
/// Topic for modified schedule rows.
pub const TOPIC_SCHEDULE_UPDATED: &str = "schedule.schedule.updated";
/// Topic for students joining a group.
pub const TOPIC_GROUP_ADDED: &str = "group.group.added";

/// An event as written to an external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Event summary.
    pub title: String,
    /// Event start.
    pub start: DateTime<Utc>,
    /// Event end.
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// Creates a calendar event.
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start,
            end,
        }
    }
}

/// Payload of schedule notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub schedule_id: ScheduleId,
    pub group_id: GroupId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub trainer_id: UserId,
    pub student_id: UserId,
}

impl From<&Schedule> for ScheduleEvent {
    fn from(schedule: &Schedule) -> Self {
        Self {
            schedule_id: schedule.id,
            group_id: schedule.group_id,
            title: schedule.title.clone(),
            start: schedule.start,
            end: schedule.end,
            trainer_id: schedule.trainer_id,
            student_id: schedule.student_id,
        }
    }
}

/// Payload of group membership notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAddedEvent {
    pub group_id: GroupId,
    pub group_name: String,
    pub trainer_id: UserId,
    pub student_id: UserId,
    pub link: String,
}

impl GroupAddedEvent {
    /// Builds the notification for a student who joined the group.
    pub fn new(group: &Group, student_id: UserId) -> Self {
        Self {
            group_id: group.id,
            group_name: group.name.clone(),
            trainer_id: group.trainer_id,
            student_id,
            link: group.link.clone(),
        }
    }
}

/// Immutable facts emitted to the message broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    ScheduleCreated(ScheduleEvent),
    ScheduleUpdated(ScheduleEvent),
    GroupAdded(GroupAddedEvent),
}

impl DomainEvent {
    /// Creates a `ScheduleCreated` event for a persisted row.
    pub fn schedule_created(schedule: &Schedule) -> Self {
        Self::ScheduleCreated(schedule.into())
    }

    /// Creates a `ScheduleUpdated` event for a modified row.
    pub fn schedule_updated(schedule: &Schedule) -> Self {
        Self::ScheduleUpdated(schedule.into())
    }

    /// Returns the broker topic this event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ScheduleCreated(_) => TOPIC_SCHEDULE_CREATED,
            Self::ScheduleUpdated(_) => TOPIC_SCHEDULE_UPDATED,
            Self::GroupAdded(_) => TOPIC_GROUP_ADDED,
        }
    }

    /// Returns the key events are partitioned by: the owning group.
    pub fn partition_key(&self) -> String {
        match self {
            Self::ScheduleCreated(e) | Self::ScheduleUpdated(e) => e.group_id.to_string(),
            Self::GroupAdded(e) => e.group_id.to_string(),
        }
    }

    /// Serializes the event body as JSON.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::ScheduleCreated(e) | Self::ScheduleUpdated(e) => serde_json::to_value(e),
            Self::GroupAdded(e) => serde_json::to_value(e),
        }
    }
}
