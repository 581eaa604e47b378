//! Core types: identifiers, schedules, groups, calendar events, domain events

pub mod error;
pub mod event;
pub mod group;
pub mod ids;
pub mod schedule;
pub mod time;
pub mod tracing;

pub use error::{CoreError, CoreResult};
pub use event::{
    CalendarEvent, DomainEvent, GroupAddedEvent, ScheduleEvent, TOPIC_GROUP_ADDED,
    TOPIC_SCHEDULE_CREATED, TOPIC_SCHEDULE_UPDATED,
};
pub use group::{Group, GroupFilter};
pub use ids::{GroupId, ScheduleId, UserId};
pub use schedule::{Schedule, ScheduleFilter};
pub use time::TimeWindow;
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
