//! Schedule rows and schedule queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::CalendarEvent;
use crate::ids::{GroupId, ScheduleId, UserId};
use crate::time::TimeWindow;

/// One booked session between a trainer and a single student.
///
/// A group booking fans out into one `Schedule` per student; each row
/// carries the same group, title, window and trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Row identifier.
    pub id: ScheduleId,
    /// Group the session belongs to.
    pub group_id: GroupId,
    /// Title shown in the participants' calendars.
    pub title: String,
    /// Session start.
    pub start: DateTime<Utc>,
    /// Session end.
    pub end: DateTime<Utc>,
    /// The trainer running the session.
    pub trainer_id: UserId,
    /// The student attending the session.
    pub student_id: UserId,
}

impl Schedule {
    /// Creates a schedule row with a freshly generated id.
    pub fn new(
        group_id: GroupId,
        title: impl Into<String>,
        window: TimeWindow,
        trainer_id: UserId,
        student_id: UserId,
    ) -> Self {
        Self {
            id: ScheduleId::generate(),
            group_id,
            title: title.into(),
            start: window.start,
            end: window.end,
            trainer_id,
            student_id,
        }
    }

    /// Returns the session window.
    pub fn window(&self) -> CoreResult<TimeWindow> {
        TimeWindow::new(self.start, self.end)
    }

    /// Returns the calendar event mirrored into participants' calendars.
    pub fn calendar_event(&self) -> CalendarEvent {
        CalendarEvent::new(self.title.clone(), self.start, self.end)
    }
}

/// Query over schedule rows.
///
/// At least one criterion must be set; set criteria are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFilter {
    /// Only rows in this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Only rows run by this trainer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_id: Option<UserId>,
    /// Only rows attended by this student.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<UserId>,
}

impl ScheduleFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: filter by group.
    pub fn group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Builder: filter by trainer.
    pub fn trainer(mut self, trainer_id: UserId) -> Self {
        self.trainer_id = Some(trainer_id);
        self
    }

    /// Builder: filter by student.
    pub fn student(mut self, student_id: UserId) -> Self {
        self.student_id = Some(student_id);
        self
    }

    /// Returns true if no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.group_id.is_none() && self.trainer_id.is_none() && self.student_id.is_none()
    }

    /// Rejects empty filters.
    pub fn validate(&self) -> CoreResult<()> {
        if self.is_empty() {
            return Err(CoreError::EmptyFilter {
                fields: "group_id, trainer_id, student_id",
            });
        }
        Ok(())
    }

    /// Returns true if the row satisfies every set criterion.
    pub fn matches(&self, schedule: &Schedule) -> bool {
        self.group_id.is_none_or(|id| id == schedule.group_id)
            && self.trainer_id.is_none_or(|id| id == schedule.trainer_id)
            && self.student_id.is_none_or(|id| id == schedule.student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn row_keeps_its_window() {
        let row = Schedule::new(
            GroupId::generate(),
            "Deadlifts",
            window(),
            UserId::generate(),
            UserId::generate(),
        );
        assert_eq!(row.window().unwrap(), window());
        assert_eq!(row.calendar_event().title, "Deadlifts");
    }

    #[test]
    fn empty_filter_is_rejected() {
        assert!(ScheduleFilter::new().validate().is_err());
        assert!(ScheduleFilter::new().trainer(UserId::generate()).validate().is_ok());
    }

    #[test]
    fn filter_combines_criteria() {
        let trainer = UserId::generate();
        let student = UserId::generate();
        let row = Schedule::new(GroupId::generate(), "Row", window(), trainer, student);

        assert!(ScheduleFilter::new().trainer(trainer).matches(&row));
        assert!(ScheduleFilter::new().trainer(trainer).student(student).matches(&row));
        assert!(!ScheduleFilter::new()
            .trainer(trainer)
            .student(UserId::generate())
            .matches(&row));
        assert!(!ScheduleFilter::new().group(GroupId::generate()).matches(&row));
    }

    #[test]
    fn calendar_event_mirrors_row() {
        let row = Schedule::new(
            GroupId::generate(),
            "Mobility",
            window(),
            UserId::generate(),
            UserId::generate(),
        );
        let event = row.calendar_event();
        assert_eq!(event.title, "Mobility");
        assert_eq!(event.start, row.start);
        assert_eq!(event.end, row.end);
    }
}
