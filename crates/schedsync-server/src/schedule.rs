//! Booking workflow.
//!
//! A booking mirrors the session into the trainer's and the student's
//! calendars, persists the row and announces it. Steps run strictly in
//! that order and the first failure aborts the booking. Nothing is rolled
//! back: a trainer event created before a failing student step stays in
//! the trainer's calendar.

use std::sync::Arc;

use schedsync_core::{
    CalendarEvent, CoreError, CoreResult, DomainEvent, GroupId, Schedule, ScheduleFilter,
    TimeWindow, UserId,
};
use tracing::{debug, info, warn};

use crate::calendar_sync::CalendarSync;
use crate::error::{ServiceError, ServiceResult};
use crate::publisher::EventPublisher;
use crate::store::{GroupStore, ScheduleStore};

/// End-to-end booking use cases.
pub struct ScheduleWorkflow {
    calendar: Arc<CalendarSync>,
    schedules: Arc<dyn ScheduleStore>,
    groups: Arc<dyn GroupStore>,
    publisher: Arc<EventPublisher>,
}

impl ScheduleWorkflow {
    pub fn new(
        calendar: Arc<CalendarSync>,
        schedules: Arc<dyn ScheduleStore>,
        groups: Arc<dyn GroupStore>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            calendar,
            schedules,
            groups,
            publisher,
        }
    }

    /// Books a session for one student.
    pub async fn create_schedule(&self, schedule: Schedule) -> ServiceResult<()> {
        validate(&schedule.title, schedule.window())?;
        let event = schedule.calendar_event();

        self.calendar
            .ensure_event_created(schedule.trainer_id, schedule.group_id, &event)
            .await?;
        self.calendar
            .ensure_event_created(schedule.student_id, schedule.group_id, &event)
            .await?;

        self.persist_and_announce(schedule).await
    }

    /// Books a session for every student of the group.
    ///
    /// A failure part-way leaves the students booked so far in place.
    pub async fn create_schedule_for_group(
        &self,
        group_id: GroupId,
        title: String,
        window: TimeWindow,
        trainer_id: UserId,
    ) -> ServiceResult<usize> {
        validate(&title, Ok(window))?;

        let group = self.groups.group(group_id).await?;
        if group.trainer_id != trainer_id {
            return Err(ServiceError::permission_denied(format!(
                "user {trainer_id} does not run group {group_id}"
            )));
        }

        let event = CalendarEvent::new(title.clone(), window.start, window.end);
        self.calendar
            .ensure_event_created(trainer_id, group_id, &event)
            .await?;

        let mut booked = 0;
        for student_id in &group.student_ids {
            self.calendar
                .ensure_event_created(*student_id, group_id, &event)
                .await?;
            let row = Schedule::new(group_id, title.clone(), window, trainer_id, *student_id);
            self.persist_and_announce(row).await?;
            booked += 1;
        }

        info!(group_id = %group_id, booked, "group session booked");
        Ok(booked)
    }

    /// Lists rows matching the filter. At least one criterion is required.
    pub async fn get_schedules(&self, filter: ScheduleFilter) -> ServiceResult<Vec<Schedule>> {
        filter.validate()?;
        Ok(self.schedules.schedules(filter).await?)
    }

    /// Deletes every row of the group run by the trainer.
    pub async fn delete_schedule(
        &self,
        group_id: GroupId,
        trainer_id: UserId,
    ) -> ServiceResult<usize> {
        let deleted = self.schedules.delete_schedules(group_id, trainer_id).await?;
        debug!(group_id = %group_id, deleted, "schedules deleted");
        Ok(deleted)
    }

    async fn persist_and_announce(&self, schedule: Schedule) -> ServiceResult<()> {
        let event = DomainEvent::schedule_created(&schedule);
        let schedule_id = schedule.id;
        self.schedules.create_schedule(schedule).await?;

        if let Err(err) = self.publisher.publish(&event) {
            warn!(schedule_id = %schedule_id, error = %err, "schedule notification dropped");
        }
        Ok(())
    }
}

fn validate(title: &str, window: CoreResult<TimeWindow>) -> CoreResult<TimeWindow> {
    if title.trim().is_empty() {
        return Err(CoreError::blank("title"));
    }
    window
}
