//! Training groups and invitation links.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use schedsync_core::{
    CoreError, DomainEvent, Group, GroupAddedEvent, GroupFilter, GroupId, UserId,
};
use tracing::{info, warn};

use crate::calendar_sync::CalendarSync;
use crate::error::ServiceResult;
use crate::publisher::EventPublisher;
use crate::store::GroupStore;

/// Length of generated invitation links.
pub const LINK_LENGTH: usize = 20;

/// Generates a random alphanumeric invitation link.
pub fn generate_link() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(LINK_LENGTH)
        .map(char::from)
        .collect()
}

/// Group lifecycle: creation, joining through links, deletion.
pub struct GroupService {
    store: Arc<dyn GroupStore>,
    calendar: Arc<CalendarSync>,
    publisher: Arc<EventPublisher>,
}

impl GroupService {
    pub fn new(
        store: Arc<dyn GroupStore>,
        calendar: Arc<CalendarSync>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            store,
            calendar,
            publisher,
        }
    }

    /// Creates an empty group owned by the trainer.
    pub async fn create_group(&self, trainer_id: UserId, name: String) -> ServiceResult<Group> {
        if name.trim().is_empty() {
            return Err(CoreError::blank("name").into());
        }
        let group = Group::new(name, trainer_id, generate_link());
        self.store.create_group(group.clone()).await?;
        info!(group_id = %group.id, trainer_id = %trainer_id, "group created");
        Ok(group)
    }

    /// Adds the student to the group behind `link` and announces it.
    ///
    /// A dropped announcement does not undo the join.
    pub async fn join_group(&self, student_id: UserId, link: String) -> ServiceResult<Group> {
        let group = self.store.add_student(link, student_id).await?;
        info!(group_id = %group.id, student_id = %student_id, "student joined group");

        let event = DomainEvent::GroupAdded(GroupAddedEvent::new(&group, student_id));
        if let Err(err) = self.publisher.publish(&event) {
            warn!(group_id = %group.id, error = %err, "group notification dropped");
        }
        Ok(group)
    }

    /// Lists groups by trainer and/or student.
    pub async fn get_groups(&self, filter: GroupFilter) -> ServiceResult<Vec<Group>> {
        filter.validate()?;
        Ok(self.store.groups(filter).await?)
    }

    /// Returns one group.
    pub async fn get_group(&self, group_id: GroupId) -> ServiceResult<Group> {
        Ok(self.store.group(group_id).await?)
    }

    /// Deletes a group owned by the trainer, and its calendar binding.
    pub async fn delete_group(&self, group_id: GroupId, trainer_id: UserId) -> ServiceResult<()> {
        self.store.delete_group(group_id, trainer_id).await?;
        self.calendar.release_group(group_id).await?;
        info!(group_id = %group_id, "group deleted");
        Ok(())
    }
}
