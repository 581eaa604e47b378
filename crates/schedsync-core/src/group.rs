//! Groups of students owned by a trainer.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{GroupId, UserId};

/// A trainer's group. Students join through the invitation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier.
    pub id: GroupId,
    /// Display name, also used as the external calendar title.
    pub name: String,
    /// Owner of the group.
    pub trainer_id: UserId,
    /// Members in join order.
    #[serde(default)]
    pub student_ids: Vec<UserId>,
    /// Invitation link students present to join.
    pub link: String,
}

impl Group {
    /// Creates an empty group with a fresh id.
    pub fn new(name: impl Into<String>, trainer_id: UserId, link: impl Into<String>) -> Self {
        Self {
            id: GroupId::generate(),
            name: name.into(),
            trainer_id,
            student_ids: Vec::new(),
            link: link.into(),
        }
    }

    /// Returns true if the user is a student of this group.
    pub fn has_student(&self, user_id: UserId) -> bool {
        self.student_ids.contains(&user_id)
    }

    /// Returns true if the user is the trainer or one of the students.
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.trainer_id == user_id || self.has_student(user_id)
    }
}

/// Query over groups by participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFilter {
    /// Groups owned by this trainer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_id: Option<UserId>,
    /// Groups this student belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<UserId>,
}

impl GroupFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
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

    /// Rejects empty filters.
    pub fn validate(&self) -> CoreResult<()> {
        if self.trainer_id.is_none() && self.student_id.is_none() {
            return Err(CoreError::EmptyFilter {
                fields: "trainer_id, student_id",
            });
        }
        Ok(())
    }

    /// Returns true if the group satisfies every set criterion.
    pub fn matches(&self, group: &Group) -> bool {
        self.trainer_id.is_none_or(|id| id == group.trainer_id)
            && self.student_id.is_none_or(|id| group.has_student(id))
    }
}
