//! In-memory store implementations.
//!
//! Used by tests and single-node deployments. State is lost on restart.

use std::collections::HashMap;
use std::time::Duration;

use schedsync_calendar::BoxFuture;
use schedsync_core::{Group, GroupFilter, GroupId, Schedule, ScheduleFilter, UserId};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

use super::{
    CalendarBindingStore, CredentialStore, GroupStore, ScheduleStore, StoreError, StoreResult,
};

/// A stored credential value with optional expiry.
#[derive(Debug, Clone)]
struct CredentialEntry {
    value: String,
    /// `None` for entries stored with a zero TTL.
    expires_at: Option<Instant>,
}

impl CredentialEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// TTL-aware credential store. Expired entries are purged on access.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, CredentialEntry>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    /// Returns true if there are no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn set(&self, key: String, value: String, ttl: Duration) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            trace!(key = %key, ttl_secs = ttl.as_secs(), "storing credential");
            self.entries
                .write()
                .await
                .insert(key, CredentialEntry::new(value, ttl));
            Ok(())
        })
    }

    fn get(&self, key: String) -> BoxFuture<'_, StoreResult<Option<String>>> {
        Box::pin(async move {
            {
                let entries = self.entries.read().await;
                match entries.get(&key) {
                    None => return Ok(None),
                    Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                    Some(_) => {}
                }
            }

            trace!(key = %key, "purging expired credential");
            let mut entries = self.entries.write().await;
            if entries.get(&key).is_some_and(CredentialEntry::is_expired) {
                entries.remove(&key);
            }
            Ok(None)
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.entries.write().await.remove(&key);
            Ok(())
        })
    }
}

/// Group to calendar bindings.
#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    bindings: RwLock<HashMap<GroupId, String>>,
}

impl MemoryBindingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalendarBindingStore for MemoryBindingStore {
    fn calendar_for(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<Option<String>>> {
        Box::pin(async move { Ok(self.bindings.read().await.get(&group_id).cloned()) })
    }

    fn bind(&self, group_id: GroupId, calendar_id: String) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.bindings.write().await.insert(group_id, calendar_id);
            Ok(())
        })
    }

    fn unbind(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.bindings.write().await.remove(&group_id);
            Ok(())
        })
    }
}

/// Schedule rows.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    rows: RwLock<Vec<Schedule>>,
}

impl MemoryScheduleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn create_schedule(&self, schedule: Schedule) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let mut rows = self.rows.write().await;
            if rows.iter().any(|r| r.id == schedule.id) {
                return Err(StoreError::Conflict(format!(
                    "schedule {} already exists",
                    schedule.id
                )));
            }
            rows.push(schedule);
            Ok(())
        })
    }

    fn schedules(&self, filter: ScheduleFilter) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(async move {
            let mut found: Vec<Schedule> = self
                .rows
                .read()
                .await
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            found.sort_by_key(|r| r.start);
            Ok(found)
        })
    }

    fn delete_schedules(
        &self,
        group_id: GroupId,
        trainer_id: UserId,
    ) -> BoxFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            let mut rows = self.rows.write().await;
            let before = rows.len();
            rows.retain(|r| !(r.group_id == group_id && r.trainer_id == trainer_id));
            Ok(before - rows.len())
        })
    }
}

/// Groups and their memberships.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl MemoryGroupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStore for MemoryGroupStore {
    fn create_group(&self, group: Group) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let mut groups = self.groups.write().await;
            if groups.values().any(|g| g.id == group.id || g.link == group.link) {
                return Err(StoreError::Conflict(format!(
                    "group {} already exists",
                    group.id
                )));
            }
            groups.insert(group.id, group);
            Ok(())
        })
    }

    fn add_student(&self, link: String, student_id: UserId) -> BoxFuture<'_, StoreResult<Group>> {
        Box::pin(async move {
            let mut groups = self.groups.write().await;
            let group = groups
                .values_mut()
                .find(|g| g.link == link)
                .ok_or_else(|| StoreError::NotFound(format!("group with link {link}")))?;

            if group.is_participant(student_id) {
                return Err(StoreError::Conflict(format!(
                    "user {student_id} already participates in group {}",
                    group.id
                )));
            }

            group.student_ids.push(student_id);
            Ok(group.clone())
        })
    }

    fn groups(&self, filter: GroupFilter) -> BoxFuture<'_, StoreResult<Vec<Group>>> {
        Box::pin(async move {
            let mut found: Vec<Group> = self
                .groups
                .read()
                .await
                .values()
                .filter(|g| filter.matches(g))
                .cloned()
                .collect();
            found.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(found)
        })
    }

    fn group(&self, group_id: GroupId) -> BoxFuture<'_, StoreResult<Group>> {
        Box::pin(async move {
            self.groups
                .read()
                .await
                .get(&group_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))
        })
    }

    fn delete_group(
        &self,
        group_id: GroupId,
        trainer_id: UserId,
    ) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let mut groups = self.groups.write().await;
            match groups.get(&group_id) {
                Some(group) if group.trainer_id == trainer_id => {
                    groups.remove(&group_id);
                    Ok(())
                }
                _ => Err(StoreError::NotFound(format!(
                    "group {group_id} owned by {trainer_id}"
                ))),
            }
        })
    }
}
