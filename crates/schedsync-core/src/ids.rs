//! Strongly typed identifiers.
//!
//! Users, groups and schedules are all keyed by UUIDs. Wrapping each in its
//! own newtype keeps a trainer id from being passed where a group id is
//! expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            pub const fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parses an identifier from its hyphenated string form.
            pub fn parse(value: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|_| CoreError::invalid_id($kind, value))
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifies a trainer or a student.
    UserId,
    "user"
);
uuid_id!(
    /// Identifies a group of students owned by a trainer.
    GroupId,
    "group"
);
uuid_id!(
    /// Identifies one persisted schedule row.
    ScheduleId,
    "schedule"
);
