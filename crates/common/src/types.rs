//! Common data types for Temp Voice components.
//!
//! Every identifier handed to us by the provider is a 64-bit snowflake.
//! Each kind gets its own newtype so a member id can never be passed where a
//! resource id is expected. Postgres has no unsigned 64-bit column type, so
//! the ids are stored as `BIGINT` via [`to_db`](CommunityId::to_db) /
//! [`from_db`](CommunityId::from_db).

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw snowflake value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Value as stored in a `BIGINT` column.
            ///
            /// Snowflakes use 63 bits, so the cast never wraps for ids the
            /// provider actually issues.
            #[must_use]
            #[allow(clippy::cast_possible_wrap)]
            pub const fn to_db(self) -> i64 {
                self.0 as i64
            }

            /// Read an id back from a `BIGINT` column.
            ///
            /// # Errors
            ///
            /// Returns [`CommonError::InvalidId`] for negative values.
            pub fn from_db(value: i64) -> Result<Self, CommonError> {
                u64::try_from(value)
                    .map(Self)
                    .map_err(|_| CommonError::InvalidId(value))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// A community (guild) that sessions and access lists are scoped to.
    CommunityId
);

snowflake_id!(
    /// A community member: room owners, ACL subjects and interaction actors.
    MemberId
);

snowflake_id!(
    /// A channel-like resource: trigger rooms, live rooms, parent categories.
    ResourceId
);

snowflake_id!(
    /// A rendered message carrying interactive components.
    SurfaceId
);

snowflake_id!(
    /// A single interaction delivered by the provider.
    InteractionId
);

/// Identity of a session: one per owner per community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerKey {
    pub community_id: CommunityId,
    pub owner_id: MemberId,
}

impl OwnerKey {
    #[must_use]
    pub const fn new(community_id: CommunityId, owner_id: MemberId) -> Self {
        Self {
            community_id,
            owner_id,
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.community_id, self.owner_id)
    }
}
