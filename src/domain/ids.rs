//! Type-safe identifiers for members and club events.
//!
//! [`MemberId`] and [`EventId`] are newtype wrappers around [`uuid::Uuid`]
//! (v4) so that the two identifier spaces cannot be confused with each
//! other or with other UUIDs. Member identities originate in the upstream
//! auth provider and are treated as opaque here.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque identifier for a club member.
///
/// Issued by the auth provider at signup and immutable thereafter. Used as
/// the dictionary key in [`super::LedgerBook`] and as the serialization
/// scope of member-directed bus events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct MemberId(uuid::Uuid);

/// Unique identifier for a ticketed club event.
///
/// Generated once when the event is opened. Used as the dictionary key in
/// [`super::EventRegistry`] and as the `reference` of `allocation_spend`
/// ledger entries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct EventId(uuid::Uuid);

macro_rules! uuid_id_impls {
    ($name:ident) => {
        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id_impls!(MemberId);
uuid_id_impls!(EventId);
