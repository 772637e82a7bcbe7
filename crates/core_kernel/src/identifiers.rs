//! Strongly-typed identifiers for domain entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types. Chargeable entities
//! (reservations, events, equipment loans) live outside this core and are
//! addressed by a tagged key instead: an entity-kind discriminant plus the
//! owning system's numeric id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Ledger domain identifiers
define_id!(UserId, "USR");
define_id!(LedgerTransactionId, "LTX");
define_id!(AllocationId, "ALC");

// Billing domain identifiers
define_id!(ChargeId, "CHG");

/// The kind of domain entity a charge is attached to
///
/// Replaces a stringly-typed polymorphic foreign key with a closed
/// discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeableKind {
    Reservation,
    Event,
    EquipmentLoan,
}

impl ChargeableKind {
    /// Returns the stable storage tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeableKind::Reservation => "reservation",
            ChargeableKind::Event => "event",
            ChargeableKind::EquipmentLoan => "equipment_loan",
        }
    }
}

impl fmt::Display for ChargeableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChargeableKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reservation" => Ok(ChargeableKind::Reservation),
            "event" => Ok(ChargeableKind::Event),
            "equipment_loan" => Ok(ChargeableKind::EquipmentLoan),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Error for an unrecognized chargeable kind tag
#[derive(Debug, thiserror::Error)]
#[error("unknown chargeable kind: {0}")]
pub struct UnknownKind(pub String);

/// Stable identity of a chargeable entity: kind plus the owning system's id
///
/// A charge row is unique per key; the ledger core never dereferences the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChargeableKey {
    pub kind: ChargeableKind,
    pub id: i64,
}

impl ChargeableKey {
    pub fn new(kind: ChargeableKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ChargeableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        let id = UserId::new();
        let s = id.to_string();
        assert!(s.starts_with("USR-"));
    }

    #[test]
    fn test_id_roundtrip() {
        let id = ChargeId::new_v7();
        let parsed: ChargeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_parse_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: UserId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &uuid);
    }

    #[test]
    fn test_chargeable_kind_roundtrip() {
        for kind in [
            ChargeableKind::Reservation,
            ChargeableKind::Event,
            ChargeableKind::EquipmentLoan,
        ] {
            let parsed: ChargeableKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("invoice".parse::<ChargeableKind>().is_err());
    }

    #[test]
    fn test_chargeable_key_display() {
        let key = ChargeableKey::new(ChargeableKind::Reservation, 42);
        assert_eq!(key.to_string(), "reservation/42");
    }
}
