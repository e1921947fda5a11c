//! Identifiers for drill entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! sequence_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

sequence_id! {
    /// Identity of a curriculum level.
    LevelId
}

sequence_id! {
    /// Identity of a persisted outcome.
    ///
    /// Assigned by the store in strictly increasing order and used as a
    /// logical timestamp. `OutcomeId::NONE` is the cursor of a checkpoint
    /// that has consumed nothing yet.
    OutcomeId
}

sequence_id! {
    /// Identity of a persisted checkpoint.
    CheckpointId
}

impl OutcomeId {
    /// Cursor value meaning "no outcome consumed".
    pub const NONE: OutcomeId = OutcomeId(0);
}

/// Identifier for a learner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnerId(pub String);

impl LearnerId {
    /// Create a new learner ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a training session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a new SessionId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_ids_order_numerically() {
        assert!(OutcomeId(9) < OutcomeId(10));
        assert_eq!(OutcomeId::default(), OutcomeId::NONE);
        assert_eq!("42".parse::<OutcomeId>().unwrap(), OutcomeId(42));
    }

    #[test]
    fn test_sequence_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&LevelId(7)).unwrap();
        assert_eq!(json, "7");
        let back: LevelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LevelId(7));
    }

    #[test]
    fn test_session_id_round_trips_through_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
