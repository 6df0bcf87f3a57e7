//! Typed identifiers
//!
//! String-backed ids are transparent in serde so stored records stay plain strings.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create id from any string-like value
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw id
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Participant identity (the attendee's email in practice)
    ParticipantId
);
string_id!(
    /// Lab identifier in the content catalog
    LabId
);
string_id!(
    /// Step identifier, unique across the catalog
    StepId
);
string_id!(
    /// Quest identifier (challenge mode)
    QuestId
);
string_id!(
    /// Flag identifier (challenge mode)
    FlagId
);
string_id!(
    /// Workshop template identifier
    TemplateId
);

/// Workshop session identifier (`ws_` prefixed ULID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    const PREFIX: &'static str = "ws_";

    /// Generate a fresh session id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Ulid::new().to_string().to_lowercase()))
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ModelError::InvalidIdentifier {
                kind: "session",
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordinal lab number used by unlock rules and lab timing
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LabNumber(pub u32);

impl LabNumber {
    /// The first lab, always accessible
    pub const FIRST: Self = Self(1);

    /// Get numeric value
    #[inline]
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LabNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LabNumber {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("lab").trim_start_matches('-');
        digits
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(Self)
            .ok_or_else(|| ModelError::InvalidIdentifier {
                kind: "lab number",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_prefix_and_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert!(a.as_str().starts_with("ws_"));
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_rejects_blank() {
        assert!("  ".parse::<SessionId>().is_err());
        assert!("ws_1".parse::<SessionId>().is_ok());
    }

    #[test]
    fn lab_number_parses_legacy_forms() {
        assert_eq!("2".parse::<LabNumber>().unwrap(), LabNumber(2));
        assert_eq!("lab3".parse::<LabNumber>().unwrap(), LabNumber(3));
        assert_eq!("lab-1".parse::<LabNumber>().unwrap(), LabNumber(1));
        assert!("lab0".parse::<LabNumber>().is_err());
        assert!("intro".parse::<LabNumber>().is_err());
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let id = ParticipantId::new("ada@example.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ada@example.com\"");
    }
}
