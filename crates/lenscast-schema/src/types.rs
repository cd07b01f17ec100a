//! Newtype wrappers for string identifiers, plus the lens-type and
//! access-hint enums shared across the workspace.
//!
//! All newtypes serialize/deserialize as plain strings.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Catalog item identifier, owned by the external catalog subsystem.
    ItemId
);

string_newtype!(
    /// Truncated blake3 digest over a canonicalized lens payload.
    PayloadChecksum
);

/// The three lens tiers, strictly nested by field superset:
/// Card ⊆ Quickview ⊆ Playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensType {
    Card,
    Quickview,
    Playback,
}

impl LensType {
    /// All lens types, in ascending tier order. Used by refresh to
    /// regenerate every projection of an item.
    pub const ALL: [LensType; 3] = [LensType::Card, LensType::Quickview, LensType::Playback];

    pub fn as_str(self) -> &'static str {
        match self {
            LensType::Card => "card",
            LensType::Quickview => "quickview",
            LensType::Playback => "playback",
        }
    }
}

impl FromStr for LensType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(LensType::Card),
            "quickview" => Ok(LensType::Quickview),
            "playback" => Ok(LensType::Playback),
            other => Err(SchemaError::UnknownLensType(other.to_owned())),
        }
    }
}

impl fmt::Display for LensType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of how an item may be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessHint {
    Free,
    Purchase,
    Rental,
    Subscription,
    Owned,
}

impl AccessHint {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessHint::Free => "free",
            AccessHint::Purchase => "purchase",
            AccessHint::Rental => "rental",
            AccessHint::Subscription => "subscription",
            AccessHint::Owned => "owned",
        }
    }
}
