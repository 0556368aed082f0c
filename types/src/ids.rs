//! String identifiers for users, cities, modules and the records they own.
//!
//! Identifiers are opaque strings supplied by the surrounding platform; the
//! core only compares, hashes and orders them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A platform user (submitter, reviewer, payer or payee).
    UserId
);
string_id!(
    /// A city; reviewer pools and reputation are scoped per city.
    CityId
);
string_id!(
    /// The originating module of a submission ("rentals", "contests", ...).
    ModuleId
);
string_id!(
    /// A submission awaiting or past moderation.
    SubmissionId
);
string_id!(
    /// The order (or submission) an escrow hold is keyed by.
    OrderId
);
string_id!(
    /// A job whose completion is backed by a reputation stake.
    JobId
);

impl SubmissionId {
    /// Generate a fresh random submission id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl From<&SubmissionId> for OrderId {
    fn from(id: &SubmissionId) -> Self {
        Self(id.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = SubmissionId::generate();
        let b = SubmissionId::generate();
        assert_ne!(a, b);
        assert!(!a.is_blank());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UserId::new("alice");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
    }

    #[test]
    fn blank_detection() {
        assert!(CityId::new("  ").is_blank());
        assert!(!CityId::new("pune").is_blank());
    }

    #[test]
    fn submission_id_doubles_as_order_id() {
        let sid = SubmissionId::new("sub-1");
        assert_eq!(OrderId::from(&sid).as_str(), "sub-1");
    }
}
