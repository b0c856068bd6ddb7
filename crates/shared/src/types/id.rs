//! Typed IDs for type-safe entity references.
//!
//! The back-office service keys its records with integer primary keys.
//! Wrapping them prevents accidentally passing a `BatchId` where an
//! `InvoiceId` is expected.

use serde::{Deserialize, Serialize};

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Creates an ID from a raw key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw key.
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

typed_id!(InvoiceId, "Unique identifier for an invoice.");
typed_id!(BatchId, "Unique identifier for a stock batch.");
typed_id!(ProductId, "Unique identifier for a product.");
typed_id!(ShopId, "Unique identifier for a shop.");
typed_id!(
    SettlementId,
    "Unique identifier for a recorded settlement transaction."
);
