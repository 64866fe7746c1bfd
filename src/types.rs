//! Validated domain identifiers for the wallet engine.
//!
//! All identifier types follow the "parse, don't validate" principle, using
//! smart constructors so that a successfully parsed value is guaranteed valid
//! for the lifetime of the program. Identifiers are opaque: they are compared
//! by equality only and carry no structural meaning beyond non-emptiness.
//!
//! Monetary amounts are deliberately *not* a validated newtype. Amounts are
//! raw `i64` minor units (cents) everywhere: a non-positive transfer amount
//! must reach the engine and be rejected as a business rule (producing a
//! persisted failure event), not at construction time.

use nutype::nutype;
use uuid::Uuid;

/// An opaque account identifier.
///
/// Accounts are identified by a caller-supplied string. Once constructed, an
/// `AccountId` is guaranteed to be non-empty (after trimming) and at most 255
/// characters.
///
/// # Examples
///
/// ```
/// use walletcore::AccountId;
///
/// let account = AccountId::try_new("alice").expect("valid account id");
/// assert_eq!(account.as_ref(), "alice");
///
/// assert!(AccountId::try_new("").is_err());
/// assert!(AccountId::try_new("   ").is_err());
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AccountId(String);

/// A caller-supplied transaction identifier used for deduplication.
///
/// Uniqueness within the lifetime of the event log is the caller's
/// responsibility; the engine deduplicates by equality. Guaranteed non-empty
/// (after trimming) and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generates a fresh unique `TransactionId`.
    ///
    /// Backed by a UUIDv7, so generated ids are unique with extremely high
    /// probability and sort roughly by creation time. Callers that bring
    /// their own id scheme can use [`TransactionId::try_new`] instead.
    pub fn generate() -> Self {
        Self::try_new(format!("txn-{}", Uuid::now_v7().simple()))
            .expect("generated transaction id is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn account_id_trims_whitespace() {
        let account = AccountId::try_new("  alice  ").expect("valid account id");
        assert_eq!(account.as_ref(), "alice");
    }

    #[test]
    fn account_id_rejects_empty_and_whitespace() {
        assert!(AccountId::try_new("").is_err());
        assert!(AccountId::try_new("   ").is_err());
        assert!(AccountId::try_new("\t\n").is_err());
    }

    #[test]
    fn account_id_rejects_over_255_chars() {
        assert!(AccountId::try_new("a".repeat(256)).is_err());
        assert!(AccountId::try_new("a".repeat(255)).is_ok());
    }

    #[test]
    fn transaction_id_generate_is_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
        assert!(a.starts_with("txn-"));
    }

    proptest! {
        #[test]
        fn account_id_accepts_valid_strings(s in "[a-zA-Z0-9_-]{1,255}") {
            let account = AccountId::try_new(s.clone()).expect("valid account id");
            prop_assert_eq!(account.as_ref(), &s);
        }

        #[test]
        fn transaction_id_roundtrip_serialization(s in "[a-zA-Z0-9_-]{1,64}") {
            let id = TransactionId::try_new(s).expect("valid transaction id");
            let json = serde_json::to_string(&id).expect("serializes");
            let back: TransactionId = serde_json::from_str(&json).expect("deserializes");
            prop_assert_eq!(id, back);
        }
    }
}
