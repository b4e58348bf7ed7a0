use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Domain tag mixed into every identity hash. Changing it re-keys every
/// graph ever built, so it is versioned rather than edited.
const IDENTITY_DOMAIN: &str = "lineage-identity-v1";

/// Content hash identifying one node or edge in the lineage graph.
///
/// A `ContentHash` is the BLAKE3 digest of an entity's class tag and external
/// identifier. The same pair always yields the same hash, in every process
/// and across releases, so it doubles as the dedup key in the graph store and
/// as the cache key when resolving graph entities back to domain objects.
///
/// Serialized as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap a pre-computed digest.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Compute the content hash for a domain object or action.
///
/// Both fields are length-prefixed before hashing so that no two distinct
/// `(class_tag, external_id)` pairs share an input byte stream. Fails with
/// [`IdentityError::InvalidIdentity`] when a field is empty, blank, or
/// contains a NUL byte.
pub fn compute_hash(class_tag: &str, external_id: &str) -> Result<ContentHash, IdentityError> {
    validate_field("class_tag", class_tag)?;
    validate_field("external_id", external_id)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(IDENTITY_DOMAIN.as_bytes());
    hasher.update(b":");
    for field in [class_tag, external_id] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    Ok(ContentHash(*hasher.finalize().as_bytes()))
}

fn validate_field(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.trim().is_empty() {
        return Err(IdentityError::InvalidIdentity {
            field,
            reason: "must not be empty".into(),
        });
    }
    if value.contains('\0') {
        return Err(IdentityError::InvalidIdentity {
            field,
            reason: "must not contain NUL bytes".into(),
        });
    }
    Ok(())
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for ContentHash {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_is_deterministic() {
        let a = compute_hash("DataSample", "V0123").unwrap();
        let b = compute_hash("DataSample", "V0123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn class_tag_participates_in_hash() {
        let sample = compute_hash("DataSample", "V0123").unwrap();
        let action = compute_hash("Action", "V0123").unwrap();
        assert_ne!(sample, action);
    }

    #[test]
    fn external_id_participates_in_hash() {
        let h = compute_hash("Study", "S1").unwrap();
        assert_eq!(h.to_hex().len(), 64);
        assert_ne!(h, compute_hash("Study", "S2").unwrap());
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(matches!(
            compute_hash("", "V1"),
            Err(IdentityError::InvalidIdentity { field: "class_tag", .. })
        ));
        assert!(matches!(
            compute_hash("Study", "   "),
            Err(IdentityError::InvalidIdentity { field: "external_id", .. })
        ));
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let err = compute_hash("Study", "S\01").unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = compute_hash("Device", "D-7").unwrap();
        assert_eq!(ContentHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_rejects_short_input() {
        assert_eq!(
            ContentHash::from_hex("abcd"),
            Err(IdentityError::InvalidLength {
                expected: 32,
                actual: 2
            })
        );
        assert!(matches!(
            ContentHash::from_hex("zz"),
            Err(IdentityError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_hex_string() {
        let h = compute_hash("Device", "D-7").unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn debug_shows_short_hex() {
        let h = compute_hash("Device", "D-7").unwrap();
        assert_eq!(format!("{h:?}"), format!("ContentHash({})", h.short_hex()));
        assert_eq!(h.short_hex().len(), 8);
    }

    proptest! {
        #[test]
        fn field_boundary_is_unambiguous(a in "[a-z]{1,8}", b in "[a-z]{1,8}", c in "[a-z]{1,8}") {
            let left = compute_hash(&format!("{a}{b}"), &c).unwrap();
            let right = compute_hash(&a, &format!("{b}{c}")).unwrap();
            prop_assert_ne!(left, right);
        }

        #[test]
        fn recomputation_matches(tag in "[A-Za-z]{1,16}", id in "[A-Za-z0-9:-]{1,24}") {
            prop_assert_eq!(compute_hash(&tag, &id).unwrap(), compute_hash(&tag, &id).unwrap());
        }
    }
}
