use crate::error::IdentityError;
use crate::hash::{compute_hash, ContentHash};

/// Anything that can be placed in the lineage graph.
///
/// Implemented by the surrounding system's domain objects and actions. Both
/// values must be stable for the lifetime of the object: they are hashed into
/// the graph key and used to fetch the object back from the domain store.
pub trait Identified {
    /// Name of the most-derived domain type (e.g. `"DataSample"`).
    fn class_tag(&self) -> &str;

    /// Identifier of this object in the domain store.
    fn external_id(&self) -> &str;

    /// Content hash of this object's identity.
    fn content_hash(&self) -> Result<ContentHash, IdentityError> {
        compute_hash(self.class_tag(), self.external_id())
    }
}
