/// Errors from resolving graph entities to domain objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The domain store no longer holds the referenced object.
    #[error("{class_tag}:{external_id} not found in the domain store")]
    NotFound {
        class_tag: String,
        external_id: String,
    },

    /// The domain store failed to answer.
    #[error("domain store error: {0}")]
    Domain(String),
}

/// Result alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
