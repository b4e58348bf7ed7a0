use lineage_resolver::ResolveError;
use lineage_store::GraphError;
use lineage_types::{ContentHash, EndpointRole, IdentityError};

/// Errors surfaced by [`DependencyTree`](crate::DependencyTree).
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),

    #[error("graph store unreachable: {0}")]
    Connectivity(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("unmapped {role} node {hash}, unable to create the edge")]
    UnmappedNode {
        role: EndpointRole,
        hash: ContentHash,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query cancelled: {0}")]
    Cancelled(&'static str),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<GraphError> for TreeError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Connectivity(msg) => Self::Connectivity(msg),
            GraphError::UnmappedNode { role, hash } => Self::UnmappedNode { role, hash },
            other @ (GraphError::Integrity { .. } | GraphError::Conflict { .. }) => {
                Self::Integrity(other.to_string())
            }
            GraphError::Backend(msg) => Self::Backend(msg),
        }
    }
}

impl From<ResolveError> for TreeError {
    fn from(err: ResolveError) -> Self {
        match err {
            other @ ResolveError::NotFound { .. } => Self::NotFound(other.to_string()),
            ResolveError::Domain(msg) => Self::Backend(msg),
        }
    }
}

/// Result alias for dependency tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
