use std::fmt;

use lineage_types::{ContentHash, EndpointRole};

/// The kind of graph entity an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
        }
    }
}

/// Errors from graph store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The store could not be reached or refused the connection.
    #[error("graph store unreachable: {0}")]
    Connectivity(String),

    /// More than one entity shares a key that must be unique.
    #[error("integrity violation: {count} {kind}s share hash {hash}")]
    Integrity {
        kind: EntityKind,
        hash: ContentHash,
        count: usize,
    },

    /// An edge endpoint does not exist in the graph.
    #[error("unmapped {role} node {hash}, unable to create the edge")]
    UnmappedNode {
        role: EndpointRole,
        hash: ContentHash,
    },

    /// A concurrent writer created a conflicting entity for the same key.
    #[error("write conflict on {kind} {hash}: {reason}")]
    Conflict {
        kind: EntityKind,
        hash: ContentHash,
        reason: String,
    },

    /// The store answered, but not with anything usable.
    #[error("graph store error: {0}")]
    Backend(String),
}

impl GraphError {
    pub(crate) fn duplicate(kind: EntityKind, hash: ContentHash, count: usize) -> Self {
        Self::Integrity { kind, hash, count }
    }
}

/// Result alias for graph store operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_types::compute_hash;

    #[test]
    fn unmapped_message_names_role() {
        let hash = compute_hash("DataSample", "V1").unwrap();
        let err = GraphError::UnmappedNode {
            role: EndpointRole::Destination,
            hash,
        };
        let msg = err.to_string();
        assert!(msg.contains("destination"));
        assert!(msg.contains(&hash.to_hex()));
    }

    #[test]
    fn integrity_message_counts_duplicates() {
        let hash = compute_hash("Action", "A1").unwrap();
        let err = GraphError::duplicate(EntityKind::Edge, hash, 3);
        assert!(err.to_string().starts_with("integrity violation: 3 edges"));
    }
}
