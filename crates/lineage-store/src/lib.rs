//! Graph store adapters for the lineage graph.
//!
//! The lineage graph lives in an external graph database that this crate
//! does not own. [`GraphStore`] is the capability boundary the rest of the
//! system programs against: hash-keyed get-or-create for nodes, hash-keyed
//! lookups, edge creation between existing nodes, and one-hop expansion.
//!
//! # Backends
//!
//! - [`InMemoryGraphStore`] -- adjacency lists behind a `RwLock`, for tests
//!   and embedding
//! - [`Neo4jGraphStore`] -- Neo4j over its HTTP transactional Cypher API
//!
//! # Design Rules
//!
//! 1. Node and edge creation are atomic in the store. No backend implements
//!    get-or-create as a client-side read followed by a write.
//! 2. At most one node per content hash and one edge per action hash. A
//!    lookup that finds more reports [`GraphError::Integrity`].
//! 3. Edges are only created between nodes that already exist.
//! 4. Nothing is ever updated or deleted.

pub mod error;
pub mod memory;
pub mod neo4j;
pub mod traits;

pub use error::{EntityKind, GraphError, GraphResult};
pub use memory::InMemoryGraphStore;
pub use neo4j::{Neo4jConfig, Neo4jGraphStore};
pub use traits::GraphStore;
