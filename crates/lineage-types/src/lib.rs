//! Foundation types for the lineage graph.
//!
//! This crate holds the identity and structural types shared by every other
//! lineage crate: the content hash that keys nodes and edges, the references
//! a graph store hands back, and the [`Identified`] trait domain objects
//! implement so they can be dumped into the graph.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- BLAKE3 fingerprint of `(class_tag, external_id)`
//! - [`compute_hash`] -- the single hashing entry point
//! - [`NodeRef`] / [`EdgeRef`] -- graph entities as stored
//! - [`Direction`] -- traversal direction along "produces" edges

pub mod error;
pub mod graph;
pub mod hash;
pub mod identity;

pub use error::IdentityError;
pub use graph::{Direction, EdgeAttrs, EdgeRef, EndpointRole, NodeAttrs, NodeRef, PRODUCES};
pub use hash::{compute_hash, ContentHash};
pub use identity::Identified;
