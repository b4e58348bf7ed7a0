//! Provenance dependency tree.
//!
//! [`DependencyTree`] records how domain objects were derived from one
//! another. Objects are dumped as nodes keyed by content hash, actions as
//! "produces" edges between them, and [`DependencyTree::get_connected`]
//! walks the graph to answer "what fed into this?" and "what came out of
//! this?".
//!
//! # Key Types
//!
//! - [`DependencyTree`] -- the orchestrator over a graph store and a domain
//!   store
//! - [`ConnectedQuery`] -- direction, depth, class filter and cancellation
//!   for a traversal
//! - [`CancelToken`] -- cooperative cancellation with an optional deadline
//! - [`TreeConfig`] -- TOML-loadable configuration
//!
//! # Startup check
//!
//! Every constructor pings the graph store and checks it against the domain
//! store before handing out a tree; see [`check_consistency`].

pub mod cancel;
pub mod config;
pub mod consistency;
pub mod error;
pub mod query;
pub mod tree;

pub use cancel::CancelToken;
pub use config::{ConsistencyConfig, TreeConfig};
pub use consistency::{check_consistency, ConsistencyReport};
pub use error::{TreeError, TreeResult};
pub use query::ConnectedQuery;
pub use tree::DependencyTree;
