//! Resolution of lineage graph entities back to domain objects.
//!
//! Graph nodes and edges only carry identity. [`ObjectResolver`] turns them
//! back into live objects: a bounded process-local cache keyed by content
//! hash is consulted first, and a miss falls through to the [`DomainStore`]'s
//! fetch-by-identifier.

pub mod cache;
pub mod error;
pub mod memory;
pub mod resolver;
pub mod traits;

pub use cache::DEFAULT_CACHE_CAPACITY;
pub use error::{ResolveError, ResolveResult};
pub use memory::{DomainRecord, InMemoryDomainStore};
pub use resolver::ObjectResolver;
pub use traits::DomainStore;
