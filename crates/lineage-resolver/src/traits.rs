use std::sync::Arc;

use async_trait::async_trait;
use lineage_types::Identified;

use crate::error::ResolveResult;

/// Read boundary of the external object-management store.
///
/// Implemented by the surrounding system. Lookups return `Ok(None)` when the
/// identifier is unknown and `Err` only when the store itself fails.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Domain objects placed in the graph as nodes.
    type Object: Identified + Clone + Send + Sync + 'static;
    /// Domain actions placed in the graph as edges.
    type Action: Identified + Clone + Send + Sync + 'static;

    async fn fetch_object(
        &self,
        class_tag: &str,
        external_id: &str,
    ) -> ResolveResult<Option<Self::Object>>;

    async fn fetch_action(
        &self,
        act_type: &str,
        act_id: &str,
    ) -> ResolveResult<Option<Self::Action>>;

    /// Number of objects the store holds, if it can tell cheaply.
    async fn object_count(&self) -> ResolveResult<Option<u64>> {
        Ok(None)
    }
}

#[async_trait]
impl<D: DomainStore + ?Sized> DomainStore for Arc<D> {
    type Object = D::Object;
    type Action = D::Action;

    async fn fetch_object(
        &self,
        class_tag: &str,
        external_id: &str,
    ) -> ResolveResult<Option<Self::Object>> {
        (**self).fetch_object(class_tag, external_id).await
    }

    async fn fetch_action(
        &self,
        act_type: &str,
        act_id: &str,
    ) -> ResolveResult<Option<Self::Action>> {
        (**self).fetch_action(act_type, act_id).await
    }

    async fn object_count(&self) -> ResolveResult<Option<u64>> {
        (**self).object_count().await
    }
}
