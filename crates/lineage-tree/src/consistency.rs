use std::time::{Duration, Instant};

use lineage_resolver::{DomainStore, ObjectResolver, ResolveError};
use lineage_store::{GraphError, GraphStore};
use lineage_types::{compute_hash, NodeRef};
use tracing::{info, warn};

use crate::config::ConsistencyConfig;
use crate::error::{TreeError, TreeResult};

/// Outcome of the startup check.
#[derive(Clone, Debug)]
pub struct ConsistencyReport {
    /// `true` when the check was disabled and nothing beyond `ping` ran.
    pub skipped: bool,
    pub node_count: u64,
    /// Domain object count, if the domain store reports one.
    pub object_count: Option<u64>,
    /// Number of nodes that went through the per-node checks.
    pub sampled: usize,
    pub elapsed: Duration,
}

/// Verify that the graph store is reachable and consistent with the domain
/// store.
///
/// Checks, fail-fast, in order:
/// 1. the store answers `ping`, else [`TreeError::Connectivity`]
/// 2. with `verify_domain_presence`: the graph holds no more nodes than the
///    domain store holds objects
/// 3. every sampled node carries the hash its identity computes to, is the
///    only node under that hash, and with `verify_domain_presence` resolves
///    to a live object
///
/// Any failure after step 1 is a [`TreeError::Integrity`]. Without
/// `verify_domain_presence`, nodes whose object was removed from the domain
/// store are tolerated here and surface as [`TreeError::NotFound`] when
/// resolved.
pub async fn check_consistency<G, D>(
    store: &G,
    resolver: &ObjectResolver<D>,
    config: &ConsistencyConfig,
) -> TreeResult<ConsistencyReport>
where
    G: GraphStore,
    D: DomainStore,
{
    let start = Instant::now();

    store.ping().await.map_err(|err| match err {
        GraphError::Connectivity(msg) => TreeError::Connectivity(msg),
        other => TreeError::Connectivity(other.to_string()),
    })?;

    if !config.enabled {
        warn!("graph consistency check disabled by configuration");
        return Ok(ConsistencyReport {
            skipped: true,
            node_count: 0,
            object_count: None,
            sampled: 0,
            elapsed: start.elapsed(),
        });
    }

    let node_count = store.node_count().await?;
    let object_count = resolver.domain().object_count().await?;
    if let (true, Some(objects)) = (config.verify_domain_presence, object_count) {
        if node_count > objects {
            return Err(TreeError::Integrity(format!(
                "graph holds {node_count} nodes but the domain store only {objects} objects"
            )));
        }
    }

    let sample = store.sample_nodes(config.sample_size).await?;
    for node in &sample {
        check_node(store, resolver, node, config.verify_domain_presence).await?;
    }

    let report = ConsistencyReport {
        skipped: false,
        node_count,
        object_count,
        sampled: sample.len(),
        elapsed: start.elapsed(),
    };
    info!(
        nodes = report.node_count,
        sampled = report.sampled,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "graph consistency check passed"
    );
    Ok(report)
}

async fn check_node<G, D>(
    store: &G,
    resolver: &ObjectResolver<D>,
    node: &NodeRef,
    verify_domain_presence: bool,
) -> TreeResult<()>
where
    G: GraphStore,
    D: DomainStore,
{
    let expected = compute_hash(&node.class_tag, &node.external_id)
        .map_err(|e| TreeError::Integrity(format!("node {node} has an invalid identity: {e}")))?;
    if expected != node.content_hash {
        return Err(TreeError::Integrity(format!(
            "node {node} is stored under hash {} but its identity hashes to {}",
            node.content_hash, expected
        )));
    }

    // Multiplicity above one surfaces as GraphError::Integrity.
    if store.find_node_by_hash(&node.content_hash).await?.is_none() {
        return Err(TreeError::Integrity(format!(
            "sampled node {node} is not retrievable by its hash"
        )));
    }

    if verify_domain_presence {
        match resolver.resolve(node).await {
            Ok(_) => {}
            Err(ResolveError::NotFound { .. }) => {
                return Err(TreeError::Integrity(format!(
                    "node {node} has no counterpart in the domain store"
                )));
            }
            Err(other) => return Err(other.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_resolver::{DomainRecord, InMemoryDomainStore};
    use lineage_store::InMemoryGraphStore;
    use lineage_types::NodeAttrs;

    async fn seeded(ids: &[&str]) -> (InMemoryGraphStore, ObjectResolver<InMemoryDomainStore>) {
        let store = InMemoryGraphStore::new();
        let domain = InMemoryDomainStore::new();
        for id in ids {
            let hash = compute_hash("DataSample", id).unwrap();
            store
                .get_or_create_node(&hash, &NodeAttrs::new("DataSample", *id))
                .await
                .unwrap();
            domain.insert_object(DomainRecord::new("DataSample", *id));
        }
        (store, ObjectResolver::new(domain))
    }

    #[tokio::test]
    async fn consistent_store_passes() {
        let (store, resolver) = seeded(&["V1", "V2", "V3"]).await;
        let report = check_consistency(&store, &resolver, &ConsistencyConfig::default())
            .await
            .unwrap();
        assert!(!report.skipped);
        assert_eq!(report.node_count, 3);
        assert_eq!(report.object_count, Some(3));
        assert_eq!(report.sampled, 3);
    }

    #[tokio::test]
    async fn unreachable_store_is_connectivity_error() {
        let (store, resolver) = seeded(&[]).await;
        store.set_reachable(false);
        let err = check_consistency(&store, &resolver, &ConsistencyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Connectivity(_)));
    }

    fn strict() -> ConsistencyConfig {
        ConsistencyConfig {
            verify_domain_presence: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn more_nodes_than_objects_fails_strict_check() {
        let (store, resolver) = seeded(&["V1", "V2"]).await;
        resolver.domain().remove_object("DataSample", "V2");
        let err = check_consistency(&store, &resolver, &strict()).await.unwrap_err();
        match err {
            TreeError::Integrity(msg) => assert!(msg.contains("2 nodes")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn removed_domain_object_is_tolerated_by_default() {
        let (store, resolver) = seeded(&["V1", "V2"]).await;
        resolver.domain().remove_object("DataSample", "V2");
        let report = check_consistency(&store, &resolver, &ConsistencyConfig::default())
            .await
            .unwrap();
        assert_eq!(report.node_count, 2);
        assert_eq!(report.object_count, Some(1));
        assert_eq!(report.sampled, 2);
    }

    #[tokio::test]
    async fn mismatched_hash_is_integrity_error() {
        let (store, resolver) = seeded(&["V1"]).await;
        store.insert_node_unchecked(NodeRef {
            class_tag: "DataSample".into(),
            external_id: "V2".into(),
            content_hash: compute_hash("DataSample", "V3").unwrap(),
        });
        let err = check_consistency(&store, &resolver, &ConsistencyConfig::default())
            .await
            .unwrap_err();
        match err {
            TreeError::Integrity(msg) => assert!(msg.contains("DataSample:V2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_node_is_integrity_error() {
        let (store, resolver) = seeded(&["V1"]).await;
        store.insert_node_unchecked(NodeRef::new(
            compute_hash("DataSample", "V1").unwrap(),
            &NodeAttrs::new("DataSample", "V1"),
        ));
        let err = check_consistency(&store, &resolver, &ConsistencyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Integrity(_)));
    }

    #[tokio::test]
    async fn stale_node_fails_only_when_presence_is_verified() {
        let (store, resolver) = seeded(&["V1", "V2"]).await;
        resolver.domain().remove_object("DataSample", "V1");
        // Same count on both sides, so only the per-node lookup can trip.
        resolver
            .domain()
            .insert_object(DomainRecord::new("DataSample", "other"));

        let lenient = ConsistencyConfig::default();
        assert!(check_consistency(&store, &resolver, &lenient).await.is_ok());

        let err = check_consistency(&store, &resolver, &strict()).await.unwrap_err();
        match err {
            TreeError::Integrity(msg) => assert!(msg.contains("no counterpart")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_check_still_pings() {
        let (store, resolver) = seeded(&["V1"]).await;
        store.insert_node_unchecked(NodeRef::new(
            compute_hash("DataSample", "V1").unwrap(),
            &NodeAttrs::new("DataSample", "V1"),
        ));
        let off = ConsistencyConfig {
            enabled: false,
            ..Default::default()
        };
        let report = check_consistency(&store, &resolver, &off).await.unwrap();
        assert!(report.skipped);

        store.set_reachable(false);
        assert!(matches!(
            check_consistency(&store, &resolver, &off).await,
            Err(TreeError::Connectivity(_))
        ));
    }
}
