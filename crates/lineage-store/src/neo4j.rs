//! Neo4j backend over the HTTP transactional Cypher endpoint.
//!
//! Every operation is one `POST {uri}/db/{database}/tx/commit` request. The
//! statements lean on two uniqueness constraints (created on connect when
//! [`Neo4jConfig::ensure_constraints`] is set):
//!
//! - `(:OmeObject).obj_hash` -- one node per content hash
//! - `[:PRODUCES].act_hash` -- one edge per action hash (Neo4j 5.7+)
//!
//! Without `ensure_constraints`, connecting still requires the node
//! constraint to exist and fails otherwise.
//!
//! With those in place `MERGE` is an atomic get-or-create in the database,
//! and a losing concurrent writer surfaces as a constraint-validation error
//! that is resolved by re-reading the winner.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lineage_types::{ContentHash, Direction, EdgeAttrs, EdgeRef, EndpointRole, NodeAttrs, NodeRef};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{EntityKind, GraphError, GraphResult};
use crate::traits::GraphStore;

const CONSTRAINT_VIOLATION: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

const PING: &str = "RETURN 1";

const NODE_CONSTRAINT: &str = "CREATE CONSTRAINT ome_object_hash IF NOT EXISTS \
     FOR (n:OmeObject) REQUIRE n.obj_hash IS UNIQUE";

const EDGE_CONSTRAINT: &str = "CREATE CONSTRAINT ome_action_hash IF NOT EXISTS \
     FOR ()-[r:PRODUCES]-() REQUIRE r.act_hash IS UNIQUE";

const SHOW_CONSTRAINTS: &str = "SHOW CONSTRAINTS YIELD type, labelsOrTypes, properties \
     RETURN type, labelsOrTypes, properties";

const GET_OR_CREATE_NODE: &str = "MERGE (n:OmeObject {obj_hash: $hash}) \
     ON CREATE SET n.obj_class = $class_tag, n.obj_id = $external_id \
     RETURN n.obj_class, n.obj_id, n.obj_hash";

const FIND_NODE: &str = "MATCH (n:OmeObject {obj_hash: $hash}) \
     RETURN n.obj_class, n.obj_id, n.obj_hash";

const FIND_EDGE: &str = "MATCH (s:OmeObject)-[r:PRODUCES {act_hash: $hash}]->(d:OmeObject) \
     RETURN r.act_type, r.act_id, r.act_hash, s.obj_hash, d.obj_hash";

const ENDPOINTS_EXIST: &str = "OPTIONAL MATCH (s:OmeObject {obj_hash: $src}) \
     OPTIONAL MATCH (d:OmeObject {obj_hash: $dst}) \
     RETURN count(DISTINCT s), count(DISTINCT d)";

const MERGE_EDGE: &str = "MATCH (s:OmeObject {obj_hash: $src}) \
     MATCH (d:OmeObject {obj_hash: $dst}) \
     MERGE (s)-[r:PRODUCES {act_hash: $act_hash}]->(d) \
     ON CREATE SET r.act_type = $act_type, r.act_id = $act_id \
     RETURN r.act_type, r.act_id, r.act_hash, s.obj_hash, d.obj_hash";

const NEIGHBORS_OUT: &str = "MATCH (n:OmeObject {obj_hash: $hash})-[:PRODUCES]->(m:OmeObject) \
     RETURN DISTINCT m.obj_class, m.obj_id, m.obj_hash";

const NEIGHBORS_IN: &str = "MATCH (n:OmeObject {obj_hash: $hash})<-[:PRODUCES]-(m:OmeObject) \
     RETURN DISTINCT m.obj_class, m.obj_id, m.obj_hash";

const NEIGHBORS_BOTH: &str = "MATCH (n:OmeObject {obj_hash: $hash})-[:PRODUCES]-(m:OmeObject) \
     RETURN DISTINCT m.obj_class, m.obj_id, m.obj_hash";

const NODE_COUNT: &str = "MATCH (n:OmeObject) RETURN count(n)";

const SAMPLE_NODES: &str = "MATCH (n:OmeObject) WITH n, rand() AS r ORDER BY r LIMIT $limit \
     RETURN n.obj_class, n.obj_id, n.obj_hash";

/// Connection parameters for [`Neo4jGraphStore`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Base HTTP URI, e.g. `http://localhost:7474`.
    pub uri: String,
    /// Database name.
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Create the node and edge uniqueness constraints on connect. When
    /// off, connect only checks that the node constraint already exists.
    pub ensure_constraints: bool,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".into(),
            database: "neo4j".into(),
            user: None,
            password: None,
            request_timeout_ms: 10_000,
            ensure_constraints: true,
        }
    }
}

impl Neo4jConfig {
    /// The transactional commit endpoint for the configured database.
    pub fn commit_url(&self) -> String {
        let base = self.uri.trim_end_matches('/');
        format!("{base}/db/{}/tx/commit", self.database)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for Neo4jConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jConfig")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("ensure_constraints", &self.ensure_constraints)
            .finish()
    }
}

// -- Wire types for the transactional endpoint --

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

impl<'a> Statement<'a> {
    fn new(statement: &'a str, parameters: Value) -> Self {
        Self {
            statement,
            parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jFault>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jFault {
    code: String,
    message: String,
}

/// Outcome of a request whose statements the server rejected.
enum TxFailure {
    ConstraintViolation(String),
    Store(GraphError),
}

impl From<GraphError> for TxFailure {
    fn from(err: GraphError) -> Self {
        Self::Store(err)
    }
}

/// Graph store backed by a Neo4j server.
pub struct Neo4jGraphStore {
    config: Neo4jConfig,
    client: reqwest::Client,
    commit_url: String,
}

impl Neo4jGraphStore {
    /// Connect to the configured server.
    ///
    /// Fails with [`GraphError::Connectivity`] if the server cannot be
    /// reached or rejects the credentials. Creates the uniqueness
    /// constraints when configured to.
    pub async fn connect(config: Neo4jConfig) -> GraphResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GraphError::Connectivity(format!("failed to build HTTP client: {e}")))?;
        let store = Self {
            commit_url: config.commit_url(),
            config,
            client,
        };

        store.ping().await?;
        if store.config.ensure_constraints {
            // Schema statements each need their own transaction.
            store.query(NODE_CONSTRAINT, json!({})).await?;
            // Relationship constraints need Neo4j 5.7+. Without one, MERGE
            // still locks both endpoints, so duplicates between the same
            // pair are excluded; only cross-pair reuse of a hash goes
            // undetected by the database.
            if let Err(err) = store.query(EDGE_CONSTRAINT, json!({})).await {
                match err {
                    GraphError::Backend(msg) => {
                        warn!("edge uniqueness constraint unavailable: {msg}");
                    }
                    other => return Err(other),
                }
            }
        } else {
            let rows = store.query(SHOW_CONSTRAINTS, json!({})).await?;
            if !has_node_hash_constraint(&rows) {
                return Err(GraphError::Backend(
                    "no uniqueness constraint on (:OmeObject).obj_hash; create it or set \
                     ensure_constraints"
                        .into(),
                ));
            }
        }
        info!(uri = %store.config.uri, database = %store.config.database, "connected to Neo4j");
        Ok(store)
    }

    /// The configuration this store was built from.
    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }

    async fn execute(
        &self,
        statements: Vec<Statement<'_>>,
    ) -> Result<Vec<StatementResult>, TxFailure> {
        let mut request = self
            .client
            .post(&self.commit_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TxRequest { statements });
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GraphError::Connectivity(format!("request to {} timed out: {e}", self.config.uri))
            } else if e.is_connect() {
                GraphError::Connectivity(format!("failed to connect to {}: {e}", self.config.uri))
            } else {
                GraphError::Backend(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GraphError::Connectivity(format!(
                "credentials rejected by {} ({status})",
                self.config.uri
            ))
            .into());
        }
        if !status.is_success() {
            return Err(GraphError::Backend(format!("unexpected HTTP status {status}")).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| GraphError::Backend(format!("failed to read response body: {e}")))?;
        parse_response(&body)
    }

    /// Run one statement and return its rows.
    async fn query(&self, statement: &str, parameters: Value) -> GraphResult<Vec<Vec<Value>>> {
        match self.execute(vec![Statement::new(statement, parameters)]).await {
            Ok(results) => Ok(first_rows(results)),
            Err(TxFailure::Store(err)) => Err(err),
            Err(TxFailure::ConstraintViolation(msg)) => Err(GraphError::Backend(msg)),
        }
    }
}

/// Decode a transactional endpoint response body.
fn parse_response(body: &str) -> Result<Vec<StatementResult>, TxFailure> {
    let parsed: TxResponse = serde_json::from_str(body)
        .map_err(|e| GraphError::Backend(format!("malformed Neo4j response: {e}")))?;
    if let Some(fault) = parsed.errors.first() {
        if fault.code == CONSTRAINT_VIOLATION {
            return Err(TxFailure::ConstraintViolation(fault.message.clone()));
        }
        return Err(GraphError::Backend(format!("{}: {}", fault.code, fault.message)).into());
    }
    Ok(parsed.results)
}

fn first_rows(results: Vec<StatementResult>) -> Vec<Vec<Value>> {
    results
        .into_iter()
        .next()
        .map(|r| r.data.into_iter().map(|row| row.row).collect())
        .unwrap_or_default()
}

/// Whether `SHOW CONSTRAINTS` rows (`[type, labelsOrTypes, properties]`)
/// include a uniqueness or node-key constraint on exactly
/// `(:OmeObject).obj_hash`.
fn has_node_hash_constraint(rows: &[Vec<Value>]) -> bool {
    let only = |v: Option<&Value>, want: &str| {
        matches!(v.and_then(Value::as_array).map(Vec::as_slice), Some([x]) if x == want)
    };
    rows.iter().any(|row| {
        let unique = row
            .first()
            .and_then(Value::as_str)
            .is_some_and(|t| t.contains("UNIQUENESS") || t == "NODE_KEY");
        unique && only(row.get(1), "OmeObject") && only(row.get(2), "obj_hash")
    })
}

fn string_at(row: &[Value], idx: usize) -> GraphResult<&str> {
    row.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| GraphError::Backend(format!("expected string in column {idx}, got {row:?}")))
}

fn hash_at(row: &[Value], idx: usize) -> GraphResult<ContentHash> {
    ContentHash::from_hex(string_at(row, idx)?)
        .map_err(|e| GraphError::Backend(format!("stored hash in column {idx} is invalid: {e}")))
}

/// Decode a `[obj_class, obj_id, obj_hash]` row.
fn node_from_row(row: &[Value]) -> GraphResult<NodeRef> {
    Ok(NodeRef {
        class_tag: string_at(row, 0)?.to_string(),
        external_id: string_at(row, 1)?.to_string(),
        content_hash: hash_at(row, 2)?,
    })
}

/// Decode a `[act_type, act_id, act_hash, src_hash, dst_hash]` row.
fn edge_from_row(row: &[Value]) -> GraphResult<EdgeRef> {
    Ok(EdgeRef {
        act_type: string_at(row, 0)?.to_string(),
        act_id: string_at(row, 1)?.to_string(),
        act_hash: hash_at(row, 2)?,
        source: hash_at(row, 3)?,
        target: hash_at(row, 4)?,
    })
}

fn count_at(row: &[Value], idx: usize) -> GraphResult<u64> {
    row.get(idx)
        .and_then(Value::as_u64)
        .ok_or_else(|| GraphError::Backend(format!("expected count in column {idx}, got {row:?}")))
}

/// At most one entity per key; more is an integrity violation.
fn single<T>(
    kind: EntityKind,
    hash: &ContentHash,
    rows: Vec<Vec<Value>>,
    decode: fn(&[Value]) -> GraphResult<T>,
) -> GraphResult<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => decode(&rows[0]).map(Some),
        n => Err(GraphError::duplicate(kind, *hash, n)),
    }
}

fn node_params(hash: &ContentHash, attrs: &NodeAttrs) -> Value {
    json!({
        "hash": hash.to_hex(),
        "class_tag": attrs.class_tag,
        "external_id": attrs.external_id,
    })
}

fn edge_params(src: &NodeRef, dst: &NodeRef, attrs: &EdgeAttrs) -> Value {
    json!({
        "src": src.content_hash.to_hex(),
        "dst": dst.content_hash.to_hex(),
        "act_hash": attrs.act_hash.to_hex(),
        "act_type": attrs.act_type,
        "act_id": attrs.act_id,
    })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> GraphResult<()> {
        self.query(PING, json!({})).await.map(|_| ())
    }

    async fn get_or_create_node(
        &self,
        hash: &ContentHash,
        attrs: &NodeAttrs,
    ) -> GraphResult<NodeRef> {
        let statement = Statement::new(GET_OR_CREATE_NODE, node_params(hash, attrs));
        match self.execute(vec![statement]).await {
            Ok(results) => {
                let rows = first_rows(results);
                let node = single(EntityKind::Node, hash, rows, node_from_row)?;
                node.ok_or_else(|| GraphError::Backend("MERGE returned no node".into()))
            }
            Err(TxFailure::ConstraintViolation(msg)) => {
                // Another writer created the node between our MERGE's match
                // and create phases; its node is the one to return.
                warn!(node = %hash.short_hex(), "node creation raced: {msg}");
                self.find_node_by_hash(hash)
                    .await?
                    .ok_or_else(|| GraphError::Conflict {
                        kind: EntityKind::Node,
                        hash: *hash,
                        reason: msg,
                    })
            }
            Err(TxFailure::Store(err)) => Err(err),
        }
    }

    async fn find_node_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<NodeRef>> {
        let rows = self.query(FIND_NODE, json!({ "hash": hash.to_hex() })).await?;
        single(EntityKind::Node, hash, rows, node_from_row)
    }

    async fn find_edge_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<EdgeRef>> {
        let rows = self.query(FIND_EDGE, json!({ "hash": hash.to_hex() })).await?;
        single(EntityKind::Edge, hash, rows, edge_from_row)
    }

    async fn create_edge(
        &self,
        src: &NodeRef,
        dst: &NodeRef,
        attrs: &EdgeAttrs,
    ) -> GraphResult<EdgeRef> {
        // Both statements run in one transaction. Nodes are never deleted,
        // so the existence check explains an empty MERGE result.
        let params = edge_params(src, dst, attrs);
        let statements = vec![
            Statement::new(ENDPOINTS_EXIST, params.clone()),
            Statement::new(MERGE_EDGE, params),
        ];

        let results = match self.execute(statements).await {
            Ok(results) => results,
            Err(TxFailure::Store(err)) => return Err(err),
            Err(TxFailure::ConstraintViolation(msg)) => {
                warn!(edge = %attrs.act_hash.short_hex(), "edge creation raced: {msg}");
                return match self.find_edge_by_hash(&attrs.act_hash).await? {
                    Some(edge)
                        if edge.source == src.content_hash && edge.target == dst.content_hash =>
                    {
                        Ok(edge)
                    }
                    _ => Err(GraphError::Conflict {
                        kind: EntityKind::Edge,
                        hash: attrs.act_hash,
                        reason: msg,
                    }),
                };
            }
        };

        let mut results = results.into_iter();
        let existence = results.next().unwrap_or_default();
        let merged = results.next().unwrap_or_default();

        if let Some(row) = existence.data.first() {
            if count_at(&row.row, 0)? == 0 {
                return Err(GraphError::UnmappedNode {
                    role: EndpointRole::Source,
                    hash: src.content_hash,
                });
            }
            if count_at(&row.row, 1)? == 0 {
                return Err(GraphError::UnmappedNode {
                    role: EndpointRole::Destination,
                    hash: dst.content_hash,
                });
            }
        }

        let rows: Vec<Vec<Value>> = merged.data.into_iter().map(|r| r.row).collect();
        let edge = single(EntityKind::Edge, &attrs.act_hash, rows, edge_from_row)?
            .ok_or_else(|| GraphError::Backend("MERGE returned no edge".into()))?;
        debug!(
            edge = %edge.act_hash.short_hex(),
            source = %edge.source.short_hex(),
            target = %edge.target.short_hex(),
            "merged graph edge"
        );
        Ok(edge)
    }

    async fn neighbors(&self, node: &NodeRef, direction: Direction) -> GraphResult<Vec<NodeRef>> {
        let statement = match direction {
            Direction::Out => NEIGHBORS_OUT,
            Direction::In => NEIGHBORS_IN,
            Direction::Both => NEIGHBORS_BOTH,
        };
        let rows = self
            .query(statement, json!({ "hash": node.content_hash.to_hex() }))
            .await?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }

    async fn node_count(&self) -> GraphResult<u64> {
        let rows = self.query(NODE_COUNT, json!({})).await?;
        match rows.first() {
            Some(row) => count_at(row, 0),
            None => Ok(0),
        }
    }

    async fn sample_nodes(&self, limit: usize) -> GraphResult<Vec<NodeRef>> {
        let rows = self.query(SAMPLE_NODES, json!({ "limit": limit })).await?;
        rows.iter().map(|row| node_from_row(row)).collect()
    }
}

impl fmt::Debug for Neo4jGraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jGraphStore")
            .field("commit_url", &self.commit_url)
            .finish()
    }
}
