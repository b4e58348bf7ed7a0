//! Node and edge value types exchanged with graph stores.
//!
//! A [`NodeRef`] is one domain object as the graph sees it; an [`EdgeRef`] is
//! one provenance action connecting two such nodes. Both are plain values:
//! they carry identity, not live domain state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Relation label carried by every edge in the lineage graph.
pub const PRODUCES: &str = "produces";

/// Attributes written when a node is first created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrs {
    pub class_tag: String,
    pub external_id: String,
}

impl NodeAttrs {
    pub fn new(class_tag: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            class_tag: class_tag.into(),
            external_id: external_id.into(),
        }
    }
}

/// A node as stored in the graph: one domain object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Most-derived domain type of the object.
    pub class_tag: String,
    /// Identifier of the object in the domain store.
    pub external_id: String,
    /// Unique key of the node.
    pub content_hash: ContentHash,
}

impl NodeRef {
    pub fn new(content_hash: ContentHash, attrs: &NodeAttrs) -> Self {
        Self {
            class_tag: attrs.class_tag.clone(),
            external_id: attrs.external_id.clone(),
            content_hash,
        }
    }

    /// Returns `true` if this node's class tag equals `class_tag`.
    pub fn is_class(&self, class_tag: &str) -> bool {
        self.class_tag == class_tag
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({})",
            self.class_tag,
            self.external_id,
            self.content_hash.short_hex()
        )
    }
}

/// Attributes written when an edge is first created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub act_type: String,
    pub act_id: String,
    pub act_hash: ContentHash,
}

/// An edge as stored in the graph: one "produces" action from `source` to
/// `target`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    pub act_type: String,
    pub act_id: String,
    /// Unique key of the edge.
    pub act_hash: ContentHash,
    /// Content hash of the producing node.
    pub source: ContentHash,
    /// Content hash of the produced node.
    pub target: ContentHash,
}

impl EdgeRef {
    pub fn new(attrs: &EdgeAttrs, source: ContentHash, target: ContentHash) -> Self {
        Self {
            act_type: attrs.act_type.clone(),
            act_id: attrs.act_id.clone(),
            act_hash: attrs.act_hash,
            source,
            target,
        }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} -[{PRODUCES}]-> {}",
            self.act_type,
            self.act_id,
            self.source.short_hex(),
            self.target.short_hex()
        )
    }
}

/// Direction to follow "produces" edges during traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Destination to source: "what produced this?"
    In,
    /// Source to destination: "what did this produce?"
    Out,
    /// Either way.
    #[default]
    Both,
}

impl Direction {
    /// Whether edges are followed from source to destination.
    pub fn follows_outgoing(self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }

    /// Whether edges are followed from destination to source.
    pub fn follows_incoming(self) -> bool {
        matches!(self, Self::In | Self::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Which end of an edge a node plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointRole {
    Source,
    Destination,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}
