use lineage_types::{Direction, NodeRef};

use crate::cancel::CancelToken;

/// Parameters of a connectivity query.
///
/// ```
/// use lineage_tree::ConnectedQuery;
/// use lineage_types::Direction;
///
/// let q = ConnectedQuery::new()
///     .target_class("DataSample")
///     .direction(Direction::Out)
///     .depth(2);
/// assert_eq!(q.depth, Some(2));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConnectedQuery {
    /// Only report nodes of this class. Others are still traversed.
    pub target_class: Option<String>,
    pub direction: Direction,
    /// Maximum number of hops. `None` walks until the frontier is empty.
    pub depth: Option<usize>,
    pub cancel: Option<CancelToken>,
}

impl ConnectedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_class(mut self, class_tag: impl Into<String>) -> Self {
        self.target_class = Some(class_tag.into());
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn matches(&self, node: &NodeRef) -> bool {
        self.target_class
            .as_deref()
            .map_or(true, |class| node.is_class(class))
    }
}
