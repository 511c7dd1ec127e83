//! Typed cache keys and values.

use squirrel_host::{NodeKey, Rect};

/// What a cache entry memoizes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// First descendant of the scope matching `selector`.
    Structural { selector: String },
    /// One computed-style property.
    Style { property: String },
    /// The layout rectangle.
    Rect,
}

/// Tag of a [`CacheKind`], used for per-kind settings and counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KindTag {
    Structural,
    Style,
    Rect,
}

impl CacheKind {
    pub const fn tag(&self) -> KindTag {
        match self {
            Self::Structural { .. } => KindTag::Structural,
            Self::Style { .. } => KindTag::Style,
            Self::Rect => KindTag::Rect,
        }
    }
}

/// Composite key: the node a read concerns plus what was read.
///
/// For structural entries `node` is the scope the query ran under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub node: NodeKey,
    pub kind: CacheKind,
}

impl CacheKey {
    pub fn structural(scope: NodeKey, selector: &str) -> Self {
        Self {
            node: scope,
            kind: CacheKind::Structural {
                selector: selector.to_owned(),
            },
        }
    }

    pub fn style(node: NodeKey, property: &str) -> Self {
        Self {
            node,
            kind: CacheKind::Style {
                property: property.to_owned(),
            },
        }
    }

    pub const fn rect(node: NodeKey) -> Self {
        Self {
            node,
            kind: CacheKind::Rect,
        }
    }

    /// True for entries that describe `node` itself (style and geometry).
    /// Structural entries describe their scope's contents instead.
    pub const fn is_node_local(&self) -> bool {
        !matches!(self.kind, CacheKind::Structural { .. })
    }
}

/// A memoized read result.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    Node(NodeKey),
    Style(Option<String>),
    Rect(Rect),
}

impl CacheValue {
    pub const fn as_node(&self) -> Option<NodeKey> {
        match self {
            Self::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_style(&self) -> Option<Option<String>> {
        match self {
            Self::Style(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub const fn as_rect(&self) -> Option<Rect> {
        match self {
            Self::Rect(rect) => Some(*rect),
            _ => None,
        }
    }
}
