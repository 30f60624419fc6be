use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node, unique within one tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Url,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::Url => "url",
        }
    }

    /// Parse the storage name of a kind
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(NodeKind::Folder),
            "url" => Some(NodeKind::Url),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional node metadata carried through the internal formats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub guid: Option<String>,
    pub date_added: Option<NaiveDateTime>,
    pub date_modified: Option<NaiveDateTime>,
    pub icon: Option<String>,
    pub keywords: Option<String>,
}

impl NodeMeta {
    pub fn is_empty(&self) -> bool {
        *self == NodeMeta::default()
    }
}

/// A folder or URL bookmark stored in a [`crate::tree::BookmarkTree`]
///
/// Nodes reference their parent and children by id; the tree owns them all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) title: String,
    pub(crate) url: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) meta: NodeMeta,
}

impl Node {
    pub(crate) fn new_folder(id: NodeId, parent: Option<NodeId>, title: String, meta: NodeMeta) -> Self {
        Self {
            id,
            parent,
            kind: NodeKind::Folder,
            title,
            url: None,
            children: Vec::new(),
            meta,
        }
    }

    pub(crate) fn new_url(id: NodeId, parent: NodeId, title: String, url: String, meta: NodeMeta) -> Self {
        Self {
            id,
            parent: Some(parent),
            kind: NodeKind::Url,
            title,
            url: Some(url),
            children: Vec::new(),
            meta,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// URL of a url node, `None` for folders
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Ordered child ids, always empty for url nodes
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}
