//! Arena-backed bookmark tree.
//!
//! Nodes live in a map keyed by [`NodeId`]; parent and child links are ids,
//! so the tree owns every node exclusively and no reference cycles exist.
//! Every successful mutation bumps a revision counter that persistence code
//! compares against the last saved revision.

use crate::error::{BmError, Result};
use crate::models::{Node, NodeId, NodeKind, NodeMeta};
use crate::utils;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Deepest level a node may sit at, the root being level 0
///
/// Keeps every internal JSON document inside the parser's nesting limit of
/// 128 (each level costs an object and a `children` array).
pub const MAX_DEPTH: usize = 60;

/// What to do when an imported node carries an id that is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdPolicy {
    /// Fail with a format error naming the id
    #[default]
    Reject,
    /// Give the later node a fresh id
    Renumber,
}

impl IdPolicy {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Some(IdPolicy::Reject),
            "renumber" => Some(IdPolicy::Renumber),
            _ => None,
        }
    }
}

/// Parsed node hierarchy, before ids are resolved against a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub id: Option<NodeId>,
    pub kind: NodeKind,
    pub title: String,
    pub url: Option<String>,
    pub children: Vec<NodeDraft>,
    pub meta: NodeMeta,
    /// Position of the node in its source, reported in format errors
    pub location: String,
}

impl NodeDraft {
    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: NodeKind::Folder,
            title: title.into(),
            url: None,
            children: Vec::new(),
            meta: NodeMeta::default(),
            location: String::new(),
        }
    }

    pub fn url(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            kind: NodeKind::Url,
            ..Self::folder(title)
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(NodeId(id));
        self
    }

    pub fn with_children(mut self, children: Vec<NodeDraft>) -> Self {
        self.children = children;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    fn error(&self, message: impl Into<String>) -> BmError {
        let location = (!self.location.is_empty()).then(|| self.location.clone());
        BmError::format(location, message)
    }
}

#[derive(Debug, Clone)]
pub struct BookmarkTree {
    nodes: BTreeMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
    revision: u64,
    saved_revision: u64,
}

/// Structural equality: same root and node-for-node identical fields.
/// The modification marker is not part of the comparison.
impl PartialEq for BookmarkTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.nodes == other.nodes
    }
}

impl Eq for BookmarkTree {}

fn generated_meta() -> NodeMeta {
    let now = utils::now();
    NodeMeta {
        guid: Some(Uuid::new_v4().to_string()),
        date_added: Some(now),
        ..NodeMeta::default()
    }
}

impl BookmarkTree {
    /// Create a tree holding only its root folder
    pub fn new(root_title: &str) -> Self {
        let root = NodeId(0);
        let mut meta = generated_meta();
        meta.date_modified = meta.date_added;
        let mut nodes = BTreeMap::new();
        nodes.insert(root, Node::new_folder(root, None, root_title.to_string(), meta));
        Self {
            nodes,
            root,
            next_id: 1,
            revision: 0,
            saved_revision: 0,
        }
    }

    /// Build a tree from a reader's draft hierarchy
    ///
    /// Ids missing from the draft are assigned after every explicit id has
    /// been reserved, so generated ids never collide with later explicit ones.
    pub fn from_draft(root: NodeDraft, policy: IdPolicy) -> Result<Self> {
        if root.kind != NodeKind::Folder {
            return Err(root.error("root node must be a folder"));
        }
        let mut tree = Self {
            nodes: BTreeMap::new(),
            root: NodeId(0),
            next_id: 0,
            revision: 0,
            saved_revision: 0,
        };
        tree.root = tree.insert_draft(None, root, policy)?;
        debug!(
            "Built tree with {} nodes (root {})",
            tree.nodes.len(),
            tree.root
        );
        Ok(tree)
    }

    /// Convert a subtree back into a draft carrying its current ids
    pub fn to_draft(&self, id: NodeId) -> Result<NodeDraft> {
        let node = self.get(id)?;
        let children = node
            .children
            .iter()
            .map(|child| self.to_draft(*child))
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeDraft {
            id: Some(node.id),
            kind: node.kind,
            title: node.title.clone(),
            url: node.url.clone(),
            children,
            meta: node.meta.clone(),
            location: format!("node {}", node.id),
        })
    }

    /// Graft a draft hierarchy under an existing folder
    ///
    /// Ids already used in this tree are handled per `policy`. The tree is
    /// left unchanged when the import fails.
    pub fn import_subtree(
        &mut self,
        parent: NodeId,
        draft: NodeDraft,
        policy: IdPolicy,
    ) -> Result<NodeId> {
        self.ensure_folder(parent)?;
        let mut staged = self.clone();
        let id = staged.insert_draft(Some(parent), draft, policy)?;
        staged.touch(parent);
        staged.bump();
        *self = staged;
        Ok(id)
    }

    fn insert_draft(
        &mut self,
        parent: Option<NodeId>,
        draft: NodeDraft,
        policy: IdPolicy,
    ) -> Result<NodeId> {
        if let Some(max) = max_draft_id(&draft) {
            let after = max
                .0
                .checked_add(1)
                .ok_or_else(|| draft.error(format!("node id {} out of range", max)))?;
            self.next_id = self.next_id.max(after);
        }

        let base_depth = match parent {
            Some(parent) => self.depth(parent)? + 1,
            None => 0,
        };
        let mut top = None;
        let mut stack = vec![(draft, parent, base_depth)];
        while let Some((mut draft, parent, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(draft.error(format!("nesting deeper than {} levels", MAX_DEPTH)));
            }
            let id = match draft.id {
                Some(id) if !self.nodes.contains_key(&id) => id,
                Some(id) => match policy {
                    IdPolicy::Reject => {
                        return Err(draft.error(format!("duplicate node id {}", id)));
                    }
                    IdPolicy::Renumber => {
                        let fresh = self.alloc_id().map_err(|e| draft.error(e.to_string()))?;
                        trace!("Renumbered duplicate node id {} to {}", id, fresh);
                        fresh
                    }
                },
                None => self.alloc_id().map_err(|e| draft.error(e.to_string()))?,
            };

            let children = std::mem::take(&mut draft.children);
            let node = match draft.kind {
                NodeKind::Folder => {
                    if draft.url.is_some() {
                        return Err(draft.error("folder node must not carry a URL"));
                    }
                    Node::new_folder(id, parent, draft.title, draft.meta)
                }
                NodeKind::Url => {
                    if !children.is_empty() {
                        return Err(draft.error("url node must not have children"));
                    }
                    let url = draft
                        .url
                        .take()
                        .ok_or_else(|| draft.error("url node is missing its URL"))?;
                    utils::validate_url(&url).map_err(|e| draft.error(e.to_string()))?;
                    let parent = parent.ok_or_else(|| draft.error("root node must be a folder"))?;
                    Node::new_url(id, parent, draft.title, url, draft.meta)
                }
            };

            self.nodes.insert(id, node);
            if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
                parent_node.children.push(id);
            }
            if top.is_none() {
                top = Some(id);
            }
            for child in children.into_iter().rev() {
                stack.push((child, Some(id), depth + 1));
            }
        }

        top.ok_or_else(|| BmError::format(None, "empty draft"))
    }

    fn alloc_id(&mut self) -> Result<NodeId> {
        let id = NodeId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| BmError::InvalidInput("node ids exhausted".to_string()))?;
        Ok(id)
    }

    /// Levels below `id`, 0 for a leaf
    fn subtree_height(&self, id: NodeId) -> Result<usize> {
        let mut height = 0;
        let mut stack = vec![(id, 0usize)];
        while let Some((current, level)) = stack.pop() {
            height = height.max(level);
            for child in &self.get(current)?.children {
                stack.push((*child, level + 1));
            }
        }
        Ok(height)
    }

    fn ensure_depth(&self, parent: NodeId, height: usize) -> Result<()> {
        let depth = self.depth(parent)? + 1 + height;
        if depth > MAX_DEPTH {
            return Err(BmError::InvalidInput(format!(
                "nesting deeper than {} levels under folder {}",
                MAX_DEPTH, parent
            )));
        }
        Ok(())
    }

    /// Fail when any node sits deeper than [`MAX_DEPTH`]
    pub fn check_depth(&self) -> Result<()> {
        let height = self.subtree_height(self.root)?;
        if height > MAX_DEPTH {
            return Err(BmError::InvalidInput(format!(
                "tree is {} levels deep, at most {} are supported",
                height, MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn touch(&mut self, folder: NodeId) {
        if let Some(node) = self.nodes.get_mut(&folder) {
            node.meta.date_modified = Some(utils::now());
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        &self.nodes[&self.root]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(BmError::NotFound(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(BmError::NotFound(id))
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.get(id)?.children())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(id)?.parent())
    }

    /// Number of edges between the node and the root
    pub fn depth(&self, id: NodeId) -> Result<usize> {
        let mut depth = 0;
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent)?.parent;
        }
        Ok(depth)
    }

    /// True when `ancestor` lies on the parent chain of `id`
    pub fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        false
    }

    fn ensure_folder(&self, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        if node.kind != NodeKind::Folder {
            return Err(BmError::InvalidKind {
                id,
                expected: "folder",
                actual: node.kind.as_str(),
            });
        }
        Ok(())
    }

    fn ensure_url(&self, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        if node.kind != NodeKind::Url {
            return Err(BmError::InvalidKind {
                id,
                expected: "url",
                actual: node.kind.as_str(),
            });
        }
        Ok(())
    }

    pub fn create_folder(&mut self, parent: NodeId, title: &str) -> Result<NodeId> {
        self.ensure_folder(parent)?;
        self.ensure_depth(parent, 0)?;
        let id = self.alloc_id()?;
        let mut meta = generated_meta();
        meta.date_modified = meta.date_added;
        self.nodes
            .insert(id, Node::new_folder(id, Some(parent), title.to_string(), meta));
        self.get_mut(parent)?.children.push(id);
        self.touch(parent);
        self.bump();
        trace!("Created folder {} under {}", id, parent);
        Ok(id)
    }

    pub fn create_url(&mut self, parent: NodeId, title: &str, url: &str) -> Result<NodeId> {
        self.ensure_folder(parent)?;
        utils::validate_url(url)?;
        self.ensure_depth(parent, 0)?;
        let id = self.alloc_id()?;
        self.nodes.insert(
            id,
            Node::new_url(id, parent, title.to_string(), url.to_string(), generated_meta()),
        );
        self.get_mut(parent)?.children.push(id);
        self.touch(parent);
        self.bump();
        trace!("Created url {} under {}", id, parent);
        Ok(id)
    }

    /// Move a node to `position` in the child list of `new_parent`
    ///
    /// `position` indexes the child list as it is once the node has been
    /// detached, so `children.len()` appends.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, position: usize) -> Result<()> {
        self.get(id)?;
        self.get(new_parent)?;
        if id == new_parent || self.is_descendant(new_parent, id) {
            return Err(BmError::CycleDetected {
                node: id,
                target: new_parent,
            });
        }
        self.ensure_folder(new_parent)?;

        let old_parent = self
            .get(id)?
            .parent
            .ok_or_else(|| BmError::InvalidInput("the root folder cannot be moved".to_string()))?;
        if old_parent != new_parent {
            self.ensure_depth(new_parent, self.subtree_height(id)?)?;
        }
        let mut available = self.get(new_parent)?.children.len();
        if old_parent == new_parent {
            available -= 1;
        }
        if position > available {
            return Err(BmError::InvalidInput(format!(
                "position {} is out of range for folder {} ({} children)",
                position, new_parent, available
            )));
        }

        self.get_mut(old_parent)?.children.retain(|child| *child != id);
        self.get_mut(new_parent)?.children.insert(position, id);
        self.get_mut(id)?.parent = Some(new_parent);
        self.touch(old_parent);
        self.touch(new_parent);
        self.bump();
        trace!("Moved {} from {} to {}[{}]", id, old_parent, new_parent, position);
        Ok(())
    }

    /// Remove a node together with all of its descendants
    ///
    /// Returns the number of removed nodes.
    pub fn delete_node(&mut self, id: NodeId) -> Result<usize> {
        let parent = self
            .get(id)?
            .parent
            .ok_or_else(|| BmError::InvalidInput("the root folder cannot be deleted".to_string()))?;
        let doomed: Vec<NodeId> = self.traverse_from(id)?.map(|node| node.id).collect();
        for node_id in &doomed {
            self.nodes.remove(node_id);
        }
        self.get_mut(parent)?.children.retain(|child| *child != id);
        self.touch(parent);
        self.bump();
        trace!("Deleted {} ({} nodes)", id, doomed.len());
        Ok(doomed.len())
    }

    pub fn rename_node(&mut self, id: NodeId, title: &str) -> Result<()> {
        let node = self.get_mut(id)?;
        node.title = title.to_string();
        if let Some(parent) = node.parent {
            self.touch(parent);
        }
        self.bump();
        Ok(())
    }

    pub fn set_url(&mut self, id: NodeId, url: &str) -> Result<()> {
        self.ensure_url(id)?;
        utils::validate_url(url)?;
        let node = self.get_mut(id)?;
        node.url = Some(url.to_string());
        if let Some(parent) = node.parent {
            self.touch(parent);
        }
        self.bump();
        Ok(())
    }

    /// Replace the icon and keywords of a url node
    pub fn set_url_meta(
        &mut self,
        id: NodeId,
        icon: Option<String>,
        keywords: Option<String>,
    ) -> Result<()> {
        self.ensure_url(id)?;
        let node = self.get_mut(id)?;
        node.meta.icon = icon;
        node.meta.keywords = keywords;
        if let Some(parent) = node.parent {
            self.touch(parent);
        }
        self.bump();
        Ok(())
    }

    /// Pre-order iterator over every node, starting at the root
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Pre-order iterator over the subtree rooted at `id`
    pub fn traverse_from(&self, id: NodeId) -> Result<Traverse<'_>> {
        self.get(id)?;
        Ok(Traverse {
            tree: self,
            stack: vec![id],
        })
    }

    /// Check every structural invariant of the tree
    pub fn validate(&self) -> Result<()> {
        let root = self.get(self.root)?;
        if root.kind != NodeKind::Folder {
            return Err(BmError::InvalidKind {
                id: self.root,
                expected: "folder",
                actual: root.kind.as_str(),
            });
        }
        if root.parent.is_some() {
            return Err(BmError::InvalidInput(format!(
                "root folder {} must not have a parent",
                self.root
            )));
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(BmError::InvalidInput(format!(
                    "node {} is nested deeper than {} levels",
                    id, MAX_DEPTH
                )));
            }
            if !seen.insert(id) {
                let parent = self.nodes.get(&id).and_then(|n| n.parent).unwrap_or(id);
                return Err(BmError::CycleDetected {
                    node: id,
                    target: parent,
                });
            }
            let node = self.get(id)?;
            if node.id != id {
                return Err(BmError::InvalidInput(format!(
                    "node stored under id {} claims id {}",
                    id, node.id
                )));
            }
            if node.kind == NodeKind::Url && (!node.children.is_empty() || node.url.is_none()) {
                return Err(BmError::InvalidInput(format!(
                    "url node {} must have a URL and no children",
                    id
                )));
            }
            for child in node.children.iter().rev() {
                let child_node = self.get(*child)?;
                if child_node.parent != Some(id) {
                    return Err(BmError::InvalidInput(format!(
                        "node {} is listed under {} but points to {:?}",
                        child, id, child_node.parent
                    )));
                }
                stack.push((*child, depth + 1));
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(BmError::InvalidInput(format!(
                "{} node(s) are not reachable from the root",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }

    /// Counter bumped by every successful mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when the tree changed since it was read or last saved
    pub fn is_modified(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn mark_saved(&mut self) {
        self.saved_revision = self.revision;
    }

    /// Number of (folders, urls) in the tree, the root included
    pub fn counts(&self) -> (usize, usize) {
        self.nodes
            .values()
            .fold((0, 0), |(folders, urls), node| match node.kind {
                NodeKind::Folder => (folders + 1, urls),
                NodeKind::Url => (folders, urls + 1),
            })
    }
}

fn max_draft_id(draft: &NodeDraft) -> Option<NodeId> {
    let mut max = draft.id;
    let mut stack: Vec<&NodeDraft> = draft.children.iter().collect();
    while let Some(node) = stack.pop() {
        if node.id > max {
            max = node.id;
        }
        stack.extend(node.children.iter());
    }
    max
}

/// Lazy pre-order walk over a [`BookmarkTree`]
pub struct Traverse<'a> {
    tree: &'a BookmarkTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.nodes.get(&id)?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn titles(tree: &BookmarkTree) -> Vec<String> {
        tree.traverse().map(|n| n.title().to_string()).collect()
    }

    /// root
    /// ├── A
    /// │   ├── a1 (url)
    /// │   └── B
    /// │       └── b1 (url)
    /// └── C
    fn sample_tree() -> (BookmarkTree, [NodeId; 5]) {
        let mut tree = BookmarkTree::new("root");
        let root = tree.root();
        let a = tree.create_folder(root, "A").unwrap();
        let a1 = tree.create_url(a, "a1", "https://a1.example").unwrap();
        let b = tree.create_folder(a, "B").unwrap();
        let b1 = tree.create_url(b, "b1", "https://b1.example").unwrap();
        let c = tree.create_folder(root, "C").unwrap();
        (tree, [a, a1, b, b1, c])
    }

    #[test]
    fn test_new_tree_has_single_root() {
        let tree = BookmarkTree::new("roots");
        assert_eq!(tree.node_count(), 1);
        assert!(tree.root_node().is_folder());
        assert_eq!(tree.root_node().parent(), None);
        assert!(tree.root_node().meta().guid.is_some());
        assert!(!tree.is_modified());
        tree.validate().unwrap();
    }

    #[test]
    fn test_traverse_is_preorder_and_restartable() {
        let (tree, _) = sample_tree();
        let expected = vec!["root", "A", "a1", "B", "b1", "C"];
        assert_eq!(titles(&tree), expected);
        assert_eq!(titles(&tree), expected);
        assert_eq!(tree.traverse().count(), tree.node_count());
    }

    #[test]
    fn test_create_under_missing_parent() {
        let mut tree = BookmarkTree::new("root");
        let err = tree.create_folder(NodeId(99), "X").unwrap_err();
        assert!(matches!(err, BmError::NotFound(NodeId(99))));
        let err = tree.create_url(NodeId(99), "X", "https://x").unwrap_err();
        assert!(matches!(err, BmError::NotFound(NodeId(99))));
    }

    #[test]
    fn test_create_under_url_is_invalid_kind() {
        let (mut tree, [_, a1, ..]) = sample_tree();
        let err = tree.create_folder(a1, "X").unwrap_err();
        assert!(matches!(err, BmError::InvalidKind { id, .. } if id == a1));
        let err = tree.create_url(a1, "X", "https://x").unwrap_err();
        assert!(matches!(err, BmError::InvalidKind { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("not a url")]
    #[case("example.com")]
    fn test_create_url_rejects_bad_urls(#[case] url: &str) {
        let mut tree = BookmarkTree::new("root");
        let root = tree.root();
        let err = tree.create_url(root, "bad", url).unwrap_err();
        assert!(matches!(err, BmError::InvalidInput(_)));
        assert_eq!(tree.node_count(), 1);
        assert!(!tree.is_modified());
    }

    #[test]
    fn test_mutations_bump_revision() {
        let mut tree = BookmarkTree::new("root");
        let root = tree.root();
        let f = tree.create_folder(root, "F").unwrap();
        assert_eq!(tree.revision(), 1);
        assert!(tree.is_modified());
        tree.mark_saved();
        assert!(!tree.is_modified());
        tree.rename_node(f, "G").unwrap();
        assert!(tree.is_modified());
        assert_eq!(tree.get(f).unwrap().title(), "G");
        assert_eq!(tree.revision(), 2);
    }

    #[test]
    fn test_failed_mutation_keeps_revision() {
        let (mut tree, [a, ..]) = sample_tree();
        tree.mark_saved();
        let before = tree.revision();
        assert!(tree.move_node(a, a, 0).is_err());
        assert_eq!(tree.revision(), before);
        assert!(!tree.is_modified());
    }

    #[test]
    fn test_move_into_descendant_is_cycle() {
        let (mut tree, [a, _, b, ..]) = sample_tree();
        let err = tree.move_node(a, b, 0).unwrap_err();
        assert!(matches!(err, BmError::CycleDetected { node, target } if node == a && target == b));
        let err = tree.move_node(a, a, 0).unwrap_err();
        assert!(matches!(err, BmError::CycleDetected { .. }));
    }

    #[test]
    fn test_move_root_is_cycle() {
        let (mut tree, [_, _, _, _, c]) = sample_tree();
        let root = tree.root();
        let err = tree.move_node(root, c, 0).unwrap_err();
        assert!(matches!(err, BmError::CycleDetected { .. }));
    }

    #[test]
    fn test_move_missing_ids() {
        let (mut tree, [a, ..]) = sample_tree();
        assert!(matches!(
            tree.move_node(NodeId(404), a, 0).unwrap_err(),
            BmError::NotFound(NodeId(404))
        ));
        assert!(matches!(
            tree.move_node(a, NodeId(404), 0).unwrap_err(),
            BmError::NotFound(NodeId(404))
        ));
    }

    #[test]
    fn test_move_under_url_is_invalid_kind() {
        let (mut tree, [_, a1, _, _, c]) = sample_tree();
        let err = tree.move_node(c, a1, 0).unwrap_err();
        assert!(matches!(err, BmError::InvalidKind { .. }));
    }

    #[test]
    fn test_move_to_other_folder_at_position() {
        let (mut tree, [a, a1, b, b1, c]) = sample_tree();
        tree.move_node(b1, a, 0).unwrap();
        assert_eq!(tree.children(a).unwrap(), &[b1, a1, b]);
        assert!(tree.children(b).unwrap().is_empty());
        assert_eq!(tree.parent(b1).unwrap(), Some(a));

        tree.move_node(a1, c, 0).unwrap();
        assert_eq!(tree.children(c).unwrap(), &[a1]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_move_within_same_folder() {
        let (mut tree, [a, a1, b, ..]) = sample_tree();
        tree.move_node(a1, a, 1).unwrap();
        assert_eq!(tree.children(a).unwrap(), &[b, a1]);
        tree.move_node(a1, a, 0).unwrap();
        assert_eq!(tree.children(a).unwrap(), &[a1, b]);
        let err = tree.move_node(a1, a, 2).unwrap_err();
        assert!(matches!(err, BmError::InvalidInput(_)));
    }

    #[test]
    fn test_cascading_delete_removes_exact_subtree() {
        let (mut tree, [a, a1, b, b1, c]) = sample_tree();
        let removed = tree.delete_node(a).unwrap();
        assert_eq!(removed, 4);
        for gone in [a, a1, b, b1] {
            assert!(!tree.contains(gone));
        }
        assert!(tree.contains(c));
        assert_eq!(tree.children(tree.root()).unwrap(), &[c]);
        assert_eq!(titles(&tree), vec!["root", "C"]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_delete_leaf_keeps_siblings() {
        let (mut tree, [a, a1, b, ..]) = sample_tree();
        assert_eq!(tree.delete_node(a1).unwrap(), 1);
        assert_eq!(tree.children(a).unwrap(), &[b]);
    }

    #[test]
    fn test_delete_missing_and_root() {
        let (mut tree, _) = sample_tree();
        assert!(matches!(
            tree.delete_node(NodeId(77)).unwrap_err(),
            BmError::NotFound(_)
        ));
        let root = tree.root();
        assert!(matches!(
            tree.delete_node(root).unwrap_err(),
            BmError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_set_url_on_folder_is_invalid_kind() {
        let (mut tree, [a, a1, ..]) = sample_tree();
        assert!(matches!(
            tree.set_url(a, "https://x").unwrap_err(),
            BmError::InvalidKind { .. }
        ));
        tree.set_url(a1, "https://new.example").unwrap();
        assert_eq!(tree.get(a1).unwrap().url(), Some("https://new.example"));
        tree.set_url_meta(a1, Some("icon.png".into()), Some("rust".into()))
            .unwrap();
        assert_eq!(tree.get(a1).unwrap().meta().keywords.as_deref(), Some("rust"));
    }

    #[test]
    fn test_set_url_meta_touches_parent() {
        let (mut tree, [a, a1, ..]) = sample_tree();
        tree.nodes.get_mut(&a).unwrap().meta.date_modified = None;
        tree.set_url_meta(a1, None, Some("kw".into())).unwrap();
        assert!(tree.get(a).unwrap().meta().date_modified.is_some());
    }

    fn chain(tree: &mut BookmarkTree, levels: usize) -> NodeId {
        let mut parent = tree.root();
        for i in 0..levels {
            parent = tree.create_folder(parent, &format!("level {}", i)).unwrap();
        }
        parent
    }

    #[test]
    fn test_create_beyond_max_depth() {
        let mut tree = BookmarkTree::new("root");
        let deepest = chain(&mut tree, MAX_DEPTH);
        assert_eq!(tree.depth(deepest).unwrap(), MAX_DEPTH);

        let revision = tree.revision();
        assert!(matches!(
            tree.create_folder(deepest, "x").unwrap_err(),
            BmError::InvalidInput(_)
        ));
        assert!(matches!(
            tree.create_url(deepest, "x", "https://x.example").unwrap_err(),
            BmError::InvalidInput(_)
        ));
        assert_eq!(tree.revision(), revision);
        tree.validate().unwrap();
        tree.check_depth().unwrap();
    }

    #[test]
    fn test_move_beyond_max_depth() {
        let mut tree = BookmarkTree::new("root");
        let root = tree.root();
        let deep = chain(&mut tree, MAX_DEPTH - 1);
        let branch = tree.create_folder(root, "branch").unwrap();
        let leaf = tree.create_url(branch, "leaf", "https://leaf.example").unwrap();

        let err = tree.move_node(branch, deep, 0).unwrap_err();
        assert!(matches!(err, BmError::InvalidInput(_)));
        assert_eq!(tree.parent(branch).unwrap(), Some(root));

        tree.move_node(leaf, deep, 0).unwrap();
        assert_eq!(tree.depth(leaf).unwrap(), MAX_DEPTH);
        tree.validate().unwrap();
    }

    #[test]
    fn test_from_draft_rejects_too_deep_nesting() {
        let mut draft = NodeDraft::folder("bottom");
        for i in 0..MAX_DEPTH {
            draft = NodeDraft::folder(format!("level {}", i)).with_children(vec![draft]);
        }
        let tree = BookmarkTree::from_draft(draft.clone(), IdPolicy::Reject).unwrap();
        assert_eq!(tree.node_count(), MAX_DEPTH + 1);

        let too_deep = NodeDraft::folder("top").with_children(vec![draft]);
        let err = BookmarkTree::from_draft(too_deep, IdPolicy::Reject).unwrap_err();
        assert!(matches!(err, BmError::Format { .. }));

        let (mut small, [_, _, b, ..]) = sample_tree();
        let mut deep_draft = NodeDraft::folder("bottom").with_children(vec![NodeDraft::folder("x")]);
        for _ in 0..MAX_DEPTH - 3 {
            deep_draft = NodeDraft::folder("wrap").with_children(vec![deep_draft]);
        }
        // b sits at depth 2, so the graft would reach MAX_DEPTH + 1
        assert!(small.import_subtree(b, deep_draft, IdPolicy::Renumber).is_err());
        assert_eq!(small.node_count(), 6);
    }

    #[rstest]
    #[case(NodeDraft::folder("r").with_id(u64::MAX))]
    #[case(NodeDraft::folder("r").with_id(u64::MAX - 1).with_children(vec![NodeDraft::folder("fresh")]))]
    fn test_from_draft_rejects_exhausted_ids(#[case] draft: NodeDraft) {
        let err = BookmarkTree::from_draft(draft, IdPolicy::Reject).unwrap_err();
        assert!(matches!(err, BmError::Format { .. }), "{:?}", err);
    }

    #[test]
    fn test_depth_and_descendants() {
        let (tree, [a, _, b, b1, c]) = sample_tree();
        assert_eq!(tree.depth(tree.root()).unwrap(), 0);
        assert_eq!(tree.depth(b1).unwrap(), 3);
        assert!(tree.is_descendant(b1, a));
        assert!(!tree.is_descendant(c, a));
        assert!(!tree.is_descendant(a, b));
    }

    #[test]
    fn test_from_draft_assigns_missing_ids_after_explicit_ones() {
        let draft = NodeDraft::folder("roots").with_children(vec![
            NodeDraft::folder("first"),
            NodeDraft::url("second", "https://example.com").with_id(1),
        ]);
        let tree = BookmarkTree::from_draft(draft, IdPolicy::Reject).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.node_count(), 3);
        let url = tree.get(NodeId(1)).unwrap();
        assert_eq!(url.title(), "second");
        assert_eq!(titles(&tree), vec!["roots", "first", "second"]);
        assert!(!tree.is_modified());
    }

    #[test]
    fn test_from_draft_duplicate_ids() {
        let draft = || {
            NodeDraft::folder("roots").with_id(0).with_children(vec![
                NodeDraft::folder("a").with_id(5),
                NodeDraft::folder("b").with_id(5).with_location("roots.other"),
            ])
        };
        let err = BookmarkTree::from_draft(draft(), IdPolicy::Reject).unwrap_err();
        match err {
            BmError::Format { location, message } => {
                assert_eq!(location.as_deref(), Some("roots.other"));
                assert!(message.contains("duplicate node id 5"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let tree = BookmarkTree::from_draft(draft(), IdPolicy::Renumber).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.get(NodeId(5)).unwrap().title(), "a");
        assert_eq!(tree.get(NodeId(6)).unwrap().title(), "b");
    }

    #[test]
    fn test_from_draft_rejects_url_with_children() {
        let mut bad = NodeDraft::url("x", "https://x.example").with_location("node 3");
        bad.children.push(NodeDraft::folder("y"));
        let draft = NodeDraft::folder("roots").with_children(vec![bad]);
        let err = BookmarkTree::from_draft(draft, IdPolicy::Reject).unwrap_err();
        assert!(matches!(err, BmError::Format { location: Some(ref l), .. } if l == "node 3"));
    }

    #[test]
    fn test_from_draft_rejects_url_root() {
        let err = BookmarkTree::from_draft(NodeDraft::url("x", "https://x"), IdPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, BmError::Format { .. }));
    }

    #[test]
    fn test_to_draft_round_trip() {
        let (tree, _) = sample_tree();
        let draft = tree.to_draft(tree.root()).unwrap();
        let rebuilt = BookmarkTree::from_draft(draft, IdPolicy::Reject).unwrap();
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn test_import_subtree_renumbers_colliding_ids() {
        let (mut tree, [_, _, _, _, c]) = sample_tree();
        let (other, _) = sample_tree();
        let draft = other.to_draft(other.root()).unwrap();

        let err = tree
            .import_subtree(c, draft.clone(), IdPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, BmError::Format { .. }));
        assert_eq!(tree.node_count(), 6, "failed import leaves tree untouched");

        let imported = tree.import_subtree(c, draft, IdPolicy::Renumber).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.node_count(), 12);
        assert_eq!(tree.children(c).unwrap(), &[imported]);
        assert_eq!(tree.depth(imported).unwrap(), 2);
    }

    #[test]
    fn test_validate_detects_unreachable_node() {
        let (mut tree, [a, ..]) = sample_tree();
        let root = tree.root();
        tree.nodes.get_mut(&root).unwrap().children.retain(|c| *c != a);
        assert!(matches!(
            tree.validate().unwrap_err(),
            BmError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_validate_detects_cycle() {
        let (mut tree, [a, _, b, ..]) = sample_tree();
        tree.nodes.get_mut(&b).unwrap().children.push(a);
        assert!(matches!(
            tree.validate().unwrap_err(),
            BmError::CycleDetected { .. } | BmError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_structural_equality_ignores_revision() {
        let (tree, _) = sample_tree();
        let mut copy = tree.clone();
        copy.mark_saved();
        assert_eq!(tree, copy);
        let root = copy.root();
        copy.create_folder(root, "extra").unwrap();
        assert_ne!(tree, copy);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Folder(usize),
        Url(usize),
        Move(usize, usize, usize),
        Delete(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<usize>().prop_map(Op::Folder),
            any::<usize>().prop_map(Op::Url),
            (any::<usize>(), any::<usize>(), any::<usize>())
                .prop_map(|(a, b, p)| Op::Move(a, b, p)),
            any::<usize>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Whatever sequence of operations is applied, the structure stays a
        /// tree and moves under a descendant are always refused.
        #[test]
        fn prop_random_edits_keep_tree_shape(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let mut tree = BookmarkTree::new("root");
            for op in ops {
                let ids: Vec<NodeId> = tree.traverse().map(|n| n.id()).collect();
                let pick = |i: usize| ids[i % ids.len()];
                match op {
                    Op::Folder(p) => { let _ = tree.create_folder(pick(p), "f"); }
                    Op::Url(p) => { let _ = tree.create_url(pick(p), "u", "https://u.example"); }
                    Op::Move(n, p, pos) => {
                        let (node, parent) = (pick(n), pick(p));
                        let would_cycle = node == parent || tree.is_descendant(parent, node);
                        let len = tree.children(parent).map(|c| c.len()).unwrap_or(0);
                        let result = tree.move_node(node, parent, pos % (len + 1));
                        if would_cycle {
                            let is_cycle = matches!(result, Err(BmError::CycleDetected { .. }));
                            prop_assert!(is_cycle);
                        }
                    }
                    Op::Delete(n) => {
                        let node = pick(n);
                        let expected = tree.traverse_from(node).map(|t| t.count()).unwrap_or(0);
                        let before = tree.node_count();
                        if let Ok(removed) = tree.delete_node(node) {
                            prop_assert_eq!(removed, expected);
                            prop_assert_eq!(tree.node_count(), before - expected);
                        }
                    }
                }
                prop_assert!(tree.validate().is_ok());
                for node in tree.traverse() {
                    if node.id() != tree.root() {
                        prop_assert!(tree.depth(node.id()).is_ok());
                    }
                }
            }
        }
    }
}
