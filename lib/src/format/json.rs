use super::{write_atomically, FormatAdapter};
use crate::error::{BmError, Result};
use crate::models::{NodeId, NodeKind, NodeMeta};
use crate::tree::{BookmarkTree, IdPolicy, NodeDraft};
use crate::utils;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const FORMAT_TAG: &str = "bmtree";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDocument {
    format: String,
    version: u32,
    root: JsonNode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonNode {
    id: NodeId,
    kind: NodeKind,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keywords: Option<String>,
    /// Present for folders (possibly empty), absent for urls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<JsonNode>>,
}

/// Internal JSON document adapter
pub struct JsonAdapter {
    pretty: bool,
    id_policy: IdPolicy,
}

impl JsonAdapter {
    pub fn new(pretty: bool, id_policy: IdPolicy) -> Self {
        Self { pretty, id_policy }
    }

    /// Serialize a tree to the exact bytes `write` stores
    pub fn to_bytes(&self, tree: &BookmarkTree) -> Result<Vec<u8>> {
        tree.check_depth()?;
        let doc = JsonDocument {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            root: to_json_node(tree, tree.root())?,
        };
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(&doc)?
        } else {
            serde_json::to_vec(&doc)?
        };
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse the bytes of a JSON document into a tree
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<BookmarkTree> {
        let doc: JsonDocument = serde_json::from_slice(bytes)?;
        if doc.format != FORMAT_TAG {
            return Err(BmError::format_at(
                "format",
                format!("expected \"{}\", found \"{}\"", FORMAT_TAG, doc.format),
            ));
        }
        if doc.version != FORMAT_VERSION {
            return Err(BmError::format_at(
                "version",
                format!("unsupported document version {}", doc.version),
            ));
        }
        let draft = to_draft(doc.root, "root".to_string())?;
        BookmarkTree::from_draft(draft, self.id_policy)
    }
}

impl FormatAdapter for JsonAdapter {
    fn read(&self, source: &Path) -> Result<BookmarkTree> {
        let bytes = fs::read(source)?;
        let tree = self.parse_bytes(&bytes)?;
        debug!("Read {} nodes from {}", tree.node_count(), source.display());
        Ok(tree)
    }

    fn write(&self, tree: &BookmarkTree, destination: &Path) -> Result<()> {
        let bytes = self.to_bytes(tree)?;
        write_atomically(destination, |tmp| {
            tmp.write_all(&bytes)?;
            Ok(())
        })?;
        debug!(
            "Wrote {} nodes to {}",
            tree.node_count(),
            destination.display()
        );
        Ok(())
    }
}

fn to_json_node(tree: &BookmarkTree, id: NodeId) -> Result<JsonNode> {
    let node = tree.get(id)?;
    let children = match node.kind() {
        NodeKind::Folder => Some(
            node.children()
                .iter()
                .map(|child| to_json_node(tree, *child))
                .collect::<Result<Vec<_>>>()?,
        ),
        NodeKind::Url => None,
    };
    let meta = node.meta();
    Ok(JsonNode {
        id: node.id(),
        kind: node.kind(),
        title: node.title().to_string(),
        url: node.url().map(str::to_string),
        guid: meta.guid.clone(),
        date_added: meta.date_added.as_ref().map(utils::format_timestamp),
        date_modified: meta.date_modified.as_ref().map(utils::format_timestamp),
        icon: meta.icon.clone(),
        keywords: meta.keywords.clone(),
        children,
    })
}

fn parse_time(value: Option<String>, path: &str, field: &str) -> Result<Option<chrono::NaiveDateTime>> {
    value
        .map(|s| {
            utils::parse_timestamp(&s).ok_or_else(|| {
                BmError::format_at(
                    format!("{}.{}", path, field),
                    format!("invalid timestamp \"{}\"", s),
                )
            })
        })
        .transpose()
}

fn to_draft(node: JsonNode, path: String) -> Result<NodeDraft> {
    let meta = NodeMeta {
        guid: node.guid,
        date_added: parse_time(node.date_added, &path, "date_added")?,
        date_modified: parse_time(node.date_modified, &path, "date_modified")?,
        icon: node.icon,
        keywords: node.keywords,
    };
    let children = match (node.kind, node.children) {
        (NodeKind::Url, Some(children)) if !children.is_empty() => {
            return Err(BmError::format_at(path, "url node must not have children"));
        }
        (_, Some(children)) => children
            .into_iter()
            .enumerate()
            .map(|(i, child)| to_draft(child, format!("{}.children[{}]", path, i)))
            .collect::<Result<Vec<_>>>()?,
        (_, None) => Vec::new(),
    };
    Ok(NodeDraft {
        id: Some(node.id),
        kind: node.kind,
        title: node.title,
        url: node.url,
        children,
        meta,
        location: path,
    })
}
