//! Chrome / Edge `Bookmarks` reader.
//!
//! Accepts the browser's own file (`{"roots": {...}, "checksum": ..}`) as
//! well as the compact export form where a folder is written as
//! `{"folder": title, "children": [...]}` and a bookmark as
//! `{"url": title, "href": link}`. Every root becomes a child of a synthetic
//! root folder. Writing is not supported.

use super::FormatAdapter;
use crate::error::{BmError, Result};
use crate::models::{NodeId, NodeKind, NodeMeta};
use crate::tree::{BookmarkTree, IdPolicy, NodeDraft};
use crate::utils;
use chrono::NaiveDateTime;
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Roots every Chrome file carries, in the order the browser shows them
const REQUIRED_ROOTS: [&str; 2] = ["bookmark_bar", "other"];
const OPTIONAL_ROOTS: [&str; 1] = ["synced"];

pub struct ChromeAdapter {
    root_title: String,
    id_policy: IdPolicy,
}

impl ChromeAdapter {
    pub fn new(root_title: &str, id_policy: IdPolicy) -> Self {
        Self {
            root_title: root_title.to_string(),
            id_policy,
        }
    }

    /// Turn a parsed Chrome document into a draft rooted at the synthetic root
    pub fn parse_document(&self, doc: &Value) -> Result<NodeDraft> {
        let obj = doc
            .as_object()
            .ok_or_else(|| BmError::format_at("$", "expected a JSON object"))?;

        let children = if let Some(roots) = obj.get("roots") {
            parse_roots(roots)?
        } else if is_node(obj) {
            vec![parse_node(doc, "$".to_string())?]
        } else {
            return Err(BmError::format_at(
                "$",
                "not a Chrome bookmark document (no `roots` and no bookmark node)",
            ));
        };

        Ok(NodeDraft::folder(self.root_title.clone())
            .with_children(children)
            .with_location("$"))
    }
}

impl FormatAdapter for ChromeAdapter {
    fn read(&self, source: &Path) -> Result<BookmarkTree> {
        let content = fs::read(source)?;
        let doc: Value = serde_json::from_slice(&content)?;
        let draft = self.parse_document(&doc)?;
        let tree = BookmarkTree::from_draft(draft, self.id_policy)?;
        debug!(
            "Read {} nodes from Chrome file {}",
            tree.node_count(),
            source.display()
        );
        Ok(tree)
    }

    fn write(&self, _tree: &BookmarkTree, destination: &Path) -> Result<()> {
        Err(BmError::UnsupportedOperation(format!(
            "cannot write {}: Chrome bookmark files are read-only, use json or sqlite",
            destination.display()
        )))
    }
}

fn is_node(obj: &Map<String, Value>) -> bool {
    obj.contains_key("type") || obj.contains_key("folder") || obj.contains_key("href")
}

fn parse_roots(roots: &Value) -> Result<Vec<NodeDraft>> {
    let roots = roots
        .as_object()
        .ok_or_else(|| BmError::format_at("roots", "expected an object"))?;

    let mut drafts = Vec::new();
    for name in REQUIRED_ROOTS {
        let root = roots
            .get(name)
            .ok_or_else(|| BmError::format_at("roots", format!("missing root `{}`", name)))?;
        drafts.push(parse_node(root, format!("roots.{}", name))?);
    }
    for name in OPTIONAL_ROOTS {
        if let Some(root) = roots.get(name) {
            drafts.push(parse_node(root, format!("roots.{}", name))?);
        }
    }
    // Any further roots a browser adds, in key order
    for (name, root) in roots {
        if REQUIRED_ROOTS.contains(&name.as_str()) || OPTIONAL_ROOTS.contains(&name.as_str()) {
            continue;
        }
        if root.is_object() {
            drafts.push(parse_node(root, format!("roots.{}", name))?);
        }
    }
    Ok(drafts)
}

fn parse_node(value: &Value, path: String) -> Result<NodeDraft> {
    let obj = value
        .as_object()
        .ok_or_else(|| BmError::format_at(path.as_str(), "expected an object"))?;

    let mut draft = if let Some(node_type) = obj.get("type") {
        match node_type.as_str() {
            Some("folder") => NodeDraft::folder(required_str(obj, "name", &path)?)
                .with_children(parse_children(obj, &path)?),
            Some("url") => NodeDraft::url(
                required_str(obj, "name", &path)?,
                required_str(obj, "url", &path)?,
            ),
            _ => {
                return Err(BmError::format_at(
                    format!("{}.type", path),
                    format!("unknown node type {}", node_type),
                ))
            }
        }
    } else if obj.contains_key("folder") {
        NodeDraft::folder(required_str(obj, "folder", &path)?)
            .with_children(parse_children(obj, &path)?)
    } else if obj.contains_key("href") {
        // compact form keeps the title under `url`, the canonical one under `name`
        let title = match optional_str(obj, "url", &path)? {
            Some(title) => title,
            None => optional_str(obj, "name", &path)?.unwrap_or_default(),
        };
        NodeDraft::url(title, required_str(obj, "href", &path)?)
    } else {
        return Err(BmError::format_at(
            path.as_str(),
            "node has neither `type`, `folder` nor `href`",
        ));
    };

    if draft.kind == NodeKind::Url && !parse_children(obj, &path)?.is_empty() {
        return Err(BmError::format_at(
            format!("{}.children", path),
            "url node must not have children",
        ));
    }

    draft.id = parse_id(obj, &path)?;
    draft.meta = parse_meta(obj, &path)?;
    Ok(draft.with_location(path))
}

fn parse_children(obj: &Map<String, Value>, path: &str) -> Result<Vec<NodeDraft>> {
    match obj.get("children") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_node(item, format!("{}.children[{}]", path, i)))
            .collect(),
        Some(_) => Err(BmError::format_at(
            format!("{}.children", path),
            "expected an array",
        )),
    }
}

fn required_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(BmError::format_at(
            format!("{}.{}", path, key),
            "expected a string",
        )),
        None => Err(BmError::format_at(path, format!("missing field `{}`", key))),
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BmError::format_at(
            format!("{}.{}", path, key),
            "expected a string",
        )),
    }
}

/// Chrome writes numbers as decimal strings; plain numbers are accepted too
fn integer_field(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<i64>> {
    let invalid = || BmError::format_at(format!("{}.{}", path, key), "expected an integer");
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

fn parse_id(obj: &Map<String, Value>, path: &str) -> Result<Option<NodeId>> {
    match integer_field(obj, "id", path)? {
        Some(id) if id < 0 => Err(BmError::format_at(
            format!("{}.id", path),
            "node id must not be negative",
        )),
        Some(id) => Ok(Some(NodeId(id as u64))),
        None => Ok(None),
    }
}

fn parse_time(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<NaiveDateTime>> {
    match integer_field(obj, key, path)? {
        Some(micros) => match utils::from_webkit_micros(micros) {
            Some(ts) => Ok(Some(ts)),
            None if micros == 0 => Ok(None),
            None => Err(BmError::format_at(
                format!("{}.{}", path, key),
                "timestamp out of range",
            )),
        },
        None => Ok(None),
    }
}

fn parse_meta(obj: &Map<String, Value>, path: &str) -> Result<NodeMeta> {
    Ok(NodeMeta {
        guid: optional_str(obj, "guid", path)?,
        date_added: parse_time(obj, "date_added", path)?,
        date_modified: parse_time(obj, "date_modified", path)?,
        icon: optional_str(obj, "icon", path)?,
        keywords: None,
    })
}
