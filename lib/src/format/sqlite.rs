//! SQLite storage: one bookmark tree per database file.
//!
//! `nodes` holds the structure (`parent_id` references `nodes.id`, child
//! order lives in `position`), `node_meta` holds optional metadata and
//! `tree_info` records which row is the root. The schema version is kept in
//! `PRAGMA user_version`.

use super::{write_atomically, FormatAdapter};
use crate::error::{BmError, Result};
use crate::models::{NodeId, NodeKind, NodeMeta};
use crate::tree::{BookmarkTree, IdPolicy, NodeDraft, MAX_DEPTH};
use crate::utils;
use log::debug;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::io;
use std::path::Path;

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
    CREATE TABLE nodes (
        id integer PRIMARY KEY,
        kind text NOT NULL CHECK (kind IN ('folder', 'url')),
        title text NOT NULL,
        url text,
        parent_id integer REFERENCES nodes(id) ON DELETE CASCADE,
        position integer NOT NULL,
        UNIQUE (parent_id, position)
    );
    CREATE TABLE node_meta (
        node_id integer PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
        guid text,
        date_added text,
        date_modified text,
        icon text,
        keywords text
    );
    CREATE TABLE tree_info (
        key text PRIMARY KEY,
        value text NOT NULL
    );
";

/// One `nodes` row joined with its metadata
struct NodeRow {
    id: i64,
    kind: String,
    title: String,
    url: Option<String>,
    parent_id: Option<i64>,
    guid: Option<String>,
    date_added: Option<String>,
    date_modified: Option<String>,
    icon: Option<String>,
    keywords: Option<String>,
}

pub struct SqliteAdapter {
    id_policy: IdPolicy,
}

impl SqliteAdapter {
    pub fn new(id_policy: IdPolicy) -> Self {
        Self { id_policy }
    }
}

impl FormatAdapter for SqliteAdapter {
    fn read(&self, source: &Path) -> Result<BookmarkTree> {
        if !source.is_file() {
            return Err(BmError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            )));
        }
        let conn = Connection::open_with_flags(
            source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let draft = read_draft(&conn)?;
        // the connection is released before the tree is built
        drop(conn);
        let tree = BookmarkTree::from_draft(draft, self.id_policy)?;
        debug!("Read {} nodes from {}", tree.node_count(), source.display());
        Ok(tree)
    }

    fn write(&self, tree: &BookmarkTree, destination: &Path) -> Result<()> {
        tree.check_depth()?;
        write_atomically(destination, |tmp| {
            let mut conn = Connection::open(tmp.path())?;
            conn.pragma_update(None, "foreign_keys", true)?;
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA)?;
            insert_tree(&tx, tree)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            conn.close().map_err(|(_, e)| e)?;
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

fn insert_tree(tx: &Transaction, tree: &BookmarkTree) -> Result<()> {
    let mut insert_node = tx.prepare(
        "INSERT INTO nodes (id, kind, title, url, parent_id, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut insert_meta = tx.prepare(
        "INSERT INTO node_meta (node_id, guid, date_added, date_modified, icon, keywords)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    // pre-order, so every parent row exists before its children
    let mut stack = vec![(tree.root(), 0usize)];
    while let Some((id, position)) = stack.pop() {
        let node = tree.get(id)?;
        insert_node.execute(params![
            to_sql_id(node.id())?,
            node.kind().as_str(),
            node.title(),
            node.url(),
            node.parent().map(to_sql_id).transpose()?,
            position as i64,
        ])?;

        let meta = node.meta();
        if !meta.is_empty() {
            insert_meta.execute(params![
                to_sql_id(node.id())?,
                meta.guid,
                meta.date_added.as_ref().map(utils::format_timestamp),
                meta.date_modified.as_ref().map(utils::format_timestamp),
                meta.icon,
                meta.keywords,
            ])?;
        }

        for (pos, child) in node.children().iter().enumerate().rev() {
            stack.push((*child, pos));
        }
    }

    tx.execute(
        "INSERT INTO tree_info (key, value) VALUES ('root_id', ?1)",
        [tree.root().to_string()],
    )?;
    Ok(())
}

fn to_sql_id(id: NodeId) -> Result<i64> {
    i64::try_from(id.0)
        .map_err(|_| BmError::InvalidInput(format!("node id {} does not fit in SQLite", id)))
}

/// Turn an SQLite failure while reading into a format error
fn schema_error(location: &str) -> impl Fn(rusqlite::Error) -> BmError + '_ {
    move |err| BmError::format_at(location, err.to_string())
}

fn read_draft(conn: &Connection) -> Result<NodeDraft> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(schema_error("PRAGMA user_version"))?;
    if version != SCHEMA_VERSION {
        return Err(BmError::format_at(
            "PRAGMA user_version",
            format!("schema version {}, expected {}", version, SCHEMA_VERSION),
        ));
    }

    let root_id: String = conn
        .query_row(
            "SELECT value FROM tree_info WHERE key = 'root_id'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(schema_error("tree_info"))?
        .ok_or_else(|| BmError::format_at("tree_info", "missing root_id entry"))?;
    let root_id: i64 = root_id
        .parse()
        .map_err(|_| BmError::format_at("tree_info", format!("invalid root_id \"{}\"", root_id)))?;

    let rows = load_rows(conn).map_err(schema_error("nodes"))?;
    let total = rows.len();

    let mut by_id: HashMap<i64, NodeRow> = HashMap::with_capacity(total);
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        // rows arrive ordered by parent, then position
        if let Some(parent) = row.parent_id {
            children.entry(parent).or_default().push(row.id);
        }
        by_id.insert(row.id, row);
    }

    let root = by_id
        .get(&root_id)
        .ok_or_else(|| BmError::format_at("tree_info", format!("root row {} not found", root_id)))?;
    if root.parent_id.is_some() {
        return Err(BmError::format_at(
            format!("nodes row {}", root_id),
            "root row must not have a parent",
        ));
    }

    let mut visited = 0;
    let draft = build_draft(root_id, 0, &mut by_id, &children, &mut visited)?;
    if visited != total {
        return Err(BmError::format_at(
            "nodes",
            format!("{} row(s) are not reachable from the root", total - visited),
        ));
    }
    Ok(draft)
}

fn load_rows(conn: &Connection) -> rusqlite::Result<Vec<NodeRow>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.kind, n.title, n.url, n.parent_id,
                m.guid, m.date_added, m.date_modified, m.icon, m.keywords
         FROM nodes n
         LEFT JOIN node_meta m ON m.node_id = n.id
         ORDER BY n.parent_id, n.position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(NodeRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            parent_id: row.get(4)?,
            guid: row.get(5)?,
            date_added: row.get(6)?,
            date_modified: row.get(7)?,
            icon: row.get(8)?,
            keywords: row.get(9)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn build_draft(
    id: i64,
    depth: usize,
    by_id: &mut HashMap<i64, NodeRow>,
    children: &HashMap<i64, Vec<i64>>,
    visited: &mut usize,
) -> Result<NodeDraft> {
    let location = format!("nodes row {}", id);
    if depth > MAX_DEPTH {
        return Err(BmError::format_at(
            location,
            format!("nesting deeper than {} levels", MAX_DEPTH),
        ));
    }
    let row = by_id
        .remove(&id)
        .ok_or_else(|| BmError::format_at(location.as_str(), "row visited twice"))?;
    *visited += 1;

    let kind = NodeKind::from_name(&row.kind).ok_or_else(|| {
        BmError::format_at(location.as_str(), format!("unknown kind \"{}\"", row.kind))
    })?;
    let node_id = u64::try_from(row.id)
        .map_err(|_| BmError::format_at(location.as_str(), "negative node id"))?;
    let parse_time = |value: Option<String>, field: &str| {
        value
            .map(|s| {
                utils::parse_timestamp(&s).ok_or_else(|| {
                    BmError::format_at(
                        format!("{}.{}", location, field),
                        format!("invalid timestamp \"{}\"", s),
                    )
                })
            })
            .transpose()
    };
    let meta = NodeMeta {
        guid: row.guid,
        date_added: parse_time(row.date_added, "date_added")?,
        date_modified: parse_time(row.date_modified, "date_modified")?,
        icon: row.icon,
        keywords: row.keywords,
    };

    let child_drafts = match children.get(&id) {
        Some(ids) => ids
            .iter()
            .map(|child| build_draft(*child, depth + 1, by_id, children, visited))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(NodeDraft {
        id: Some(NodeId(node_id)),
        kind,
        title: row.title,
        url: row.url,
        children: child_drafts,
        meta,
        location,
    })
}
