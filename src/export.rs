//! Discussion download: the full tree as JSON and the projected messages
//! as CSV.
//!
//! The JSON document is the tree with the discussion metadata attached to
//! the root's `extra_data` under `DiscussionDetails`. The CSV file starts
//! with a UTF-8 byte-order mark so spreadsheet tools pick the right
//! encoding.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::model::Message;
use crate::session::DiscussionMeta;
use crate::tree::TreeStore;

pub const CSV_HEADER: &str = "id,parent_id,author,text,timestamp,depth,branch_id,parent_username";
pub const DETAILS_KEY: &str = "DiscussionDetails";
const BOM: &str = "\u{FEFF}";

/// Pretty JSON of the whole tree with `meta` stored on the root.
pub fn tree_json(tree: &TreeStore, meta: &DiscussionMeta) -> Result<String> {
    let mut root = tree.root().clone();
    root.node
        .extra_data
        .insert(DETAILS_KEY.to_string(), serde_json::to_value(meta)?);
    Ok(serde_json::to_string_pretty(&root)?)
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per message in the given order, header first.
pub fn messages_csv(messages: &[Message]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");
    for m in messages {
        let row = [
            csv_field(&m.id),
            csv_field(m.parent_id.as_deref().unwrap_or("")),
            csv_field(&m.author),
            csv_field(&m.text),
            m.timestamp.to_string(),
            m.depth.to_string(),
            csv_field(&m.branch_id),
            csv_field(&m.parent_username),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// File stem for a discussion title: path separators and control
/// characters become `_`; an empty title becomes `discussion`.
pub fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    if stem.is_empty() {
        "discussion".to_string()
    } else {
        stem
    }
}

/// Write `<title>.json` and `<title>.csv` into `dir`, returning both paths.
pub fn write_exports(
    dir: impl AsRef<Path>,
    tree: &TreeStore,
    meta: &DiscussionMeta,
    messages: &[Message],
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let stem = file_stem(&meta.title);

    let json_path = dir.join(format!("{stem}.json"));
    std::fs::write(&json_path, tree_json(tree, meta)?)?;

    let csv_path = dir.join(format!("{stem}.csv"));
    let mut csv = String::from(BOM);
    csv.push_str(&messages_csv(messages));
    std::fs::write(&csv_path, csv)?;

    info!(
        target: "discussion::export",
        json = %json_path.display(),
        csv = %csv_path.display(),
        rows = messages.len(),
        "discussion exported"
    );
    Ok((json_path, csv_path))
}
