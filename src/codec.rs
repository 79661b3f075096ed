//! Markdown checklist codec.
//!
//! Task lines look like `- [x] Ship it [due:: 2024-01-01] [priority:: high] [id:: AAMk...]`.
//! Tags may be wrapped in `%%` to hide them in rendered markdown. The
//! collection id lives in a `<!---id--->` marker anywhere in the document.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::collection::TaskCollection;
use crate::task::{normalize_id, TaskItem, TaskPriority, TaskStatus};

static TASK_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)-\s\[([ /xB!])\]\s(.*)$").expect("valid task line regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:%%)?\[\s*(due|priority|id)::\s*(.*?)\s*\](?:%%)?").expect("valid tag regex")
});

static ID_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:%%)?\[\s*id::\s*[^\]]*?\s*\](?:%%)?").expect("valid id tag regex")
});

static COLLECTION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!---(.*?)--->").expect("valid collection id regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\s+").expect("valid whitespace regex"));

/// True when `line` is a tracked checkbox line.
pub fn is_task_line(line: &str) -> bool {
    TASK_LINE_RE.is_match(line)
}

/// Parse a single checkbox line. The parent is left empty.
pub fn parse_line(line: &str, modified_time: i64) -> Option<TaskItem> {
    let captures = TASK_LINE_RE.captures(line)?;
    let symbol = captures.get(2)?.as_str().chars().next()?;
    let status = TaskStatus::from_symbol(symbol)?;
    let text = captures.get(3).map(|m| m.as_str()).unwrap_or_default();

    let mut due = None;
    let mut priority = None;
    let mut id = None;
    for tag in TAG_RE.captures_iter(text) {
        let value = tag.get(2).map(|m| m.as_str().to_string());
        match tag.get(1).map(|m| m.as_str()) {
            Some("due") if due.is_none() => due = value,
            Some("priority") if priority.is_none() => priority = value,
            Some("id") if id.is_none() => id = value,
            _ => {}
        }
    }

    let stripped = TAG_RE.replace_all(text, "");
    let title = WHITESPACE_RE.replace_all(stripped.trim(), " ").to_string();
    let id = normalize_id(id);
    if title.is_empty() && id.is_none() {
        return None;
    }

    Some(TaskItem {
        title,
        status,
        due_date: due.filter(|due| !due.is_empty()),
        priority: priority
            .as_deref()
            .and_then(TaskPriority::parse)
            .unwrap_or_default(),
        modified_time,
        id,
        parent: Default::default(),
    })
}

/// Render an item back to a checkbox line (without indentation).
pub fn serialize_item(item: &TaskItem) -> String {
    let mut line = format!("- [{}] {}", item.status.symbol(), item.title);
    if let Some(due) = &item.due_date {
        line.push_str(&format!(" [due:: {due}]"));
    }
    if item.priority != TaskPriority::Normal {
        line.push_str(&format!(" [priority:: {}]", item.priority.name()));
    }
    if let Some(id) = &item.id {
        line.push_str(&format!(" [id:: {id}]"));
    }
    line
}

/// Parse a whole card document into a collection snapshot.
pub fn parse_document(label: &str, path: &Path, text: &str, modified_time: i64) -> TaskCollection {
    let mut collection = TaskCollection::from_label(label)
        .with_path(path)
        .with_modified_time(modified_time);
    collection.id = collection_id(text);
    let items: Vec<TaskItem> = text
        .lines()
        .filter_map(|line| parse_line(line, modified_time))
        .collect();
    collection.add_items(items);
    collection
}

pub fn collection_id(text: &str) -> Option<String> {
    let captures = COLLECTION_ID_RE.captures(text)?;
    normalize_id(captures.get(1).map(|m| m.as_str().to_string()))
}

/// Write (or overwrite) the collection id marker.
pub fn set_collection_id(text: &str, id: &str) -> String {
    let marker = format!("<!---{id}--->");
    if COLLECTION_ID_RE.is_match(text) {
        return COLLECTION_ID_RE
            .replace(text, regex::NoExpand(marker.as_str()))
            .into_owned();
    }
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&marker);
    out.push('\n');
    out
}

pub fn strip_collection_id(text: &str) -> String {
    let mut lines = Lines::parse(text);
    lines.lines = lines
        .lines
        .into_iter()
        .filter_map(|line| {
            if !COLLECTION_ID_RE.is_match(&line) {
                return Some(line);
            }
            let rest = COLLECTION_ID_RE.replace_all(&line, "").trim_end().to_string();
            (!rest.trim().is_empty()).then_some(rest)
        })
        .collect();
    lines.render()
}

/// Index of the task line carrying `id`.
pub fn find_item_line(text: &str, id: &str) -> Option<usize> {
    text.lines().position(|line| {
        parse_line(line, 0)
            .and_then(|item| item.id)
            .is_some_and(|line_id| line_id == id)
    })
}

/// Replace the line carrying `id` with `item`, keeping its indentation.
pub fn replace_item_line(text: &str, id: &str, item: &TaskItem) -> Option<String> {
    let index = find_item_line(text, id)?;
    let mut lines = Lines::parse(text);
    let indent = leading_whitespace(&lines.lines[index]).to_string();
    lines.lines[index] = format!("{indent}{}", serialize_item(item));
    Some(lines.render())
}

/// Remove the id tag from the line carrying `id`.
pub fn strip_item_id(text: &str, id: &str) -> Option<String> {
    let index = find_item_line(text, id)?;
    Some(strip_item_id_at(text, index))
}

/// Remove the id tag from the line at `index`.
pub fn strip_item_id_at(text: &str, index: usize) -> String {
    let mut lines = Lines::parse(text);
    if let Some(line) = lines.lines.get_mut(index) {
        *line = ID_TAG_RE.replace_all(line, "").trim_end().to_string();
    }
    lines.render()
}

/// Attach `id` to the first id-less line whose content matches `item`.
pub fn set_item_id(text: &str, item: &TaskItem, id: &str) -> Option<String> {
    let index = text.lines().position(|line| {
        parse_line(line, 0)
            .is_some_and(|parsed| parsed.id.is_none() && parsed.has_same_properties(item))
    })?;
    let mut lines = Lines::parse(text);
    let line = &mut lines.lines[index];
    let trimmed = line.trim_end().to_string();
    *line = format!("{trimmed} [id:: {id}]");
    Some(lines.render())
}

/// Insert `item` after the last task line, or before the id marker when the
/// document has no tasks yet.
pub fn append_item(text: &str, item: &TaskItem) -> String {
    let mut lines = Lines::parse(text);
    let rendered = serialize_item(item);
    let position = lines
        .lines
        .iter()
        .rposition(|line| is_task_line(line))
        .map(|index| index + 1)
        .or_else(|| {
            lines
                .lines
                .iter()
                .position(|line| COLLECTION_ID_RE.is_match(line))
        })
        .unwrap_or(lines.lines.len());
    lines.lines.insert(position, rendered);
    lines.trailing_newline = true;
    lines.render()
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// Line buffer that remembers whether the text ended with a newline.
struct Lines {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Lines {
    fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}
