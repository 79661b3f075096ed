//! Local card documents.
//!
//! A vault is a directory of markdown files. A file is a tracked card
//! document when it lives under the configured task folder and carries the
//! card tag, either in its YAML front matter (`tags:`) or inline as `#tag`.
//! Document paths are always relative to the vault root.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::lock::write_atomic_str;
use crate::task::split_label;

/// A tracked card document, identified by its vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Document {
    pub path: PathBuf,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Storage for card documents.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list_tracked_documents(&self) -> Result<Vec<Document>>;

    async fn is_tracked_document(&self, path: &Path) -> Result<bool>;

    async fn read_document(&self, path: &Path) -> Result<String>;

    async fn write_document(&self, path: &Path, text: &str) -> Result<()>;

    /// Create a new card document for `label` holding `body`; returns its path.
    async fn create_document(&self, label: &str, body: &str) -> Result<PathBuf>;

    /// Move a document so its label becomes `label`; returns the new path.
    async fn rename_document(&self, path: &Path, label: &str) -> Result<PathBuf>;

    async fn document_modified_time(&self, path: &Path) -> Result<i64>;

    fn document_label(&self, path: &Path) -> String;
}

/// `LocalStore` backed by a directory tree.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    task_folder: PathBuf,
    tag: String,
    new_card_template: String,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>, config: &VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::VaultNotFound(root));
        }
        Ok(Self {
            root,
            task_folder: normalize_folder(&config.task_folder),
            tag: config.tag.trim().trim_start_matches('#').to_string(),
            new_card_template: config.new_card_template.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Vault-relative form of `path`, or `None` when it lies outside the vault.
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    fn in_task_folder(&self, path: &Path) -> bool {
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        let hidden = path.components().any(|component| match component {
            Component::Normal(part) => part.to_string_lossy().starts_with('.'),
            _ => false,
        });
        is_markdown && !hidden && path.starts_with(&self.task_folder)
    }

    fn path_for_label(&self, label: &str) -> PathBuf {
        let (group, name) = split_label(label);
        let mut path = self.task_folder.clone();
        if let Some(group) = group {
            path.push(sanitize_file_name(&group));
        }
        path.push(format!("{}.md", sanitize_file_name(&name)));
        path
    }

    /// First free path for `label`, suffixing the stem on collision.
    fn free_path_for_label(&self, label: &str) -> PathBuf {
        let path = self.path_for_label(label);
        if !self.absolute(&path).exists() {
            return path;
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut n = 1;
        loop {
            let candidate = path.with_file_name(format!("{stem} {n}.md"));
            if !self.absolute(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn new_card_text(&self, body: &str) -> String {
        let mut text = if has_tag(&self.new_card_template, &self.tag) {
            self.new_card_template.clone()
        } else {
            format!("---\ntags:\n  - {}\n---\n{}", self.tag, self.new_card_template)
        };
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(body);
        text
    }
}

#[async_trait]
impl LocalStore for Vault {
    async fn list_tracked_documents(&self) -> Result<Vec<Document>> {
        let base = self.absolute(&self.task_folder);
        let base = base.to_string_lossy();
        let pattern = format!(
            "{}/**/*.md",
            glob::Pattern::escape(base.trim_end_matches('/'))
        );
        let entries: Vec<_> = glob::glob(&pattern)
            .map_err(|err| Error::InvalidConfig(format!("vault.task_folder: {err}")))?
            .collect();

        let mut documents = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable vault entry");
                    continue;
                }
            };
            let Some(relative) = self.relative(&path) else {
                continue;
            };
            if self.is_tracked_document(&relative).await? {
                documents.push(Document::new(relative));
            }
        }
        documents.sort();
        debug!(count = documents.len(), "listed tracked documents");
        Ok(documents)
    }

    async fn is_tracked_document(&self, path: &Path) -> Result<bool> {
        let Some(relative) = self.relative(path) else {
            return Ok(false);
        };
        if !self.in_task_folder(&relative) {
            return Ok(false);
        }
        match fs::read_to_string(self.absolute(&relative)) {
            Ok(text) => Ok(has_tag(&text, &self.tag)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_document(&self, path: &Path) -> Result<String> {
        match fs::read_to_string(self.absolute(path)) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::DocumentNotFound(path.to_path_buf()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_document(&self, path: &Path, text: &str) -> Result<()> {
        write_atomic_str(self.absolute(path), text)
    }

    async fn create_document(&self, label: &str, body: &str) -> Result<PathBuf> {
        let path = self.free_path_for_label(label);
        write_atomic_str(self.absolute(&path), &self.new_card_text(body))?;
        debug!(path = %path.display(), label, "created card document");
        Ok(path)
    }

    async fn rename_document(&self, path: &Path, label: &str) -> Result<PathBuf> {
        let from = self.absolute(path);
        if !from.exists() {
            return Err(Error::DocumentNotFound(path.to_path_buf()));
        }
        let target = self.path_for_label(label);
        if target == path {
            return Ok(target);
        }
        let target = self.free_path_for_label(label);
        let to = self.absolute(&target);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from, &to)?;
        debug!(from = %path.display(), to = %target.display(), "renamed card document");
        Ok(target)
    }

    async fn document_modified_time(&self, path: &Path) -> Result<i64> {
        let metadata = fs::metadata(self.absolute(path))?;
        Ok(epoch_millis(metadata.modified()?))
    }

    fn document_label(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = path
            .parent()
            .and_then(Path::file_name)
            .map(|dir| dir.to_string_lossy().to_string());
        crate::task::join_label(parent.as_deref(), &stem)
    }
}

/// Milliseconds since the epoch, saturating; times before it read as 0.
fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// True when `text` carries `tag` in its front matter or as an inline `#tag`.
pub fn has_tag(text: &str, tag: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    if front_matter_tags(text).iter().any(|value| value == tag) {
        return true;
    }
    let inline = format!("#{tag}");
    text.split_whitespace().any(|word| word == inline)
}

/// Card front matter; only the tags matter here.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default, alias = "tag")]
    tags: Option<TagField>,
}

/// `tags:` may hold a single string or a sequence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagField {
    One(String),
    Many(Vec<serde_yaml::Value>),
}

impl TagField {
    fn into_tags(self) -> Vec<String> {
        match self {
            TagField::One(value) => value
                .split(|ch: char| ch == ',' || ch.is_whitespace())
                .map(clean_tag)
                .filter(|tag| !tag.is_empty())
                .collect(),
            TagField::Many(values) => values
                .iter()
                .filter_map(serde_yaml::Value::as_str)
                .map(clean_tag)
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }
}

/// The YAML block between the leading `---` fences, if any.
fn split_front_matter(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;
    if rest.starts_with("---") {
        return Some("");
    }
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn front_matter_tags(text: &str) -> Vec<String> {
    let Some(yaml) = split_front_matter(text) else {
        return Vec::new();
    };
    if yaml.trim().is_empty() {
        return Vec::new();
    }
    match serde_yaml::from_str::<FrontMatter>(yaml) {
        Ok(front) => front.tags.map(TagField::into_tags).unwrap_or_default(),
        Err(err) => {
            debug!(error = %err, "unreadable front matter");
            Vec::new()
        }
    }
}

fn clean_tag(value: &str) -> String {
    value.trim().trim_start_matches('#').to_string()
}

fn normalize_folder(folder: &str) -> PathBuf {
    folder
        .split('/')
        .filter(|part| !part.trim().is_empty() && *part != ".")
        .collect()
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CARD: &str = "---\ntags:\n  - kanban_card\n---\n- [ ] one\n";

    fn vault(dir: &TempDir, folder: &str) -> Vault {
        let config = VaultConfig {
            task_folder: folder.to_string(),
            ..VaultConfig::default()
        };
        Vault::open(dir.path(), &config).expect("open vault")
    }

    fn write(dir: &TempDir, path: &str, text: &str) {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    }

    #[test]
    fn tag_detection_covers_front_matter_forms() {
        assert!(has_tag(CARD, "kanban_card"));
        assert!(has_tag("---\ntags: [notes, kanban_card]\n---\n", "kanban_card"));
        assert!(has_tag("---\ntags: kanban_card\n---\n", "kanban_card"));
        assert!(has_tag("text #kanban_card here", "kanban_card"));
        assert!(!has_tag("---\ntags: [kanban_cards]\n---\n", "kanban_card"));
        assert!(!has_tag("- [ ] plain", "kanban_card"));
    }

    #[test]
    fn tag_detection_reads_yaml_values() {
        assert!(has_tag("---\ntags:\n  - \"a, b\"\n  - '#kanban_card'\n---\n", "kanban_card"));
        assert!(has_tag("---\ntitle: Launch\ntags: >\n  notes kanban_card\n---\n", "kanban_card"));
        assert!(has_tag("---\r\ntag: kanban_card\r\n---\r\n", "kanban_card"));
        assert!(!has_tag("---\ntags: [\"notes, kanban_card\"]\n---\n", "kanban_card"));
        assert!(!has_tag("---\ntags: [unclosed\n---\n", "kanban_card"));
        assert!(!has_tag("---\n---\nbody", "kanban_card"));
    }

    #[test]
    fn modified_times_saturate() {
        let far = UNIX_EPOCH + std::time::Duration::from_secs(1 << 62);
        assert_eq!(epoch_millis(far), i64::MAX);
        assert_eq!(epoch_millis(UNIX_EPOCH + std::time::Duration::from_millis(1500)), 1500);
        assert_eq!(epoch_millis(UNIX_EPOCH - std::time::Duration::from_secs(1)), 0);
    }

    #[test]
    fn labels_come_from_parent_dir_and_stem() {
        let dir = TempDir::new().expect("tempdir");
        let vault = vault(&dir, "/");
        assert_eq!(vault.document_label(Path::new("Work/Launch.md")), "Work > Launch");
        assert_eq!(vault.document_label(Path::new("Inbox.md")), "Inbox");
        assert_eq!(vault.path_for_label("Work > Launch"), PathBuf::from("Work/Launch.md"));
    }

    #[tokio::test]
    async fn lists_only_tagged_markdown_under_task_folder() {
        let dir = TempDir::new().expect("tempdir");
        write(&dir, "Cards/Work/Launch.md", CARD);
        write(&dir, "Cards/Work/Notes.md", "just notes");
        write(&dir, "Cards/.trash/Old.md", CARD);
        write(&dir, "Elsewhere/Other.md", CARD);

        let vault = vault(&dir, "Cards");
        let documents = vault.list_tracked_documents().await.expect("list");
        assert_eq!(documents, vec![Document::new("Cards/Work/Launch.md")]);
        assert!(!vault
            .is_tracked_document(Path::new("Elsewhere/Other.md"))
            .await
            .expect("check"));
        assert!(!vault
            .is_tracked_document(Path::new("Cards/Missing.md"))
            .await
            .expect("check"));
    }

    #[tokio::test]
    async fn created_cards_are_tracked_and_unique() {
        let dir = TempDir::new().expect("tempdir");
        let vault = vault(&dir, "/");

        let first = vault
            .create_document("Work > Launch", "<!---L--->\n")
            .await
            .expect("create");
        let second = vault
            .create_document("Work > Launch", "")
            .await
            .expect("create");

        assert_eq!(first, PathBuf::from("Work/Launch.md"));
        assert_eq!(second, PathBuf::from("Work/Launch 1.md"));
        assert!(vault.is_tracked_document(&first).await.expect("check"));
        let text = vault.read_document(&first).await.expect("read");
        assert!(text.ends_with("<!---L--->\n"));
    }

    #[tokio::test]
    async fn rename_moves_between_groups() {
        let dir = TempDir::new().expect("tempdir");
        write(&dir, "Work/Launch.md", CARD);
        let vault = vault(&dir, "/");

        let moved = vault
            .rename_document(Path::new("Work/Launch.md"), "Home > Launch")
            .await
            .expect("rename");
        assert_eq!(moved, PathBuf::from("Home/Launch.md"));
        assert!(dir.path().join("Home/Launch.md").exists());
        assert!(!dir.path().join("Work/Launch.md").exists());
    }

    #[tokio::test]
    async fn missing_document_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let vault = vault(&dir, "/");
        let err = vault
            .read_document(Path::new("Nope.md"))
            .await
            .expect_err("missing");
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[test]
    fn missing_root_is_rejected() {
        let err = Vault::open("/definitely/not/here", &VaultConfig::default()).expect_err("missing");
        assert!(matches!(err, Error::VaultNotFound(_)));
    }
}
