//! Script store: discovers and reads delivery scripts from one directory.

use std::path::{Path, PathBuf};

use delivery_state::ContentDigest;
use tracing::{debug, warn};

use crate::error::{DeliveryError, Result};

/// File extension that marks a delivery script.
pub const SCRIPT_EXTENSION: &str = "delivery";

/// Lines starting with this marker are comments.
pub const COMMENT_MARKER: &str = "##";

/// A named, ordered sequence of instruction lines read from one file.
///
/// Built fresh on every run and never mutated; only its execution record is
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryScript {
    /// File name including extension; also the ledger identity.
    pub name: String,
    /// Instructions in source order, comments and blank lines removed.
    pub instructions: Vec<String>,
    /// Digest of the raw file bytes.
    pub digest: ContentDigest,
}

impl DeliveryScript {
    /// Build a script from raw file contents.
    pub fn from_bytes(name: impl Into<String>, raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        Self {
            name: name.into(),
            instructions: parse_instructions(&text),
            digest: ContentDigest::from_bytes(raw),
        }
    }
}

/// Split a script body into instructions.
///
/// Drops blank lines and full-line `##` comments. There is no inline comment
/// syntax: `##` after other text is part of the instruction.
pub fn parse_instructions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect()
}

/// Delivery scripts in a single directory (no recursion).
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Names of the delivery scripts, sorted ascending.
    pub async fn script_names(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|source| {
            DeliveryError::DirectoryAccess {
                path: self.dir.clone(),
                source,
            }
        })?;

        let mut names = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| DeliveryError::DirectoryAccess {
                    path: self.dir.clone(),
                    source,
                })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            if !is_script_path(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(?raw, "skipping delivery script with non UTF-8 name"),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Every delivery script, ordered by file name.
    pub async fn list_scripts(&self) -> Result<Vec<DeliveryScript>> {
        let names = self.script_names().await?;
        let mut scripts = Vec::with_capacity(names.len());
        for name in names {
            scripts.push(self.read_script(&name).await?);
        }
        debug!(count = scripts.len(), dir = %self.dir.display(), "listed delivery scripts");
        Ok(scripts)
    }

    /// Read one script by file name.
    pub async fn read_script(&self, name: &str) -> Result<DeliveryScript> {
        let path = self.dir.join(name);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| DeliveryError::ScriptRead { path, source })?;
        Ok(DeliveryScript::from_bytes(name, &raw))
    }
}

fn is_script_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_lines_are_stripped() {
        assert_eq!(parse_instructions("## note\r\nfoo"), vec!["foo"]);
    }

    #[test]
    fn blank_lines_are_stripped() {
        let text = "\n  \nuser list\n\n  package import x.zip  \n";
        assert_eq!(
            parse_instructions(text),
            vec!["user list", "package import x.zip"]
        );
    }

    #[test]
    fn inline_markers_are_kept() {
        assert_eq!(parse_instructions("echo a ## b"), vec!["echo a ## b"]);
    }

    #[test]
    fn indented_comment_is_still_a_comment() {
        assert!(parse_instructions("   ## indented").is_empty());
    }

    #[test]
    fn digest_covers_raw_bytes_including_comments() {
        let a = DeliveryScript::from_bytes("a.delivery", b"## v1\nfoo");
        let b = DeliveryScript::from_bytes("a.delivery", b"## v2\nfoo");
        assert_eq!(a.instructions, b.instructions);
        assert_ne!(a.digest, b.digest);
    }

    #[tokio::test]
    async fn lists_in_name_order_and_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("002-b.delivery"), "echo b").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("001-a.delivery"), "echo a").unwrap();
        std::fs::create_dir(dir.path().join("003-nested.delivery")).unwrap();

        let store = ScriptStore::new(dir.path());
        let names = store.script_names().await.unwrap();
        assert_eq!(names, vec!["001-a.delivery", "002-b.delivery"]);

        let scripts = store.list_scripts().await.unwrap();
        assert_eq!(scripts[0].instructions, vec!["echo a"]);
    }

    #[tokio::test]
    async fn does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/001.delivery"), "echo").unwrap();

        let names = ScriptStore::new(dir.path()).script_names().await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScriptStore::new(dir.path().join("missing"))
            .list_scripts()
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::DirectoryAccess { .. }));
    }
}
