//! `.env`-style configuration store.
//!
//! The file is a list of `KEY=VALUE` lines. The key is the exact text before
//! the first `=`; nothing is trimmed, quoted or escaped. Comment lines
//! (first non-blank character `#`, even with an `=` in them), blanks and
//! lines without `=` are kept verbatim and written back in place.
//! Every mutation is flushed through [`crate::io::atomic_write`], so a crash
//! mid-run leaves either the previous file or the updated one.

use crate::error::{DevstackError, Result};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

impl Line {
    fn parse(raw: &str) -> Self {
        if raw.trim_start().starts_with('#') {
            return Line::Other(raw.to_string());
        }
        match raw.split_once('=') {
            Some((key, value)) => Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            },
            None => Line::Other(raw.to_string()),
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            Line::Entry { key, .. } => Some(key),
            Line::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl EnvFile {
    /// Load the store from `path`. A missing file is an empty store; it is
    /// created on the first flush.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = if path.exists() {
            std::fs::read_to_string(&path)?
        } else {
            String::new()
        };
        Ok(Self::parse(path, &content))
    }

    /// Build a store from text without touching the disk.
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().map(Line::parse).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                Line::Entry { key, value } => Some((key.as_str(), value.as_str())),
                Line::Other(_) => None,
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace the line for `key` (or append one) and flush.
    ///
    /// Later lines carrying the same key are dropped so the key appears
    /// exactly once. Returns `false` without writing when the stored content
    /// is already what the upsert would produce. On a failed write the
    /// in-memory store keeps its previous state, matching the file on disk.
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<bool> {
        validate_key(key)?;
        if value.contains('\n') || value.contains('\r') {
            return Err(DevstackError::InvalidEnvValue(key.to_string()));
        }

        let mut next = Vec::with_capacity(self.lines.len() + 1);
        let mut placed = false;
        for line in &self.lines {
            if line.key() == Some(key) {
                if !placed {
                    next.push(Line::Entry {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                    placed = true;
                }
                continue;
            }
            next.push(line.clone());
        }
        if !placed {
            next.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        if next == self.lines && self.path.exists() {
            return Ok(false);
        }

        crate::io::atomic_write(&self.path, render(&next).as_bytes())?;
        self.lines = next;
        tracing::debug!(key, path = %self.path.display(), "env entry written");
        Ok(true)
    }

    /// Upsert only when the key is absent. Returns true if written.
    pub fn insert_if_missing(&mut self, key: &str, value: &str) -> Result<bool> {
        if self.contains(key) {
            return Ok(false);
        }
        self.upsert(key, value)
    }

    pub fn render(&self) -> String {
        render(&self.lines)
    }

    /// Replace `${KEY}` references with stored values. Unknown keys are left
    /// as written so the failure is visible downstream.
    pub fn interpolate(&self, text: &str) -> String {
        placeholder_re()
            .replace_all(text, |caps: &Captures| match self.get(&caps[1]) {
                Some(v) => v.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn render(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        match line {
            Line::Entry { key, value } => {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
            }
            Line::Other(raw) => out.push_str(raw),
        }
        out.push('\n');
    }
    out
}

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('#')
        || key.contains('=')
        || key.chars().any(char::is_whitespace)
    {
        return Err(DevstackError::InvalidEnvKey(key.to_string()));
    }
    Ok(())
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, content: &str) -> EnvFile {
        let path = dir.path().join(".env");
        std::fs::write(&path, content).unwrap();
        EnvFile::load(path).unwrap()
    }

    #[test]
    fn upsert_replaces_existing_line() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "PORT=8000\nNGROK_URL=placeholder\n");
        store
            .upsert("NGROK_URL", "https://abc123.ngrok-free.app")
            .unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(on_disk, "PORT=8000\nNGROK_URL=https://abc123.ngrok-free.app\n");
    }

    #[test]
    fn upsert_appends_missing_key() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "PORT=8000\n");
        assert!(store.upsert("LLM_MODEL", "llama3.1").unwrap());
        let on_disk = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(on_disk, "PORT=8000\nLLM_MODEL=llama3.1\n");
    }

    #[test]
    fn upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "PORT=8000\n");
        assert!(store.upsert("NGROK_URL", "https://x.app").unwrap());
        assert!(!store.upsert("NGROK_URL", "https://x.app").unwrap());
        let on_disk = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(
            on_disk.lines().filter(|l| l.starts_with("NGROK_URL=")).count(),
            1
        );
    }

    #[test]
    fn upsert_preserves_unrelated_lines_and_order() {
        let dir = TempDir::new().unwrap();
        let original = "# gateway\nWAHA_BASE_URL=http://localhost:3000\n\nNGROK_URL=\nPORT=8000\nDEBUG_MODE=True\n";
        let mut store = store_with(&dir, original);
        store.upsert("NGROK_URL", "https://y.app").unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(
            on_disk,
            "# gateway\nWAHA_BASE_URL=http://localhost:3000\n\nNGROK_URL=https://y.app\nPORT=8000\nDEBUG_MODE=True\n"
        );
    }

    #[test]
    fn upsert_collapses_duplicate_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "A=1\nNGROK_URL=old\nB=2\nNGROK_URL=older\n");
        store.upsert("NGROK_URL", "new").unwrap();
        assert_eq!(store.render(), "A=1\nNGROK_URL=new\nB=2\n");
    }

    #[test]
    fn key_match_is_exact_prefix_before_equals() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "NGROK_URL_OLD=keep\nNGROK=keep\n");
        store.upsert("NGROK_URL", "https://z.app").unwrap();
        assert_eq!(
            store.render(),
            "NGROK_URL_OLD=keep\nNGROK=keep\nNGROK_URL=https://z.app\n"
        );
    }

    #[test]
    fn value_may_contain_equals() {
        let store = EnvFile::parse(".env", "DATABASE_URL=postgres://u:p@h/db?sslmode=require\n");
        assert_eq!(
            store.get("DATABASE_URL"),
            Some("postgres://u:p@h/db?sslmode=require")
        );
    }

    #[test]
    fn crlf_input_is_normalized() {
        let store = EnvFile::parse(".env", "PORT=8000\r\nHOST=0.0.0.0\r\n");
        assert_eq!(store.get("PORT"), Some("8000"));
        assert_eq!(store.render(), "PORT=8000\nHOST=0.0.0.0\n");
    }

    #[test]
    fn missing_file_is_created_on_first_upsert() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut store = EnvFile::load(&path).unwrap();
        assert!(store.entries().is_empty());
        store.upsert("PORT", "8000").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "PORT=8000\n");
    }

    #[test]
    fn invalid_keys_and_values_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "PORT=8000\n");
        for key in ["", "A=B", "HAS SPACE", "TAB\tKEY", "#COMMENT"] {
            assert!(
                matches!(store.upsert(key, "v"), Err(DevstackError::InvalidEnvKey(_))),
                "expected invalid key: {key:?}"
            );
        }
        assert!(matches!(
            store.upsert("K", "line1\nline2"),
            Err(DevstackError::InvalidEnvValue(_))
        ));
        assert_eq!(store.render(), "PORT=8000\n");
    }

    #[test]
    fn failed_flush_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        // Parent is a regular file, so the tempfile cannot be created.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let mut store = EnvFile::parse(blocker.join(".env"), "PORT=8000\n");
        assert!(store.upsert("NGROK_URL", "https://x.app").is_err());
        assert_eq!(store.get("NGROK_URL"), None);
        assert_eq!(store.render(), "PORT=8000\n");
    }

    #[test]
    fn entries_in_file_order() {
        let store = EnvFile::parse(".env", "# c\nB=2\nA=1\n");
        assert_eq!(store.entries(), vec![("B", "2"), ("A", "1")]);
    }

    #[test]
    fn commented_out_assignment_is_not_an_entry() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "# NGROK_URL=old\n  #PORT=1\nPORT=8000\n");
        assert_eq!(store.entries(), vec![("PORT", "8000")]);
        assert_eq!(store.get("# NGROK_URL"), None);

        store.upsert("NGROK_URL", "https://n.app").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "# NGROK_URL=old\n  #PORT=1\nPORT=8000\nNGROK_URL=https://n.app\n"
        );
    }

    #[test]
    fn insert_if_missing_keeps_existing_value() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, "PORT=9000\n");
        assert!(!store.insert_if_missing("PORT", "8000").unwrap());
        assert!(store.insert_if_missing("HOST", "0.0.0.0").unwrap());
        assert_eq!(store.render(), "PORT=9000\nHOST=0.0.0.0\n");
    }

    #[test]
    fn interpolate_known_and_unknown_keys() {
        let store = EnvFile::parse(".env", "PORT=8000\nWAHA_API_KEY=abc\n");
        assert_eq!(
            store.interpolate("http://localhost:${PORT}/"),
            "http://localhost:8000/"
        );
        assert_eq!(
            store.interpolate("WAHA_API_KEY=${WAHA_API_KEY} ${MISSING}"),
            "WAHA_API_KEY=abc ${MISSING}"
        );
    }
}
