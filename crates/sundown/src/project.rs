//! Source tree provider: loads a JS/TS project into tree-sitter trees and owns
//! per-file text buffers.
//!
//! The provider supports in-place byte-range edits followed by a re-parse, so
//! replacement passes always see post-edit trees. Buffers are owned `String`s
//! rather than mmaps because edits splice the text.

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Language, Node, Parser, Tree};
use walkdir::WalkDir;

use crate::path_util::normalize_key;
use crate::SundownError;

/// Grammar selection per file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Js,
    Jsx,
    Ts,
    Tsx,
}

impl Lang {
    /// Maps a file extension to its grammar, `None` for non-source files.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" | "mjs" | "cjs" => Some(Lang::Js),
            "jsx" => Some(Lang::Jsx),
            "ts" => Some(Lang::Ts),
            "tsx" => Some(Lang::Tsx),
            _ => None,
        }
    }

    /// The tree-sitter language for this grammar.
    pub fn language(self) -> Language {
        match self {
            // JSX constructs are part of the core JavaScript grammar.
            Lang::Js | Lang::Jsx => tree_sitter_javascript::LANGUAGE.into(),
            Lang::Ts => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Lang::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// A byte-range splice against a file's text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte offset where the replaced range starts.
    pub start: usize,
    /// Byte offset past the replaced range.
    pub end: usize,
    /// Text substituted for the range.
    pub replacement: String,
}

/// One parsed source file. The tree is kept in sync with the text: every
/// applied edit batch triggers a re-parse.
pub struct SourceFile {
    /// Normalized key (UTF-8, forward slashes).
    pub key: String,
    /// Grammar used to parse this file.
    pub lang: Lang,
    text: String,
    tree: Tree,
}

impl SourceFile {
    fn parse(key: String, lang: Lang, text: String) -> Result<Self, SundownError> {
        let tree = parse_text(lang, &text)?;
        Ok(Self {
            key,
            lang,
            text,
            tree,
        })
    }

    /// Current file text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current file text as bytes, for tree-sitter text access.
    pub fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Root node of the current tree.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Text of a node in this file. Non-UTF-8 spans degrade to `""`.
    pub fn node_text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.bytes()).unwrap_or("")
    }
}

fn parse_text(lang: Lang, text: &str) -> Result<Tree, SundownError> {
    let mut parser = Parser::new();
    parser
        .set_language(&lang.language())
        .map_err(|e| SundownError::ParseFailure(format!("Grammar load failed: {e}")))?;
    parser
        .parse(text.as_bytes(), None)
        .ok_or_else(|| SundownError::ParseFailure("Parse returned None".to_string()))
}

/// An already-loaded, queryable project workspace.
///
/// Owns every file's text and tree. Lookup is by normalized key; iteration
/// order is deterministic (keys sorted at load).
pub struct Project {
    files: Vec<SourceFile>,
    index: HashMap<String, usize>,
}

impl Project {
    /// Loads every JS/TS source file under `root`.
    ///
    /// Excluded directories (`node_modules`, `.git`, build output) are never
    /// entered. Oversized and non-UTF-8 files are skipped with a warning;
    /// they never abort the load.
    ///
    /// # Errors
    /// Returns `IoError` if the root itself cannot be canonicalized, or
    /// `ParseFailure` if a grammar fails to initialize.
    pub fn load(root: &Path) -> Result<Self, SundownError> {
        let root = dunce::canonicalize(root)?;
        let mut files = Vec::new();

        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(e.path()))
            .flatten()
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
            let Some(lang) = Lang::from_extension(ext) else {
                continue;
            };

            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if len > u32::MAX as u64 {
                tracing::warn!(path = %path.display(), "skipping file over 4GB span limit");
                continue;
            }

            let raw = match std::fs::read(path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let text = match String::from_utf8(raw) {
                Ok(t) => t,
                Err(_) => {
                    tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
                    continue;
                }
            };

            let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            let key = normalize_key(&canonical);
            files.push(SourceFile::parse(key, lang, text)?);
        }

        files.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self::from_files(files))
    }

    /// Builds a project from `(key, text)` pairs without touching the
    /// filesystem. Grammar is chosen from the key's extension, defaulting to
    /// JavaScript.
    pub fn from_memory(sources: &[(&str, &str)]) -> Result<Self, SundownError> {
        let mut files = Vec::new();
        for (key, text) in sources {
            let key = key.replace('\\', "/");
            let ext = key.rsplit('.').next().unwrap_or("");
            let lang = Lang::from_extension(ext).unwrap_or(Lang::Js);
            files.push(SourceFile::parse(key, lang, (*text).to_string())?);
        }
        files.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self::from_files(files))
    }

    fn from_files(files: Vec<SourceFile>) -> Self {
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.key.clone(), i))
            .collect();
        Self { files, index }
    }

    /// All file keys, in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.key.as_str())
    }

    /// Looks up a file by normalized key.
    pub fn file(&self, key: &str) -> Option<&SourceFile> {
        self.index.get(key).map(|&i| &self.files[i])
    }

    /// Returns `true` if the key belongs to this project.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Resolves a file hint path to a project key.
    ///
    /// Tries filesystem canonicalization first (disk-loaded projects), then a
    /// direct normalized-string match (in-memory projects). `None` means the
    /// hint does not name a loaded file.
    pub fn resolve_hint(&self, hint: &Path) -> Option<String> {
        if let Ok(canonical) = dunce::canonicalize(hint) {
            let key = normalize_key(&canonical);
            if self.contains(&key) {
                return Some(key);
            }
        }
        let direct = normalize_key(hint);
        self.contains(&direct).then_some(direct)
    }

    /// Applies a batch of edits to one file and re-parses it.
    ///
    /// Edits are applied in descending start order so earlier splices never
    /// shift later ranges. Ranges outside the current text are skipped.
    ///
    /// # Errors
    /// Returns `ParseFailure` if the post-edit text fails to re-parse.
    pub fn apply_edits(&mut self, key: &str, mut edits: Vec<Edit>) -> Result<(), SundownError> {
        let Some(&idx) = self.index.get(key) else {
            return Ok(());
        };
        if edits.is_empty() {
            return Ok(());
        }

        edits.sort_by(|a, b| b.start.cmp(&a.start));
        let file = &mut self.files[idx];
        // Ranges are in pre-edit coordinates, so each splice must sit entirely
        // below the previous one or the stale offsets would corrupt the text.
        let mut floor = file.text.len();
        for edit in edits {
            if edit.start > edit.end || edit.end > floor {
                continue;
            }
            if !file.text.is_char_boundary(edit.start) || !file.text.is_char_boundary(edit.end) {
                continue;
            }
            file.text.replace_range(edit.start..edit.end, &edit.replacement);
            floor = edit.start;
        }
        file.tree = parse_text(file.lang, &file.text)?;
        Ok(())
    }
}

/// Returns `true` if the directory entry should never be walked into.
fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| {
            matches!(
                name,
                "node_modules" | ".git" | "dist" | "build" | "coverage" | "target" | ".next"
            )
        })
        .unwrap_or(false)
}
