//! ES module import/export extraction and symbol binding.
//!
//! Resolves which local name (if any) a file binds to a given declaration,
//! following aliased imports (`import { checkX as f }`) and re-export chains
//! (`export { checkX } from "./flags"`, `export * from "./flags"`).
//!
//! Module specifiers are resolved lexically against the importing file's
//! directory with extension and `index.*` probing. Bare package specifiers
//! resolve to nothing — external packages are outside the project. Namespace
//! imports (`import * as ns`) are not followed; references through them are a
//! documented precision limit.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::path_util::{join_specifier, parent_dir};
use crate::project::{Project, SourceFile};
use crate::Declaration;

/// Extensions probed when a specifier omits one, in priority order.
const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// One name bound by an `import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name the symbol is visible under in the importing file.
    pub local: String,
    /// Name the symbol was exported under ("default" for default imports).
    pub imported: String,
    /// Raw module specifier text, quotes stripped.
    pub specifier: String,
}

/// One name forwarded by an `export ... from` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExport {
    /// Name this file exports the symbol under.
    pub exported: String,
    /// Name the symbol carries in the source module.
    pub inner: String,
    /// Raw module specifier text, quotes stripped.
    pub specifier: String,
}

/// Imports and re-exports of one module.
#[derive(Debug, Default, Clone)]
pub struct ModuleSurface {
    pub imports: Vec<ImportBinding>,
    pub reexports: Vec<ReExport>,
    /// Specifiers of `export * from "..."` statements.
    pub star_reexports: Vec<String>,
}

/// Extracts the import/export surface of a file by walking top-level
/// statements.
pub fn extract_surface(file: &SourceFile) -> ModuleSurface {
    let mut surface = ModuleSurface::default();
    let root = file.root();
    let mut cursor = root.walk();

    for stmt in root.named_children(&mut cursor) {
        match stmt.kind() {
            "import_statement" => extract_import(file, stmt, &mut surface),
            "export_statement" => extract_reexport(file, stmt, &mut surface),
            _ => {}
        }
    }

    surface
}

fn extract_import(file: &SourceFile, stmt: Node<'_>, surface: &mut ModuleSurface) {
    let Some(specifier) = source_specifier(file, stmt) else {
        return;
    };

    let mut cursor = stmt.walk();
    for clause in stmt.named_children(&mut cursor) {
        if clause.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = clause.walk();
        for item in clause.named_children(&mut clause_cursor) {
            match item.kind() {
                // `import Foo from "m"` — default binding.
                "identifier" => surface.imports.push(ImportBinding {
                    local: file.node_text(item).to_string(),
                    imported: "default".to_string(),
                    specifier: specifier.clone(),
                }),
                "named_imports" => {
                    let mut spec_cursor = item.walk();
                    for spec in item.named_children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = file.node_text(name).to_string();
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| file.node_text(a).to_string())
                            .unwrap_or_else(|| imported.clone());
                        surface.imports.push(ImportBinding {
                            local,
                            imported,
                            specifier: specifier.clone(),
                        });
                    }
                }
                // `import * as ns from "m"` — not followed.
                "namespace_import" => {}
                _ => {}
            }
        }
    }
}

fn extract_reexport(file: &SourceFile, stmt: Node<'_>, surface: &mut ModuleSurface) {
    // Only `export ... from "m"` forms bind across files.
    let Some(specifier) = source_specifier(file, stmt) else {
        return;
    };

    let mut saw_clause = false;
    let mut cursor = stmt.walk();
    for item in stmt.named_children(&mut cursor) {
        if item.kind() != "export_clause" {
            continue;
        }
        saw_clause = true;
        let mut spec_cursor = item.walk();
        for spec in item.named_children(&mut spec_cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            let inner = file.node_text(name).to_string();
            let exported = spec
                .child_by_field_name("alias")
                .map(|a| file.node_text(a).to_string())
                .unwrap_or_else(|| inner.clone());
            surface.reexports.push(ReExport {
                exported,
                inner,
                specifier: specifier.clone(),
            });
        }
    }

    if !saw_clause {
        // `export * from "m"` (namespaced star exports are not followed).
        let has_star = stmt.children(&mut cursor).any(|c| c.kind() == "*");
        if has_star {
            surface.star_reexports.push(specifier);
        }
    }
}

/// Reads the `source` field of an import/export statement, quotes stripped.
fn source_specifier(file: &SourceFile, stmt: Node<'_>) -> Option<String> {
    let source = stmt.child_by_field_name("source")?;
    let raw = file.node_text(source);
    if raw.len() < 2 {
        return None;
    }
    Some(raw[1..raw.len() - 1].to_string())
}

/// Resolves a module specifier to a project file key.
///
/// Only relative specifiers resolve. Probes the bare path, then each
/// extension, then `index.*` in the named directory — the lexical equivalent
/// of Node-style resolution, without touching the filesystem.
pub fn resolve_specifier(project: &Project, from_key: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") && specifier != "." {
        return None;
    }

    let joined = join_specifier(parent_dir(from_key), specifier)?;
    if project.contains(&joined) {
        return Some(joined);
    }
    for ext in PROBE_EXTENSIONS {
        let candidate = format!("{joined}.{ext}");
        if project.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in PROBE_EXTENSIONS {
        let candidate = format!("{joined}/index.{ext}");
        if project.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Returns the local names under which `decl` is visible in `file_key`.
///
/// The declaring file sees the function under its own name. Any other file
/// sees it only through an import whose chain of re-exports terminates at the
/// declaring file's symbol.
pub fn local_names_for(project: &Project, file_key: &str, decl: &Declaration) -> Vec<String> {
    if file_key == decl.file {
        return vec![decl.name.clone()];
    }

    let Some(file) = project.file(file_key) else {
        return Vec::new();
    };

    let mut names = Vec::new();
    for import in extract_surface(file).imports {
        let Some(target) = resolve_specifier(project, file_key, &import.specifier) else {
            continue;
        };
        let mut visited = HashSet::new();
        if export_provides(project, &target, &import.imported, decl, &mut visited)
            && !names.contains(&import.local)
        {
            names.push(import.local);
        }
    }
    names
}

/// Returns `true` if `file_key` exports `export_name` bound (possibly through
/// re-export chains) to `decl`. Cycles are cut by the visited set.
fn export_provides(
    project: &Project,
    file_key: &str,
    export_name: &str,
    decl: &Declaration,
    visited: &mut HashSet<(String, String)>,
) -> bool {
    if !visited.insert((file_key.to_string(), export_name.to_string())) {
        return false;
    }
    if file_key == decl.file && export_name == decl.name {
        return true;
    }
    let Some(file) = project.file(file_key) else {
        return false;
    };

    let surface = extract_surface(file);
    for re in &surface.reexports {
        if re.exported == export_name {
            if let Some(target) = resolve_specifier(project, file_key, &re.specifier) {
                if export_provides(project, &target, &re.inner, decl, visited) {
                    return true;
                }
            }
        }
    }
    for spec in &surface.star_reexports {
        if let Some(target) = resolve_specifier(project, file_key, spec) {
            if export_provides(project, &target, export_name, decl, visited) {
                return true;
            }
        }
    }
    false
}
