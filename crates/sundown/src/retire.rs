//! Reference replacement engine: neutralizes every call site of an eligible
//! declaration project-wide.
//!
//! The inner check is forced to `false`, so a bare invocation becomes the
//! literal `false` and a directly negated invocation collapses to `true`.
//! References that are neither are left untouched and not counted.
//!
//! Edits are planned against pre-edit byte offsets, applied per file in one
//! batch, and each touched file is re-parsed. Replacement passes must not run
//! concurrently over the same project; a second sequential pass over an
//! already-retired declaration plans zero edits.

use std::collections::HashSet;

use serde::Serialize;
use tree_sitter::Node;

use crate::imports::local_names_for;
use crate::project::{Edit, Project, SourceFile};
use crate::{Declaration, ModifiedNode};

/// Distinct nodes rewritten and distinct files that contained a call site.
#[derive(Debug, Default, Serialize)]
pub struct RetireOutcome {
    /// Post-substitution parents of every rewritten node, pre-edit coordinates.
    pub modified_nodes: Vec<ModifiedNode>,
    /// Files containing at least one replaced call site, in project order.
    pub modified_files: Vec<String>,
}

/// Replaces every invocation of `decl` with a constant boolean.
///
/// Resolution is semantic: each file's local binding names for the
/// declaration are computed through the import/export layer, so aliased
/// imports and re-export chains are followed. Mutation is in-memory only.
pub fn retire(project: &mut Project, decl: &Declaration) -> RetireOutcome {
    let keys: Vec<String> = project.keys().map(String::from).collect();

    let mut outcome = RetireOutcome::default();
    let mut seen_nodes: HashSet<ModifiedNode> = HashSet::new();
    let mut planned: Vec<(String, Vec<Edit>)> = Vec::new();

    for key in keys {
        let names = local_names_for(project, &key, decl);
        if names.is_empty() {
            continue;
        }
        let Some(file) = project.file(&key) else {
            continue;
        };
        let name_set: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut references = Vec::new();
        collect_identifier_refs(file.root(), file, &name_set, &mut references);

        let mut edits: Vec<Edit> = Vec::new();
        for reference in references {
            let Some(call) = invocation_of(reference) else {
                continue;
            };

            let (replaced, replacement) = match negation_of(file, call) {
                Some(negation) => (negation, "true"),
                None => (call, "false"),
            };
            let parent = replaced.parent().unwrap_or(replaced);

            let (start, end) = (replaced.start_byte(), replaced.end_byte());
            // An invocation nested inside an argument of an outer call site is
            // subsumed by the outer replacement. The identifier walk is
            // pre-order, so the enclosing site is always planned first.
            if edits.iter().any(|e| e.start <= start && end <= e.end) {
                continue;
            }

            edits.push(Edit {
                start,
                end,
                replacement: replacement.to_string(),
            });

            let handle = ModifiedNode {
                file: key.clone(),
                kind: parent.kind().to_string(),
                start_byte: parent.start_byte() as u32,
                end_byte: parent.end_byte() as u32,
            };
            if seen_nodes.insert(handle.clone()) {
                outcome.modified_nodes.push(handle);
            }
            if !outcome.modified_files.contains(&key) {
                outcome.modified_files.push(key.clone());
            }
        }

        if !edits.is_empty() {
            planned.push((key, edits));
        }
    }

    for (key, edits) in planned {
        if let Err(e) = project.apply_edits(&key, edits) {
            tracing::warn!(file = %key, error = %e, "re-parse after replacement failed");
        }
    }

    outcome
}

/// Recursively collects identifier nodes whose text is one of `names`.
fn collect_identifier_refs<'t>(
    node: Node<'t>,
    file: &SourceFile,
    names: &HashSet<&str>,
    out: &mut Vec<Node<'t>>,
) {
    if node.kind() == "identifier" && names.contains(file.node_text(node)) {
        out.push(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_identifier_refs(child, file, names, out);
    }
}

/// Returns the call expression directly invoking `reference`, or `None` when
/// the reference is not the callee of a direct invocation.
fn invocation_of(reference: Node<'_>) -> Option<Node<'_>> {
    let parent = reference.parent()?;
    if parent.kind() != "call_expression" {
        return None;
    }
    let callee = parent.child_by_field_name("function")?;
    (callee.id() == reference.id()).then_some(parent)
}

/// Returns the `!` unary whose argument is exactly `call`, if any.
fn negation_of<'t>(file: &SourceFile, call: Node<'t>) -> Option<Node<'t>> {
    let parent = call.parent()?;
    if parent.kind() != "unary_expression" {
        return None;
    }
    let operator = parent.child_by_field_name("operator")?;
    if file.node_text(operator) != "!" {
        return None;
    }
    let argument = parent.child_by_field_name("argument")?;
    (argument.id() == call.id()).then_some(parent)
}
