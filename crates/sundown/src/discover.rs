//! Declaration locator: finds kill-switch helper functions and applies the
//! active mode's eligibility rules.
//!
//! Scan-mode file selection is a cheap prefilter — the file must import a
//! symbol whose name contains "killswitch" (case-insensitive) and textually
//! contain the activation-check member name. False positives are fine; the
//! structural match below rejects them. True candidates following the naming
//! convention are never dropped.

use std::sync::OnceLock;

use aho_corasick::AhoCorasick;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

use crate::heuristics::{first_date_in_text, is_valid_flag_id, parse_date_literal};
use crate::imports::extract_surface;
use crate::project::{Lang, Project, SourceFile};
use crate::{Declaration, DiscoverOptions, ACTIVATION_CHECK, KILL_SWITCH_HINT};

/// S-expression for top-level (optionally exported) function declarations.
/// Shared by the JS, TS, and TSX grammars.
const FN_S_EXPR: &str = r#"
    (program
      (function_declaration
        name: (identifier) @fn.name) @fn.def)

    (program
      (export_statement
        declaration: (function_declaration
          name: (identifier) @fn.name) @fn.def))
"#;

static JS_FN_QUERY: OnceLock<Query> = OnceLock::new();
static TS_FN_QUERY: OnceLock<Query> = OnceLock::new();
static TSX_FN_QUERY: OnceLock<Query> = OnceLock::new();
static ACTIVATION_SCAN: OnceLock<AhoCorasick> = OnceLock::new();

fn fn_query(lang: Lang) -> &'static Query {
    let cell = match lang {
        Lang::Js | Lang::Jsx => &JS_FN_QUERY,
        Lang::Ts => &TS_FN_QUERY,
        Lang::Tsx => &TSX_FN_QUERY,
    };
    cell.get_or_init(|| {
        Query::new(&lang.language(), FN_S_EXPR).expect(
            "Function query compilation failed — this is a bug in the hardcoded S-expression",
        )
    })
}

fn activation_scan() -> &'static AhoCorasick {
    ACTIVATION_SCAN.get_or_init(|| {
        AhoCorasick::new([ACTIVATION_CHECK])
            .expect("Activation automaton build failed — this is a bug in the hardcoded pattern")
    })
}

/// Structural classification of a candidate function body.
///
/// A body qualifies only when its single meaningful statement is a return of
/// a call whose callee member is [`ACTIVATION_CHECK`]. Everything else is
/// `Other` — one total match, no ad hoc type inspection.
#[derive(Debug)]
pub enum BodyShape<'t> {
    /// `return <obj>.isActivated(...)` and nothing else.
    ReturnOfCall { call: Node<'t> },
    /// Any other body shape.
    Other,
}

/// Classifies a function declaration's body.
pub fn body_shape<'t>(func: Node<'t>, source: &[u8]) -> BodyShape<'t> {
    let Some(body) = func.child_by_field_name("body") else {
        return BodyShape::Other;
    };

    let mut ret: Option<Node<'t>> = None;
    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        match stmt.kind() {
            "comment" => continue,
            "return_statement" if ret.is_none() => ret = Some(stmt),
            _ => return BodyShape::Other,
        }
    }

    let Some(expr) = ret.and_then(|r| r.named_child(0)) else {
        return BodyShape::Other;
    };
    if expr.kind() != "call_expression" {
        return BodyShape::Other;
    }
    let Some(callee) = expr.child_by_field_name("function") else {
        return BodyShape::Other;
    };
    if callee.kind() != "member_expression" {
        return BodyShape::Other;
    }
    let member = callee
        .child_by_field_name("property")
        .and_then(|p| p.utf8_text(source).ok());
    if member == Some(ACTIVATION_CHECK) {
        BodyShape::ReturnOfCall { call: expr }
    } else {
        BodyShape::Other
    }
}

/// Result of a discovery pass. `identifiers[i]` is the flag id of
/// `declarations[i]`.
#[derive(Debug, Default)]
pub struct Discovery {
    pub declarations: Vec<Declaration>,
    pub identifiers: Vec<String>,
}

/// Locates eligible kill-switch declarations.
///
/// With a file hint, exactly that file is inspected; an unresolvable hint is
/// logged and yields zero matches. Otherwise the whole project is scanned
/// through the prefilter. Eligibility per mode:
/// - **Targeted** (`target_id` set): extracted id equals the target exactly.
///   No date or format check.
/// - **Scan**: id is a valid UUID, a graduation date resolves, and it is
///   strictly earlier than the threshold.
///
/// Every mismatch degrades to exclusion; this never fails.
pub fn discover(project: &Project, opts: &DiscoverOptions) -> Discovery {
    let candidate_keys: Vec<String> = match &opts.file_hint {
        Some(hint) => match project.resolve_hint(hint) {
            Some(key) => vec![key],
            None => {
                tracing::warn!(
                    hint = %hint.display(),
                    "file hint did not resolve to a project file; no files matched"
                );
                Vec::new()
            }
        },
        None => project
            .keys()
            .filter(|key| project.file(key).is_some_and(prefilter))
            .map(String::from)
            .collect(),
    };

    let mut discovery = Discovery::default();
    for key in candidate_keys {
        let Some(file) = project.file(&key) else {
            continue;
        };
        for func in top_level_functions(file) {
            let Some(decl) = extract_declaration(file, func) else {
                continue;
            };
            if eligible(&decl, opts) {
                discovery.identifiers.push(decl.flag_id.clone());
                discovery.declarations.push(decl);
            }
        }
    }
    discovery
}

/// Scan-mode prefilter: kill-switch import plus a textual activation-check hit.
fn prefilter(file: &SourceFile) -> bool {
    if !activation_scan().is_match(file.bytes()) {
        return false;
    }
    extract_surface(file).imports.iter().any(|imp| {
        imp.local.to_lowercase().contains(KILL_SWITCH_HINT)
            || imp.imported.to_lowercase().contains(KILL_SWITCH_HINT)
    })
}

/// Collects top-level function declarations, including `export`-wrapped ones.
fn top_level_functions<'t>(file: &'t SourceFile) -> Vec<Node<'t>> {
    let query = fn_query(file.lang);
    let capture_names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, file.root(), file.bytes());
    let mut functions = Vec::new();

    while let Some(m) = matches.next() {
        if let Some(def) = m
            .captures
            .iter()
            .find(|c| capture_names[c.index as usize] == "fn.def")
        {
            functions.push(def.node);
        }
    }
    functions
}

/// Builds a `Declaration` from a structurally matching function, or `None`
/// for any shape mismatch (silent skip, expected and frequent).
fn extract_declaration(file: &SourceFile, func: Node<'_>) -> Option<Declaration> {
    let BodyShape::ReturnOfCall { call } = body_shape(func, file.bytes()) else {
        return None;
    };

    let name = file.node_text(func.child_by_field_name("name")?).to_string();
    let args = call.child_by_field_name("arguments")?;

    // First argument must be a plain string literal; template literals and
    // identifiers disqualify the declaration outright.
    let flag_id = string_literal(file, args.named_child(0)?)?;
    let date_arg = args
        .named_child(1)
        .and_then(|a| string_literal(file, a))
        .and_then(|s| parse_date_literal(&s));
    let comment_date = first_date_in_text(&attached_comments(file, func));

    Some(Declaration {
        name,
        file: file.key.clone(),
        start_byte: func.start_byte() as u32,
        end_byte: func.end_byte() as u32,
        start_line: (func.start_position().row + 1) as u32,
        flag_id,
        date_arg,
        comment_date,
    })
}

fn eligible(decl: &Declaration, opts: &DiscoverOptions) -> bool {
    match &opts.target_id {
        Some(target) => decl.flag_id == *target,
        None => {
            is_valid_flag_id(&decl.flag_id)
                && decl
                    .graduation_date()
                    .is_some_and(|d| d < opts.threshold)
        }
    }
}

/// Unquotes a plain string literal node. `None` for any other node kind.
fn string_literal(file: &SourceFile, node: Node<'_>) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let raw = file.node_text(node);
    (raw.len() >= 2).then(|| raw[1..raw.len() - 1].to_string())
}

/// Gathers leading and trailing comment text attached to a declaration.
///
/// Leading comments are the contiguous run of comment siblings directly above
/// the top-level statement (the `export` wrapper when present); a trailing
/// comment counts when it ends on the declaration's last line.
fn attached_comments(file: &SourceFile, func: Node<'_>) -> String {
    let top = match func.parent() {
        Some(p) if p.kind() == "export_statement" => p,
        _ => func,
    };

    let mut leading: Vec<String> = Vec::new();
    let mut prev = top.prev_sibling();
    while let Some(node) = prev {
        if node.kind() != "comment" {
            break;
        }
        leading.push(file.node_text(node).to_string());
        prev = node.prev_sibling();
    }
    leading.reverse();

    if let Some(next) = top.next_sibling() {
        if next.kind() == "comment" && next.start_position().row == top.end_position().row {
            leading.push(file.node_text(next).to_string());
        }
    }

    leading.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    const FLAG_X: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";
    const FLAG_Y: &str = "11111111-1111-1111-1111-111111111111";

    fn opts_with_threshold(ymd: (i32, u32, u32)) -> DiscoverOptions {
        DiscoverOptions {
            threshold: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
            ..DiscoverOptions::default()
        }
    }

    fn flags_file(body: &str) -> String {
        format!("import {{ KillSwitches }} from \"killswitch-lib\";\n\n{body}")
    }

    #[test]
    fn test_scan_selects_graduated_flag() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert_eq!(discovery.declarations.len(), 1);
        assert_eq!(discovery.declarations[0].name, "checkX");
        assert_eq!(discovery.identifiers, vec![FLAG_X.to_string()]);
    }

    #[test]
    fn test_scan_rejects_future_date() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2030-06-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_scan_rejects_threshold_boundary() {
        // Graduation date equal to the threshold is not strictly earlier.
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2024-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_scan_rejects_non_uuid_identifier() {
        let src = flags_file(
            "export function checkX() {\n  return KillSwitches.isActivated(\"my-flag\", \"2023-01-01\");\n}\n",
        );
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_scan_rejects_missing_date() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_comment_date_fallback() {
        let src = flags_file(&format!(
            "// Graduated 2022-11-30 after full rollout.\nexport function checkY() {{\n  return KillSwitches.isActivated(\"{FLAG_Y}\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert_eq!(discovery.declarations.len(), 1);
        assert_eq!(
            discovery.declarations[0].comment_date,
            NaiveDate::from_ymd_opt(2022, 11, 30)
        );
    }

    #[test]
    fn test_date_argument_beats_comment() {
        let src = flags_file(&format!(
            "// Mentioned 2019-01-01 here.\nexport function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-02-03\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert_eq!(
            discovery.declarations[0].graduation_date(),
            NaiveDate::from_ymd_opt(2023, 2, 3)
        );
    }

    #[test]
    fn test_targeted_mode_ignores_date_and_format() {
        // Future-dated flag: scan mode would reject it, targeted mode must not.
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_Y}\", \"2099-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let opts = DiscoverOptions {
            target_id: Some(FLAG_Y.to_string()),
            ..opts_with_threshold((2024, 1, 1))
        };
        let discovery = discover(&project, &opts);
        assert_eq!(discovery.declarations.len(), 1);
        assert_eq!(discovery.identifiers, vec![FLAG_Y.to_string()]);
    }

    #[test]
    fn test_targeted_mode_requires_exact_match() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let opts = DiscoverOptions {
            target_id: Some(FLAG_Y.to_string()),
            ..opts_with_threshold((2024, 1, 1))
        };
        assert!(discover(&project, &opts).declarations.is_empty());
    }

    #[test]
    fn test_prefilter_requires_killswitch_import() {
        // Same structure, but no kill-switch import — scan mode skips the file.
        let src = format!(
            "import {{ Flags }} from \"flag-lib\";\n\nexport function checkX() {{\n  return Flags.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        );
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_file_hint_bypasses_prefilter() {
        let src = format!(
            "import {{ Flags }} from \"flag-lib\";\n\nexport function checkX() {{\n  return Flags.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        );
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let opts = DiscoverOptions {
            file_hint: Some(PathBuf::from("src/flags.ts")),
            ..opts_with_threshold((2024, 1, 1))
        };
        assert_eq!(discover(&project, &opts).declarations.len(), 1);
    }

    #[test]
    fn test_missing_file_hint_yields_empty() {
        let project = Project::from_memory(&[("src/flags.ts", "")]).unwrap();
        let opts = DiscoverOptions {
            file_hint: Some(PathBuf::from("src/does_not_exist.ts")),
            ..opts_with_threshold((2024, 1, 1))
        };
        assert!(discover(&project, &opts).declarations.is_empty());
    }

    #[test]
    fn test_multi_statement_body_disqualifies() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  console.log(\"checking\");\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_non_string_identifier_disqualifies() {
        let src = flags_file(
            "const id = \"x\";\nexport function checkX() {\n  return KillSwitches.isActivated(id, \"2023-01-01\");\n}\n",
        );
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_wrong_member_name_disqualifies() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isEnabled(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert!(discovery.declarations.is_empty());
    }

    #[test]
    fn test_identifiers_index_aligned() {
        let src = flags_file(&format!(
            "export function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n\n// Graduated 2022-11-30.\nexport function checkY() {{\n  return KillSwitches.isActivated(\"{FLAG_Y}\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.ts", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert_eq!(discovery.declarations.len(), 2);
        for (decl, id) in discovery.declarations.iter().zip(&discovery.identifiers) {
            assert_eq!(&decl.flag_id, id);
        }
    }

    #[test]
    fn test_js_file_also_scanned() {
        let src = flags_file(&format!(
            "function checkX() {{\n  return KillSwitches.isActivated(\"{FLAG_X}\", \"2023-01-01\");\n}}\n"
        ));
        let project = Project::from_memory(&[("src/flags.js", &src)]).unwrap();

        let discovery = discover(&project, &opts_with_threshold((2024, 1, 1)));
        assert_eq!(discovery.declarations.len(), 1);
    }
}
