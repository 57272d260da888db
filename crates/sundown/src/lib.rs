//! # Sundown: Kill-Switch Retirement
//!
//! **Role**: Locates helper functions that wrap a runtime kill-switch check in a
//! JavaScript/TypeScript project, decides whether the flag has graduated, and
//! neutralizes every call site by substituting a constant boolean.
//!
//! **Core Modules**:
//! - [`project`]: Tree-sitter backed source tree provider with in-place edits.
//! - [`imports`]: ES module import/export binding (aliases, re-export chains).
//! - [`heuristics`]: Flag-id format validation and graduation date resolution.
//! - [`discover`]: Declaration locator — eligibility rules per mode.
//! - [`retire`]: Reference replacement engine — `!wrapper()` → `true`,
//!   bare `wrapper()` → `false`.
//!
//! **Design**:
//! - All analysis state is transient and recomputed per call; the [`project::Project`]
//!   owns file text and tree lifetime.
//! - Mutation is in-memory only. Persisting changed source is the caller's job.
//! - No analysis path raises a fatal error: malformed candidates degrade to
//!   "not eligible" so one bad file cannot abort a batch.

pub mod discover;
pub mod heuristics;
pub mod imports;
pub mod path_util;
pub mod project;
pub mod retire;

pub use discover::{discover, Discovery};
pub use project::Project;
pub use retire::{retire, RetireOutcome};

use std::path::PathBuf;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;

/// Member name of the runtime activation check wrapped by every helper.
pub const ACTIVATION_CHECK: &str = "isActivated";

/// Case-insensitive substring that marks a kill-switch import in scan mode.
pub const KILL_SWITCH_HINT: &str = "killswitch";

/// Days a flag must have been graduated before auto-scan retires it.
pub const DEFAULT_GRACE_DAYS: u64 = 180;

/// A helper function presumed to wrap one flag's activation check.
///
/// The declaring function's body is a single meaningful return of a call whose
/// callee member is [`ACTIVATION_CHECK`]; anything else never becomes a
/// `Declaration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    /// Helper function name (e.g. `"checkX"`).
    pub name: String,

    /// Normalized key of the file declaring the helper.
    pub file: String,

    /// Byte offset of the first character of the function declaration.
    pub start_byte: u32,

    /// Byte offset past the last character of the function declaration.
    pub end_byte: u32,

    /// Line number of the declaration (1-indexed).
    pub start_line: u32,

    /// Flag key extracted from the call's first string argument, quotes stripped.
    pub flag_id: String,

    /// Graduation date parsed from the call's second argument, if any.
    pub date_arg: Option<NaiveDate>,

    /// First date found in comments attached to the declaration, if any.
    pub comment_date: Option<NaiveDate>,
}

impl Declaration {
    /// Resolved graduation date: the explicit date argument wins over
    /// comment scanning.
    pub fn graduation_date(&self) -> Option<NaiveDate> {
        self.date_arg.or(self.comment_date)
    }
}

/// Options for a discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Targeted mode: select only the declaration whose flag id equals this
    /// string exactly. No date or format check.
    pub target_id: Option<String>,

    /// Restrict the pass to exactly this file. An unresolvable hint is logged
    /// and treated as zero matched files.
    pub file_hint: Option<PathBuf>,

    /// Scan-mode cutoff: a flag is eligible iff its graduation date is
    /// strictly earlier than this.
    pub threshold: NaiveDate,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            target_id: None,
            file_hint: None,
            threshold: Utc::now()
                .date_naive()
                .checked_sub_days(Days::new(DEFAULT_GRACE_DAYS))
                .unwrap_or_else(|| Utc::now().date_naive()),
        }
    }
}

/// A node whose text was rewritten during replacement, in pre-edit coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModifiedNode {
    /// Normalized key of the containing file.
    pub file: String,

    /// Tree-sitter node kind (e.g. `"parenthesized_expression"`).
    pub kind: String,

    /// Byte offset of the node before edits were applied.
    pub start_byte: u32,

    /// Byte offset past the node before edits were applied.
    pub end_byte: u32,
}

/// Errors produced while loading or editing project sources.
#[derive(Debug, thiserror::Error)]
pub enum SundownError {
    /// Tree-sitter parsing failed.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// I/O error (directory walk, file read).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Byte range exceeds u32::MAX (file too large for tree-sitter spans).
    #[error("Byte range overflow: file size exceeds 4GB limit")]
    ByteRangeOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_decl(date_arg: Option<NaiveDate>, comment_date: Option<NaiveDate>) -> Declaration {
        Declaration {
            name: "checkX".into(),
            file: "src/flags.ts".into(),
            start_byte: 0,
            end_byte: 100,
            start_line: 1,
            flag_id: "3fa85f64-5717-4562-b3fc-2c963f66afa6".into(),
            date_arg,
            comment_date,
        }
    }

    #[test]
    fn test_graduation_date_prefers_argument() {
        let arg = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let comment = NaiveDate::from_ymd_opt(2022, 6, 15).unwrap();
        let decl = make_decl(Some(arg), Some(comment));
        assert_eq!(decl.graduation_date(), Some(arg));
    }

    #[test]
    fn test_graduation_date_falls_back_to_comment() {
        let comment = NaiveDate::from_ymd_opt(2022, 6, 15).unwrap();
        let decl = make_decl(None, Some(comment));
        assert_eq!(decl.graduation_date(), Some(comment));
    }

    #[test]
    fn test_graduation_date_absent() {
        let decl = make_decl(None, None);
        assert_eq!(decl.graduation_date(), None);
    }

    #[test]
    fn test_default_threshold_is_in_the_past() {
        let opts = DiscoverOptions::default();
        assert!(opts.threshold < Utc::now().date_naive());
        assert!(opts.target_id.is_none());
        assert!(opts.file_hint.is_none());
    }
}
