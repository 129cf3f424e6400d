//! Classifier for the free-text "Public Comment" field of the TOI catalog.
//!
//! Each flag is a case-insensitive, word-bounded pattern matched against the
//! first line of the comment only; later lines are ignored. The classifier is
//! a pure function of the text and knows nothing about cross-matching.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref EB_REGEX: Regex = Regex::new(r"(?i)\beb\b").unwrap();
    static ref VSHAPED_REGEX: Regex = Regex::new(r"(?i)\bv[\s-]shaped\b").unwrap();
    static ref VARIABLE_REGEX: Regex = Regex::new(r"(?i)\b(variable|variability)\b").unwrap();
    static ref ODDEVEN_REGEX: Regex = Regex::new(r"(?i)\bodd[\s/-]even\b").unwrap();
    static ref SHOULDERS_REGEX: Regex = Regex::new(r"(?i)\bshoulders?\b.*\bingress\b").unwrap();
}

/// Patterns recognised in a TOI comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommentFlags {
    /// Eclipsing binary.
    pub eb: bool,
    pub variable: bool,
    /// Odd/even transit depth difference.
    pub odd_even: bool,
    pub v_shaped: bool,
    /// Shoulders at ingress.
    pub shoulders: bool,
}

impl CommentFlags {
    /// Flag-wise OR.
    pub fn union(self, other: CommentFlags) -> CommentFlags {
        CommentFlags {
            eb: self.eb || other.eb,
            variable: self.variable || other.variable,
            odd_even: self.odd_even || other.odd_even,
            v_shaped: self.v_shaped || other.v_shaped,
            shoulders: self.shoulders || other.shoulders,
        }
    }
}

pub fn classify_comment(text: &str) -> CommentFlags {
    let text = text.lines().next().unwrap_or("");
    CommentFlags {
        eb: EB_REGEX.is_match(text),
        variable: VARIABLE_REGEX.is_match(text),
        odd_even: ODDEVEN_REGEX.is_match(text),
        v_shaped: VSHAPED_REGEX.is_match(text),
        shoulders: SHOULDERS_REGEX.is_match(text),
    }
}

/// A missing or empty comment. Whitespace is a (meaningless) comment, not a
/// blank one.
pub fn is_blank(text: Option<&str>) -> bool {
    text.map_or(true, str::is_empty)
}
