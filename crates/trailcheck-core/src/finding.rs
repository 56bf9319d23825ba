//! Structural findings produced by the grammar validator

use facet::Facet;
use std::ops::Range;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[repr(u8)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    /// Get the string representation of this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable finding codes, one per rule.
///
/// Codes follow a `<area>.<rule>` pattern so editors and tests can match on
/// them without parsing messages.
pub mod code {
    /// First line is empty or absent
    pub const SUMMARY_MISSING: &str = "summary.missing";
    /// First line has no `Component: ` prefix
    pub const SUMMARY_COMPONENT: &str = "summary.component";
    /// Component or summary text starts lowercase
    pub const SUMMARY_CAPITAL: &str = "summary.capital";
    /// First line does not end with a period
    pub const SUMMARY_PERIOD: &str = "summary.period";
    /// First line is longer than the soft limit
    pub const SUMMARY_LENGTH: &str = "summary.length";
    /// Body starts right after the summary
    pub const BLANK_AFTER_SUMMARY: &str = "blank.after-summary";
    /// Two or more blank lines in a row
    pub const BLANK_CONSECUTIVE: &str = "blank.consecutive";
    /// Trailer section glued to the preceding paragraph
    pub const BLANK_BEFORE_TRAILER: &str = "blank.before-trailer";
    /// Trailer appears after one that should follow it
    pub const TRAILER_ORDER: &str = "trailer.order";
    /// Fixes/See references spread over several lines
    pub const TRAILER_COMBINE: &str = "trailer.combine";
    /// Trailer keyword has the wrong capitalization
    pub const TRAILER_KEYWORD_CASE: &str = "trailer.keyword-case";
    /// Trailer body does not match its pattern
    pub const TRAILER_FORMAT: &str = "trailer.format";
    /// Trailer line does not end with a period
    pub const TRAILER_PERIOD: &str = "trailer.period";
    /// Username token contains characters outside `[A-Za-z0-9_-]`
    pub const PROPS_USERNAME: &str = "props.username";
    /// Odd number of backticks on a line
    pub const BACKTICK_UNBALANCED: &str = "backtick.unbalanced";
}

/// A single grammar violation
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Finding {
    /// Line number (0-indexed)
    pub line: usize,
    /// First column of the offending text (0-indexed, in characters)
    pub start: usize,
    /// Column just past the offending text
    pub end: usize,
    pub severity: Severity,
    /// Stable rule code, see [`code`]
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        code: &str,
        line: usize,
        columns: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            start: columns.start,
            end: columns.end.max(columns.start),
            severity,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn error(
        code: &str,
        line: usize,
        columns: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, code, line, columns, message)
    }

    pub fn warning(
        code: &str,
        line: usize,
        columns: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, code, line, columns, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
