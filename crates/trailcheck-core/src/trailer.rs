//! Trailer lines: recognition, canonical order, and per-kind format checks
//!
//! Trailers close a commit message and reference other work:
//!
//! ```text
//! Follow-up to [58001].
//! Reviewed by jane.
//! Merges [58002] to the 6.4 branch.
//! Props alice, bob.
//! Fixes #100. See #200.
//! ```
//!
//! Recognition is case-insensitive so that a miscapitalized keyword is still
//! treated as a trailer (and then reported); the keyword spelling itself is
//! checked separately. The same goes for a git-style colon after the
//! keyword (`Reviewed-by: jane.`).

use crate::entity::is_valid_username;
use crate::finding::{Finding, code};
use crate::message::{Line, column};
use facet::Facet;

/// The recognized trailer types, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[repr(u8)]
pub enum TrailerKind {
    FollowUp,
    ReviewedBy,
    Merges,
    Props,
    /// `Fixes` and `See` share one class and one line
    FixesSee,
}

struct Keyword {
    /// Lowercase spelling used for detection
    lower: &'static str,
    /// The only accepted spelling
    canonical: &'static str,
    kind: TrailerKind,
    /// When set, the text after the keyword must start with this character
    /// (or a digit) for the line to count as a trailer. Keeps prose such as
    /// "Fixes a crash when..." out of the trailer section.
    opener: Option<char>,
}

const KEYWORDS: &[Keyword] = &[
    Keyword {
        lower: "follow-up to",
        canonical: "Follow-up to",
        kind: TrailerKind::FollowUp,
        opener: Some('['),
    },
    Keyword {
        lower: "reviewed by",
        canonical: "Reviewed by",
        kind: TrailerKind::ReviewedBy,
        opener: None,
    },
    Keyword {
        lower: "reviewed-by",
        canonical: "Reviewed by",
        kind: TrailerKind::ReviewedBy,
        opener: None,
    },
    Keyword {
        lower: "merges",
        canonical: "Merges",
        kind: TrailerKind::Merges,
        opener: Some('['),
    },
    Keyword {
        lower: "props",
        canonical: "Props",
        kind: TrailerKind::Props,
        opener: None,
    },
    Keyword {
        lower: "fixes",
        canonical: "Fixes",
        kind: TrailerKind::FixesSee,
        opener: Some('#'),
    },
    Keyword {
        lower: "see",
        canonical: "See",
        kind: TrailerKind::FixesSee,
        opener: Some('#'),
    },
];

/// Find the trailer keyword a piece of text starts with.
fn match_keyword(text: &str) -> Option<&'static Keyword> {
    KEYWORDS.iter().find(|keyword| {
        let Some(head) = text.get(..keyword.lower.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(keyword.lower) {
            return false;
        }

        let rest = &text[keyword.lower.len()..];
        let at_boundary = match rest.chars().next() {
            None => true,
            Some(c) => matches!(c, ' ' | '.' | ',' | ':'),
        };
        if !at_boundary {
            return false;
        }

        let rest = rest.strip_prefix(':').unwrap_or(rest);
        match keyword.opener {
            None => true,
            Some(opener) => rest
                .trim_start()
                .chars()
                .next()
                .is_some_and(|c| c == opener || c.is_ascii_digit()),
        }
    })
}

/// Byte offset where the keyword's body starts, past a stray colon.
fn body_start(text: &str, keyword: &Keyword) -> usize {
    let end = keyword.lower.len();
    if text[end..].starts_with(':') {
        end + 1
    } else {
        end
    }
}

impl TrailerKind {
    /// Recognize the trailer a line starts with, if any
    pub fn detect(text: &str) -> Option<Self> {
        match_keyword(text).map(|keyword| keyword.kind)
    }

    /// Position in the canonical order (1-based; 0 is reserved for
    /// "not a trailer")
    pub fn order(&self) -> u8 {
        match self {
            TrailerKind::FollowUp => 1,
            TrailerKind::ReviewedBy => 2,
            TrailerKind::Merges => 3,
            TrailerKind::Props => 4,
            TrailerKind::FixesSee => 5,
        }
    }

    /// Display name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            TrailerKind::FollowUp => "Follow-up to",
            TrailerKind::ReviewedBy => "Reviewed by",
            TrailerKind::Merges => "Merges",
            TrailerKind::Props => "Props",
            TrailerKind::FixesSee => "Fixes/See",
        }
    }

    /// Whether this trailer lists usernames
    pub fn names_people(&self) -> bool {
        matches!(self, TrailerKind::Props | TrailerKind::ReviewedBy)
    }
}

/// One comma-separated entry of a Props / Reviewed by line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsernameToken<'a> {
    pub text: &'a str,
    /// Character columns of the token within its line
    pub start: usize,
    pub end: usize,
}

impl UsernameToken<'_> {
    pub fn is_valid(&self) -> bool {
        is_valid_username(self.text)
    }
}

/// Split the username list of a Props / Reviewed by line into tokens.
///
/// Returns nothing for any other line. Empty entries (`a,,b`) are skipped.
pub fn username_tokens(text: &str) -> Vec<UsernameToken<'_>> {
    let Some(keyword) = match_keyword(text) else {
        return Vec::new();
    };
    if !keyword.kind.names_people() {
        return Vec::new();
    }

    let body_start = body_start(text, keyword);
    let body = strip_final_period(&text[body_start..]);

    let mut tokens = Vec::new();
    let mut offset = body_start;
    for piece in body.split(',') {
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            let leading = piece.len() - piece.trim_start().len();
            let start = offset + leading;
            let end = start + trimmed.len();
            tokens.push(UsernameToken {
                text: trimmed,
                start: column(text, start),
                end: column(text, end),
            });
        }
        offset += piece.len() + 1;
    }
    tokens
}

/// Drop trailing whitespace and one trailing period.
fn strip_final_period(text: &str) -> &str {
    let text = text.trim_end();
    text.strip_suffix('.').unwrap_or(text)
}

/// Check one trailer line: keyword spelling, body pattern, final period.
pub(crate) fn check(line: &Line<'_>, kind: TrailerKind, findings: &mut Vec<Finding>) {
    let text = line.text;

    match kind {
        TrailerKind::FixesSee => check_fixes_see(line, findings),
        _ => {
            if let Some(keyword) = match_keyword(text) {
                check_keyword(line, 0, keyword, findings);
                check_body(line, keyword, findings);
            }
        }
    }

    let trimmed = text.trim_end();
    if !trimmed.ends_with('.') {
        let end = trimmed.chars().count();
        findings.push(Finding::error(
            code::TRAILER_PERIOD,
            line.index,
            end.saturating_sub(1)..end,
            format!("`{}` line must end with a period", kind.name()),
        ));
    }
}

/// Keyword spelling, and no colon after it.
fn check_keyword(
    line: &Line<'_>,
    byte_offset: usize,
    keyword: &Keyword,
    findings: &mut Vec<Finding>,
) {
    let end = byte_offset + keyword.lower.len();
    let written = &line.text[byte_offset..end];
    if written != keyword.canonical {
        findings.push(Finding::error(
            code::TRAILER_KEYWORD_CASE,
            line.index,
            column(line.text, byte_offset)..column(line.text, end),
            format!("`{written}` must be written as `{}`", keyword.canonical),
        ));
    }

    if line.text[end..].starts_with(':') {
        let colon = column(line.text, end);
        findings.push(Finding::error(
            code::TRAILER_FORMAT,
            line.index,
            colon..colon + 1,
            format!("`{}` is not followed by a colon", keyword.canonical),
        ));
    }
}

fn check_body(line: &Line<'_>, keyword: &Keyword, findings: &mut Vec<Finding>) {
    let body = strip_final_period(&line.text[body_start(line.text, keyword)..]);
    let whole_line = 0..line.width();

    match keyword.kind {
        TrailerKind::FollowUp => {
            if !is_reference_list(body, '[') {
                findings.push(Finding::error(
                    code::TRAILER_FORMAT,
                    line.index,
                    whole_line,
                    "Follow-up must reference changesets, e.g. `Follow-up to [12345].`",
                ));
            }
        }
        TrailerKind::Merges => {
            if !is_merge_body(body) {
                findings.push(Finding::error(
                    code::TRAILER_FORMAT,
                    line.index,
                    whole_line,
                    "Merges must read `Merges [N] to the X.Y branch.`",
                ));
            }
        }
        TrailerKind::Props | TrailerKind::ReviewedBy => {
            let tokens = username_tokens(line.text);
            if tokens.is_empty() {
                findings.push(Finding::error(
                    code::TRAILER_FORMAT,
                    line.index,
                    whole_line,
                    format!("`{}` must list at least one username", keyword.canonical),
                ));
            }
            for token in tokens.iter().filter(|t| !t.is_valid()) {
                findings.push(Finding::warning(
                    code::PROPS_USERNAME,
                    line.index,
                    token.start..token.end,
                    format!("Invalid username format: '{}'", token.text),
                ));
            }
        }
        TrailerKind::FixesSee => {}
    }
}

/// `Fixes #1, #2. See #3.` is a sequence of clauses, each with its own
/// keyword and ticket list.
fn check_fixes_see(line: &Line<'_>, findings: &mut Vec<Finding>) {
    let body = strip_final_period(line.text);
    let mut malformed = false;
    let mut offset = 0;

    for clause in body.split('.') {
        let leading = clause.len() - clause.trim_start().len();
        let clause_start = offset + leading;
        let trimmed = clause.trim();
        offset += clause.len() + 1;

        match match_keyword(trimmed) {
            Some(keyword) if keyword.kind == TrailerKind::FixesSee => {
                check_keyword(line, clause_start, keyword, findings);
                if !is_reference_list(&trimmed[body_start(trimmed, keyword)..], '#') {
                    malformed = true;
                }
            }
            _ => malformed = true,
        }
    }

    if malformed {
        findings.push(Finding::error(
            code::TRAILER_FORMAT,
            line.index,
            0..line.width(),
            "Fixes/See must reference tickets, e.g. `Fixes #123. See #456.`",
        ));
    }
}

/// A non-empty comma-separated list of `#N` (opener `#`) or `[N]`
/// (opener `[`) references.
fn is_reference_list(text: &str, opener: char) -> bool {
    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    !items.is_empty()
        && items.iter().all(|item| match opener {
            '#' => item.strip_prefix('#').is_some_and(is_number),
            _ => item
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .is_some_and(is_number),
        })
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// ` [N] to the X.Y branch`
fn is_merge_body(body: &str) -> bool {
    let Some(rest) = body.strip_prefix(' ') else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('[') else {
        return false;
    };
    let Some((number, rest)) = rest.split_once(']') else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(" to the ") else {
        return false;
    };
    let Some(version) = rest.strip_suffix(" branch") else {
        return false;
    };
    let Some((major, minor)) = version.split_once('.') else {
        return false;
    };
    is_number(number) && is_number(major) && is_number(minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_line(text: &str) -> Vec<Finding> {
        let line = Line { index: 4, text };
        let kind = TrailerKind::detect(text).expect("must be a trailer");
        let mut findings = Vec::new();
        check(&line, kind, &mut findings);
        findings
    }

    #[test]
    fn detects_each_kind() {
        assert_eq!(TrailerKind::detect("Follow-up to [5]."), Some(TrailerKind::FollowUp));
        assert_eq!(TrailerKind::detect("Reviewed by jane."), Some(TrailerKind::ReviewedBy));
        assert_eq!(TrailerKind::detect("Reviewed-by: jane."), Some(TrailerKind::ReviewedBy));
        assert_eq!(TrailerKind::detect("reviewed-by jane."), Some(TrailerKind::ReviewedBy));
        assert_eq!(TrailerKind::detect("Merges [5] to the 6.4 branch."), Some(TrailerKind::Merges));
        assert_eq!(TrailerKind::detect("Props alice."), Some(TrailerKind::Props));
        assert_eq!(TrailerKind::detect("FIXES #1."), Some(TrailerKind::FixesSee));
        assert_eq!(TrailerKind::detect("See #1."), Some(TrailerKind::FixesSee));
    }

    #[test]
    fn prose_is_not_a_trailer() {
        assert_eq!(TrailerKind::detect("See the docs for details."), None);
        assert_eq!(TrailerKind::detect("Fixes a crash when saving."), None);
        assert_eq!(TrailerKind::detect("Merges the two helpers."), None);
        assert_eq!(TrailerKind::detect("Propshaft is unrelated."), None);
        assert_eq!(TrailerKind::detect("Follow-up to the earlier commit."), None);
    }

    #[test]
    fn canonical_order() {
        let kinds = [
            TrailerKind::FollowUp,
            TrailerKind::ReviewedBy,
            TrailerKind::Merges,
            TrailerKind::Props,
            TrailerKind::FixesSee,
        ];
        assert!(kinds.windows(2).all(|w| w[0].order() < w[1].order()));
    }

    #[test]
    fn well_formed_trailers_pass() {
        for text in [
            "Follow-up to [58001], [58002].",
            "Reviewed by jane, bob.",
            "Merges [58002] to the 6.4 branch.",
            "Props alice, bob_2, carol-x.",
            "Fixes #100, #101. See #200.",
            "See #7.",
        ] {
            assert!(check_line(text).is_empty(), "{text} should pass");
        }
    }

    #[test]
    fn miscapitalized_keyword_is_an_error() {
        let findings = check_line("props alice.");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, code::TRAILER_KEYWORD_CASE);
        assert_eq!((findings[0].start, findings[0].end), (0, 5));
    }

    #[test]
    fn keyword_case_is_checked_per_clause() {
        let findings = check_line("Fixes #1. see #2.");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, code::TRAILER_KEYWORD_CASE);
        assert_eq!((findings[0].start, findings[0].end), (10, 13));
    }

    #[test]
    fn git_style_colon_is_recognized_and_reported() {
        let findings = check_line("Reviewed-by: jane.");
        let codes: Vec<&str> = findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec![code::TRAILER_KEYWORD_CASE, code::TRAILER_FORMAT]);
        assert_eq!(findings[0].message, "`Reviewed-by` must be written as `Reviewed by`");
        assert_eq!((findings[1].start, findings[1].end), (11, 12));

        let tokens = username_tokens("Reviewed-by: jane.");
        assert_eq!(tokens.len(), 1);
        assert_eq!((tokens[0].text, tokens[0].start, tokens[0].end), ("jane", 13, 17));
    }

    #[test]
    fn colon_after_fixes_keeps_the_tickets() {
        assert_eq!(TrailerKind::detect("Fixes: #1."), Some(TrailerKind::FixesSee));
        let findings = check_line("Fixes: #1.");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, code::TRAILER_FORMAT);
        assert_eq!((findings[0].start, findings[0].end), (5, 6));

        assert_eq!(TrailerKind::detect("See: the docs."), None);
    }

    #[test]
    fn missing_period_is_an_error() {
        let findings = check_line("Props alice");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, code::TRAILER_PERIOD);
        assert_eq!(findings[0].line, 4);
    }

    #[test]
    fn malformed_bodies() {
        for text in [
            "Follow-up to [abc].",
            "Merges [5] to trunk.",
            "Merges [5] to the 6 branch.",
            "Fixes 100.",
            "Fixes #100, bug.",
        ] {
            let findings = check_line(text);
            assert!(
                findings.iter().any(|f| f.code == code::TRAILER_FORMAT),
                "{text} should be malformed: {findings:?}"
            );
        }
    }

    #[test]
    fn empty_props_is_malformed() {
        let findings = check_line("Props.");
        assert_eq!(findings[0].code, code::TRAILER_FORMAT);
        assert!(findings[0].message.contains("at least one username"));
    }

    #[test]
    fn invalid_usernames_are_warnings_with_spans() {
        let findings = check_line("Props bob, al:ice.");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, code::PROPS_USERNAME);
        assert_eq!(findings[0].message, "Invalid username format: 'al:ice'");
        assert_eq!((findings[0].start, findings[0].end), (11, 17));
    }

    #[test]
    fn username_tokens_trim_and_skip_empty() {
        let tokens = username_tokens("Props  alice ,, bob.");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["alice", "bob"]);
        assert_eq!((tokens[0].start, tokens[0].end), (7, 12));
        assert_eq!((tokens[1].start, tokens[1].end), (16, 19));
    }

    #[test]
    fn username_tokens_only_for_people_trailers() {
        assert!(username_tokens("Fixes #1.").is_empty());
        assert!(username_tokens("Just a sentence.").is_empty());
        assert_eq!(username_tokens("Reviewed by sam.").len(), 1);
    }
}
