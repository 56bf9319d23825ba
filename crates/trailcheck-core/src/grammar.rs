//! Commit message grammar validation
//!
//! [`validate`] is a pure function from message text to [`Finding`]s. Every
//! rule runs independently over the whole message and all violations are
//! collected; nothing short-circuits.
//!
//! The expected shape:
//!
//! ```text
//! Editor: Make the block inserter keyboard accessible.
//!
//! Optional body paragraphs, wrapped as the author sees fit.
//!
//! Follow-up to [58001].
//! Props alice, bob.
//! Fixes #100.
//! ```

use crate::finding::{Finding, code};
use crate::message::{Line, Message, column};
use crate::trailer::{self, TrailerKind};

/// Summary lines longer than this get a warning
pub const SUMMARY_SOFT_LIMIT: usize = 70;

/// Longest text accepted as a `Component: ` prefix
const COMPONENT_MAX: usize = 40;

/// Validate a commit message, returning findings ordered by position.
pub fn validate(text: &str) -> Vec<Finding> {
    let message = Message::parse(text);
    let mut findings = Vec::new();

    check_summary(&message, &mut findings);
    check_blank_lines(&message, &mut findings);
    check_trailers(&message, &mut findings);
    check_backticks(&message, &mut findings);

    findings.sort_by_key(|f| (f.line, f.start));
    findings
}

fn check_summary(message: &Message<'_>, findings: &mut Vec<Finding>) {
    let summary = match message.summary() {
        Some(line) if !line.is_blank() => line,
        other => {
            let line = other.map(|l| l.index).unwrap_or(0);
            findings.push(Finding::error(
                code::SUMMARY_MISSING,
                line,
                0..0,
                "Commit message must start with a summary line",
            ));
            return;
        }
    };

    let text = summary.text;
    let width = summary.width();

    if width > SUMMARY_SOFT_LIMIT {
        findings.push(Finding::warning(
            code::SUMMARY_LENGTH,
            summary.index,
            SUMMARY_SOFT_LIMIT..width,
            format!("Summary line is {width} characters long; keep it under {SUMMARY_SOFT_LIMIT}"),
        ));
    }

    let (description, start) = match split_component(text) {
        Some((component, description_start)) => {
            if component.chars().next().is_some_and(char::is_lowercase) {
                findings.push(Finding::warning(
                    code::SUMMARY_CAPITAL,
                    summary.index,
                    0..component.chars().count(),
                    format!("Component `{component}` should start with a capital letter"),
                ));
            }
            (&text[description_start..], column(text, description_start))
        }
        None => {
            findings.push(Finding::error(
                code::SUMMARY_COMPONENT,
                summary.index,
                0..width,
                "Summary must start with a component prefix, e.g. `Editor: `",
            ));
            (text, 0)
        }
    };

    if description.chars().next().is_some_and(char::is_lowercase) {
        findings.push(Finding::warning(
            code::SUMMARY_CAPITAL,
            summary.index,
            start..start + 1,
            "Summary should start with a capital letter",
        ));
    }

    if !text.trim_end().ends_with('.') {
        let end = text.trim_end().chars().count();
        findings.push(Finding::warning(
            code::SUMMARY_PERIOD,
            summary.index,
            end.saturating_sub(1)..end,
            "Summary should end with a period",
        ));
    }
}

/// Split `Component: Description` into the component and the byte offset
/// of the description. Components may contain spaces and slashes
/// (`Build/Test Tools: `) but must start with a letter.
fn split_component(text: &str) -> Option<(&str, usize)> {
    let colon = text.find(": ")?;
    let component = &text[..colon];
    let valid = component.chars().next().is_some_and(char::is_alphabetic)
        && component.chars().count() <= COMPONENT_MAX
        && !component.contains(['#', '[', '`']);
    valid.then_some((component, colon + 2))
}

fn check_blank_lines(message: &Message<'_>, findings: &mut Vec<Finding>) {
    let lines = message.lines();

    if let Some(second) = lines.get(1)
        && !second.is_blank()
        && !lines[0].is_blank()
    {
        findings.push(Finding::error(
            code::BLANK_AFTER_SUMMARY,
            second.index,
            0..second.width(),
            "Leave a blank line between the summary and the body",
        ));
    }

    for (i, pair) in lines.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);

        // Flag each run of blank lines once, at its second line.
        if previous.is_blank() && current.is_blank() {
            let run_continues = i > 0 && lines[i - 1].is_blank();
            if !run_continues {
                findings.push(Finding::error(
                    code::BLANK_CONSECUTIVE,
                    current.index,
                    0..0,
                    "Use a single blank line between paragraphs",
                ));
            }
        }

        // The summary case is covered by the after-summary rule.
        if i > 0
            && !previous.is_blank()
            && TrailerKind::detect(previous.text).is_none()
            && TrailerKind::detect(current.text).is_some()
        {
            findings.push(Finding::warning(
                code::BLANK_BEFORE_TRAILER,
                current.index,
                0..current.width(),
                "Leave a blank line before the trailer section",
            ));
        }
    }
}

fn check_trailers(message: &Message<'_>, findings: &mut Vec<Finding>) {
    let mut latest: Option<TrailerKind> = None;
    let mut fixes_see_line: Option<usize> = None;

    let trailers = message
        .lines()
        .iter()
        .filter_map(|line| TrailerKind::detect(line.text).map(|kind| (line, kind)));

    for (line, kind) in trailers {
        trailer::check(line, kind, findings);
        check_order(line, kind, &mut latest, findings);

        if kind == TrailerKind::FixesSee {
            match fixes_see_line {
                Some(first) => findings.push(Finding::error(
                    code::TRAILER_COMBINE,
                    line.index,
                    0..line.width(),
                    format!(
                        "Fixes and See references must be combined onto one line (see line {})",
                        first + 1
                    ),
                )),
                None => fixes_see_line = Some(line.index),
            }
        }
    }
}

fn check_order(
    line: &Line<'_>,
    kind: TrailerKind,
    latest: &mut Option<TrailerKind>,
    findings: &mut Vec<Finding>,
) {
    match *latest {
        Some(previous) if kind.order() < previous.order() => {
            findings.push(Finding::error(
                code::TRAILER_ORDER,
                line.index,
                0..line.width(),
                format!("`{}` must come before `{}`", kind.name(), previous.name()),
            ));
        }
        _ => *latest = Some(kind),
    }
}

fn check_backticks(message: &Message<'_>, findings: &mut Vec<Finding>) {
    for line in message.lines() {
        let ticks: Vec<usize> = line
            .text
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == '`')
            .map(|(col, _)| col)
            .collect();

        if let Some(&last) = ticks.last()
            && ticks.len() % 2 == 1
        {
            findings.push(Finding::warning(
                code::BACKTICK_UNBALANCED,
                line.index,
                last..last + 1,
                "Unbalanced backtick: inline code is not closed",
            ));
        }
    }
}
