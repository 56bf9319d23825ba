//! Reference extraction
//!
//! Finds every place a commit message points at an external entity:
//!
//! - `#123` - a ticket
//! - `[123]` - a changeset
//! - usernames listed after `Props` or `Reviewed by`
//!
//! Like the grammar validator this is pure and network-free. Each textual
//! match is its own occurrence, so a ticket mentioned twice on one line gets
//! two occurrences with their own spans.

use crate::entity::{EntityKey, EntityKind};
use crate::message::Message;
use crate::trailer::username_tokens;
use facet::Facet;

/// A reference to an entity at a position in the message
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Occurrence {
    /// Line number (0-indexed)
    pub line: usize,
    /// Character columns of the reference text, half-open
    pub start: usize,
    pub end: usize,
    pub kind: EntityKind,
    /// The bare identifier (`123`, `alice`), without `#` / `[]`
    pub identifier: String,
}

impl Occurrence {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.identifier.clone())
    }

    /// Whether a character column falls inside this occurrence
    pub fn contains(&self, line: usize, column: usize) -> bool {
        self.line == line && self.start <= column && column < self.end
    }
}

/// Extract all entity references from a commit message, ordered by position.
pub fn extract(text: &str) -> Vec<Occurrence> {
    let message = Message::parse(text);
    let mut occurrences = Vec::new();

    for line in message.lines() {
        scan_numbered(line.index, line.text, &mut occurrences);

        // Malformed usernames are reported by the validator and never looked up.
        for token in username_tokens(line.text) {
            if token.is_valid() {
                occurrences.push(Occurrence {
                    line: line.index,
                    start: token.start,
                    end: token.end,
                    kind: EntityKind::Profile,
                    identifier: token.text.to_string(),
                });
            }
        }
    }

    occurrences.sort_by_key(|o| (o.line, o.start));
    occurrences
}

/// Scan one line for `#123` tickets and `[123]` changesets.
fn scan_numbered(line: usize, text: &str, occurrences: &mut Vec<Occurrence>) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let opener = chars[i];
        if opener != '#' && opener != '[' {
            i += 1;
            continue;
        }

        // `&#39;` is an entity and `r[5]` an index, not references.
        let glued = i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '&');
        let digits_start = i + 1;
        let digits_end = chars[digits_start..]
            .iter()
            .position(|c| !c.is_ascii_digit())
            .map_or(chars.len(), |n| digits_start + n);

        if glued || digits_end == digits_start {
            i += 1;
            continue;
        }

        let next = chars.get(digits_end).copied();
        let matched = match opener {
            '#' if !next.is_some_and(|c| c.is_alphanumeric() || c == '_') => {
                Some((EntityKind::Ticket, digits_end))
            }
            '[' if next == Some(']') => Some((EntityKind::Changeset, digits_end + 1)),
            _ => None,
        };

        match matched {
            Some((kind, end)) => {
                occurrences.push(Occurrence {
                    line,
                    start: i,
                    end,
                    kind,
                    identifier: chars[digits_start..digits_end].iter().collect(),
                });
                i = end;
            }
            None => i = digits_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(occurrences: &[Occurrence]) -> Vec<(usize, usize, usize, EntityKind, &str)> {
        occurrences
            .iter()
            .map(|o| (o.line, o.start, o.end, o.kind, o.identifier.as_str()))
            .collect()
    }

    #[test]
    fn tickets_and_changesets() {
        let found = extract("Editor: Fix it.\n\nFollow-up to [58001].\nFixes #100, #101.");
        assert_eq!(
            summary(&found),
            vec![
                (2, 13, 20, EntityKind::Changeset, "58001"),
                (3, 6, 10, EntityKind::Ticket, "100"),
                (3, 12, 16, EntityKind::Ticket, "101"),
            ]
        );
    }

    #[test]
    fn non_digit_identifiers_are_ignored() {
        assert!(extract("See #abc, #12abc, [x1], [12, [].").is_empty());
        assert!(extract("Quote &#39; and arr[5] stay put.").is_empty());
    }

    #[test]
    fn repeated_identifiers_get_their_own_spans() {
        let found = extract("See #5 and #5 again.");
        assert_eq!(
            summary(&found),
            vec![
                (0, 4, 6, EntityKind::Ticket, "5"),
                (0, 11, 13, EntityKind::Ticket, "5"),
            ]
        );
    }

    #[test]
    fn usernames_from_people_trailers() {
        let found = extract("A: B.\n\nReviewed by sam.\nProps alice, al:ice, bob.");
        assert_eq!(
            summary(&found),
            vec![
                (2, 12, 15, EntityKind::Profile, "sam"),
                (3, 6, 11, EntityKind::Profile, "alice"),
                (3, 21, 24, EntityKind::Profile, "bob"),
            ]
        );
    }

    #[test]
    fn props_in_prose_are_not_usernames() {
        assert!(extract("A: B.\n\nThe props object is passed down.").is_empty());
    }

    #[test]
    fn comment_lines_are_skipped() {
        assert!(extract("A: B.\n# See #5 for the template.").is_empty());
    }

    #[test]
    fn one_occurrence_per_textual_match() {
        for n in ["0", "7", "123456789"] {
            let text = format!("See #{n}, [{n}] and #{n}.");
            let found = extract(&text);
            assert_eq!(found.len(), 3, "{text}");
            assert!(found.iter().all(|o| o.identifier == n));
        }
    }

    #[test]
    fn contains_uses_half_open_columns() {
        let found = extract("See #42.");
        assert!(found[0].contains(0, 4));
        assert!(found[0].contains(0, 6));
        assert!(!found[0].contains(0, 7));
        assert!(!found[0].contains(1, 5));
    }
}
