//! Splitting raw commit message text into lines

/// One line of a commit message, with its position in the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Line number in the original text (0-indexed)
    pub index: usize,
    /// Line content without the line terminator
    pub text: &'a str,
}

impl Line<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Number of characters on the line
    pub fn width(&self) -> usize {
        self.text.chars().count()
    }
}

/// The content lines of a commit message.
///
/// Git comment lines are dropped and trailing blank lines are trimmed, so
/// what remains is exactly what would end up in the commit. Every kept line
/// remembers its original index, which is what findings and occurrences
/// report.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    lines: Vec<Line<'a>>,
}

impl<'a> Message<'a> {
    pub fn parse(text: &'a str) -> Self {
        let mut lines: Vec<Line<'a>> = text
            .split('\n')
            .enumerate()
            .map(|(index, raw)| Line {
                index,
                text: raw.strip_suffix('\r').unwrap_or(raw),
            })
            .filter(|line| !is_comment(line.text))
            .collect();

        while lines.last().is_some_and(|line| line.is_blank()) {
            lines.pop();
        }

        Self { lines }
    }

    pub fn lines(&self) -> &[Line<'a>] {
        &self.lines
    }

    /// The first content line, if there is one
    pub fn summary(&self) -> Option<&Line<'a>> {
        self.lines.first()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Git strips lines starting with `#` followed by a space (or a bare `#`).
pub fn is_comment(text: &str) -> bool {
    text == "#" || text.starts_with("# ")
}

/// Character column of a byte offset within a line.
pub(crate) fn column(text: &str, byte: usize) -> usize {
    text.get(..byte)
        .map(|prefix| prefix.chars().count())
        .unwrap_or_else(|| text.chars().count())
}
