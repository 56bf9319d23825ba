//! Best-effort text extraction from lookup responses
//!
//! Each source format gets one narrow function. None of them can fail
//! loudly: malformed or unexpected input yields `None`, which the resolver
//! treats as "exists, but no detail".

/// Longest changeset message excerpt before truncation
pub const MESSAGE_EXCERPT_MAX: usize = 80;

/// Decode the HTML entities that show up in tracker and profile pages.
///
/// Named entities `&gt; &lt; &amp; &quot; &apos;` plus decimal and hex
/// character references. Decoding is a single pass, so `&amp;lt;` becomes
/// `&lt;` and not `<`. Unknown entities are left untouched.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "gt" => Some('>'),
        "lt" => Some('<'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let value = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Parse CSV into records of fields. Quoted fields may contain commas,
/// newlines and doubled quotes. Blank lines produce no record.
fn parse_csv(body: &str) -> Vec<Vec<String>> {
    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => quoted = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    record.push(field);
    if record.iter().any(|f| !f.is_empty()) {
        records.push(record);
    }
    records
}

/// A ticket CSV export exists when it has a data row after the header.
pub fn ticket_exists(body: &str) -> bool {
    parse_csv(body).len() >= 2
}

/// The ticket title: second field of the first data row.
pub fn ticket_summary(body: &str) -> Option<String> {
    let records = parse_csv(body);
    let summary = decode_entities(records.get(1)?.get(1)?);
    let summary = summary.trim();
    (!summary.is_empty()).then(|| summary.to_string())
}

/// Changeset pages for unknown revisions still answer 200 with this text.
pub fn changeset_missing(body: &str) -> bool {
    body.contains("No such changeset")
}

/// First paragraph of the commit message on a changeset page.
///
/// Looks for the `dt`/`dd` pair labelled "message" first, then falls back
/// to the first paragraph of the `#overview` definition list. The excerpt
/// is whitespace-collapsed and either truncated with an ellipsis or given
/// exactly one trailing period.
pub fn changeset_message(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let section = message_dd(html, &lower).or_else(|| overview(html, &lower))?;

    let paragraph = first_paragraph(section);
    let text = collapse_whitespace(&decode_entities(&strip_tags(paragraph)));
    if text.is_empty() {
        return None;
    }

    if text.chars().count() > MESSAGE_EXCERPT_MAX {
        let cut: String = text.chars().take(MESSAGE_EXCERPT_MAX).collect();
        return Some(format!("{}…", cut.trim_end()));
    }

    let stem = text.trim_end_matches('.');
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}."))
}

/// `<dt ...>Message:</dt> <dd ...>...</dd>`
fn message_dd<'a>(html: &'a str, lower: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(dt) = lower[from..].find("<dt").map(|i| from + i) {
        let dt_end = lower[dt..].find("</dt>").map(|i| dt + i)?;
        from = dt_end;
        if !lower[dt..dt_end].contains("message") {
            continue;
        }
        return element_body(html, lower, dt_end, "dd");
    }
    None
}

/// The `<dl id="overview">` list, from its first `<p>` on.
fn overview<'a>(html: &'a str, lower: &str) -> Option<&'a str> {
    let start = lower.find("id=\"overview\"")?;
    let end = lower[start..]
        .find("</dl>")
        .map_or(html.len(), |i| start + i);
    let p = lower[start..end].find("<p").map(|i| start + i)?;
    Some(&html[p..end])
}

/// Contents of the first `<tag ...>...</tag>` at or after `from`.
fn element_body<'a>(html: &'a str, lower: &str, from: usize, tag: &str) -> Option<&'a str> {
    let open = lower[from..].find(&format!("<{tag}")).map(|i| from + i)?;
    let content = lower[open..].find('>').map(|i| open + i + 1)?;
    let close = lower[content..]
        .find(&format!("</{tag}>"))
        .map_or(html.len(), |i| content + i);
    Some(&html[content..close])
}

fn first_paragraph(section: &str) -> &str {
    let lower = section.to_ascii_lowercase();
    if let Some(body) = element_body(section, &lower, 0, "p") {
        return body;
    }
    let section = section.trim_start();
    match section.find("\n\n") {
        Some(end) => &section[..end],
        None => section,
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Display name from a profile page `<title>`: the text before the first
/// `(`, e.g. `Alice Smith (@alice) - WordPress user profile`.
pub fn profile_display_name(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let title = element_body(html, &lower, 0, "title")?;
    let name = title.split('(').next().unwrap_or(title);
    let name = collapse_whitespace(&decode_entities(name));
    (!name.is_empty()).then_some(name)
}
