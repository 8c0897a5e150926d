//! Post-processing: deterministic cleanup of model-generated Markdown.
//!
//! Vision models follow formatting instructions loosely. They wrap output in
//! code fences, echo running page numbers, pad tables of contents with dot
//! leaders and occasionally invent image links. The rules below repair those
//! artefacts without touching technical content. Each one is a pure
//! `&str → String` pass and is tested on its own.
//!
//! Order matters: fences are stripped and line endings normalised before any
//! line-based rule runs, and the final-newline pass comes last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to raw model output.
///
/// 1. Strip an outer ```` ```markdown ```` fence
/// 2. CRLF → LF
/// 3. Trim trailing whitespace
/// 4. Drop standalone page-number lines (outside code fences)
/// 5. Collapse filler dot/dash runs (outside code fences)
/// 6. Collapse 3+ newlines to a single blank line
/// 7. Blank line before headings
/// 8. Insert missing GFM separator rows
/// 9. Drop separator rows inside table bodies
/// 10. Replace placeholder image links by italic captions
/// 11. Strip invisible Unicode
/// 12. Exactly one trailing newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = trim_line_ends(&s);
    let s = drop_page_number_lines(&s);
    let s = collapse_filler_runs(&s);
    let s = collapse_blank_lines(&s);
    let s = space_headings(&s);
    let s = insert_table_separators(&s);
    let s = drop_body_separators(&s);
    let s = caption_placeholder_images(&s);
    let s = strip_invisible(&s);
    with_final_newline(&s)
}

// ── Fences ──────────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(markdown|md)?[ \t]*\r?\n(.*)\r?\n```\s*$").unwrap()
});

/// Strip a fence wrapping the whole reply. A bare fence only counts as a
/// wrapper when the body has no fences of its own; a `markdown` fence may
/// contain balanced inner code blocks.
fn strip_outer_fence(input: &str) -> String {
    let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) else {
        return input.to_string();
    };
    let body = &caps[2];
    let inner_fences = body.lines().filter(|l| l.starts_with("```")).count();
    let wraps = match caps.get(1) {
        Some(_) => inner_fences % 2 == 0,
        None => inner_fences == 0,
    };
    if wraps {
        body.to_string()
    } else {
        input.to_string()
    }
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Rewrite lines outside fenced code blocks with `f`; `None` drops the line.
fn map_prose_lines<F>(input: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut in_code = false;
    let mut out = Vec::new();
    for line in input.lines() {
        if is_fence(line) {
            in_code = !in_code;
            out.push(line.to_string());
        } else if in_code {
            out.push(line.to_string());
        } else if let Some(kept) = f(line) {
            out.push(kept);
        }
    }
    out.join("\n")
}

// ── Whitespace ──────────────────────────────────────────────────────────────

fn trim_line_ends(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn with_final_newline(input: &str) -> String {
    let body = input.trim_end();
    if body.is_empty() {
        String::from("\n")
    } else {
        format!("{body}\n")
    }
}

// ── Page furniture ──────────────────────────────────────────────────────────

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:page\s+\d+(?:\s*(?:of|/)\s*\d+)?|\d{1,4})\s*$").unwrap()
});

fn drop_page_number_lines(input: &str) -> String {
    map_prose_lines(input, |line| {
        (!RE_PAGE_NUMBER.is_match(line)).then(|| line.to_string())
    })
}

// Eight or more dots (optionally spaced), ellipsis characters or dashes
// between two pieces of text.
static RE_FILLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*(?:(?:\.[ \t]?){8,}|…{3,}|-{8,}|_{8,})[ \t]*").unwrap());

fn collapse_filler_runs(input: &str) -> String {
    map_prose_lines(input, |line| {
        if is_separator_row(line) || is_rule_line(line) {
            return Some(line.to_string());
        }
        Some(
            RE_FILLER
                .replace_all(line, |caps: &regex::Captures<'_>| {
                    let span = caps.get(0).map_or(0..0, |m| m.range());
                    if span.start == 0 || span.end == line.len() {
                        String::new()
                    } else {
                        String::from(" - ")
                    }
                })
                .into_owned(),
        )
    })
}

fn is_rule_line(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && ['-', '_', '*'].iter().any(|&r| t.chars().all(|c| c == r))
}

// ── Headings ────────────────────────────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn space_headings(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 32);
    let mut in_code = false;
    for (i, line) in input.lines().enumerate() {
        if is_fence(line) {
            in_code = !in_code;
        }
        if !in_code && i > 0 && is_heading(line) {
            let kept = out.trim_end_matches('\n').len();
            out.truncate(kept);
            out.push_str("\n\n");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ── Tables ──────────────────────────────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// A header row followed directly by a data row gets a `| --- |` row.
fn insert_table_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut prev_in_table = false;
    let mut in_code = false;

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if is_fence(line) {
            in_code = !in_code;
        }
        let row = !in_code && is_table_row(line);
        let starts_table = row && !prev_in_table && !is_separator_row(line);
        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                let mut sep = String::from("|");
                for _ in 0..cols {
                    sep.push_str(" --- |");
                }
                out.push(sep);
            }
        }
        prev_in_table = row;
    }
    out.join("\n")
}

/// Only the second row of a table may be a separator.
fn drop_body_separators(input: &str) -> String {
    let mut row_in_table = 0usize;
    let mut in_code = false;
    input
        .lines()
        .filter(|line| {
            if is_fence(line) {
                in_code = !in_code;
            }
            if in_code || !is_table_row(line) {
                row_in_table = 0;
                return true;
            }
            row_in_table += 1;
            !(is_separator_row(line) && row_in_table != 2)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Images ──────────────────────────────────────────────────────────────────

static RE_IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "placehold.it",
    "dummyimage.com",
    "picsum.photos",
];

/// Links to local files or dummy hosts cannot resolve: the model invented
/// them for a figure it saw on the page.
fn is_placeholder(url: &str) -> bool {
    let u = url.trim();
    !(u.starts_with("http://") || u.starts_with("https://"))
        || PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

fn caption_placeholder_images(input: &str) -> String {
    RE_IMAGE_LINK
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_placeholder(&caps[2]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{alt}*"),
            }
        })
        .into_owned()
}

fn strip_invisible(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}
