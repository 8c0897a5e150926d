//! Markdown assembly: per-page results → one document.
//!
//! The assembler is pure: it reads a [`Document`] and returns a string, so
//! the same extraction can be assembled several times (the whole document,
//! then each requested range) without calling the model again.

use crate::config::{ConversionConfig, MetadataHeader, PageSelection, PageSeparator};
use crate::document::{Document, ExtractionResult};
use once_cell::sync::Lazy;
use regex::Regex;

const DEFAULT_TITLE: &str = "Documentation";
const TOC_HEADING: &str = "## Table of Contents";

/// What to put around and between the page texts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub header: MetadataHeader,
    pub separator: PageSeparator,
    pub table_of_contents: bool,
    /// Emit only these 1-based pages. `None` emits every successful page.
    pub pages: Option<PageSelection>,
}

impl AssemblyOptions {
    /// Options matching the conversion settings, for the whole document.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            header: config.metadata_header,
            separator: config.page_separator.clone(),
            table_of_contents: config.table_of_contents,
            pages: None,
        }
    }

    /// The same options restricted to `pages`.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// Assemble `document` into Markdown ending with exactly one newline.
pub fn assemble(document: &Document, options: &AssemblyOptions) -> String {
    let mut out = header(document, options.header);
    out.push_str(&body(document, options));

    if options.table_of_contents {
        out = insert_table_of_contents(&out);
    }

    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

/// Concatenate the page texts only: no header, no table of contents.
///
/// This is the text sent to a whole-document translation.
pub fn assemble_body(document: &Document, separator: &PageSeparator) -> String {
    join_pages(document, separator, None)
}

fn body(document: &Document, options: &AssemblyOptions) -> String {
    match (&document.translated_body, &options.pages) {
        (Some(translated), None) => translated.trim().to_string(),
        _ => join_pages(document, &options.separator, options.pages.as_ref()),
    }
}

fn join_pages(document: &Document, separator: &PageSeparator, pages: Option<&PageSelection>) -> String {
    let selected: Vec<&ExtractionResult> = match pages {
        Some(sel) => document.successful_in(sel).collect(),
        None => document.successful().collect(),
    };
    let mut out = String::new();
    let non_empty = selected
        .into_iter()
        .filter(|r| !r.output_text().trim().is_empty());
    for (i, result) in non_empty.enumerate() {
        let text = result.output_text().trim();
        if i > 0 {
            out.push_str(&separator.render(result.page_num()));
        }
        out.push_str(text);
    }
    out
}

// ── Header ──────────────────────────────────────────────────────────────────

fn title(document: &Document) -> String {
    document
        .metadata
        .title
        .clone()
        .or_else(|| Some(document.stem().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

fn header(document: &Document, style: MetadataHeader) -> String {
    let meta = &document.metadata;
    match style {
        MetadataHeader::None => String::new(),
        MetadataHeader::Heading => {
            let mut h = format!("# {}\n\n", title(document));
            if let Some(ref author) = meta.author {
                h.push_str(&format!("**Author**: {author}\n\n"));
            }
            if let Some(ref subject) = meta.subject {
                h.push_str(&format!("**Description**: {subject}\n\n"));
            }
            h.push_str("---\n\n");
            h
        }
        MetadataHeader::YamlFrontMatter => {
            let mut h = String::from("---\n");
            h.push_str(&format!("title: {}\n", yaml_string(&title(document))));
            if let Some(ref author) = meta.author {
                h.push_str(&format!("author: {}\n", yaml_string(author)));
            }
            if let Some(ref subject) = meta.subject {
                h.push_str(&format!("description: {}\n", yaml_string(subject)));
            }
            h.push_str(&format!("source: {}\n", yaml_string(&document.source)));
            if meta.page_count > 0 {
                h.push_str(&format!("pages: {}\n", meta.page_count));
            }
            if let Some(ref lang) = document.target_language {
                h.push_str(&format!("language: {}\n", yaml_string(lang)));
            }
            h.push_str("---\n\n");
            h
        }
    }
}

/// Double-quoted YAML scalar.
fn yaml_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Table of contents ───────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());
static RE_ANCHOR_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]").unwrap());

const TOC_SKIP: &[&str] = &["table of contents", "contents", "toc"];

/// GitHub-style anchor: lower-case, spaces → `-`, punctuation dropped.
pub fn anchor(heading: &str) -> String {
    let dashed = heading.to_lowercase().replace(' ', "-");
    RE_ANCHOR_STRIP.replace_all(&dashed, "").into_owned()
}

/// Headings outside fenced code blocks: `(level, text, line index)`.
fn headings(markdown: &str) -> Vec<(usize, String, usize)> {
    let mut in_code = false;
    let mut found = Vec::new();
    for (i, line) in markdown.lines().enumerate() {
        let t = line.trim_start();
        if t.starts_with("```") || t.starts_with("~~~") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        if let Some(caps) = RE_HEADING.captures(line) {
            found.push((caps[1].len(), caps[2].to_string(), i));
        }
    }
    found
}

/// Build the TOC and insert it after the first heading line.
fn insert_table_of_contents(markdown: &str) -> String {
    let found = headings(markdown);
    let Some(&(_, _, first_line)) = found.first() else {
        return markdown.to_string();
    };

    let mut toc = format!("{TOC_HEADING}\n\n");
    for (level, text, _) in &found {
        if TOC_SKIP.contains(&text.to_lowercase().as_str()) {
            continue;
        }
        toc.push_str(&format!(
            "{}- [{}](#{})\n",
            "  ".repeat(level - 1),
            text,
            anchor(text)
        ));
    }

    let lines: Vec<&str> = markdown.lines().collect();
    let mut out = String::with_capacity(markdown.len() + toc.len() + 4);
    for (i, line) in lines.iter().enumerate() {
        out.push_str(line);
        out.push('\n');
        if i == first_line {
            out.push('\n');
            out.push_str(&toc);
            if lines.get(i + 1).is_some_and(|next| !next.trim().is_empty()) {
                out.push('\n');
            }
        }
    }
    out
}

/// `{stem}_page_{NNN}.md`
pub fn page_file_name(stem: &str, page_num: usize) -> String {
    format!("{stem}_page_{page_num:03}.md")
}

/// `{stem}_full.md`
pub fn full_file_name(stem: &str) -> String {
    format!("{stem}_full.md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMetadata;
    use crate::error::PageError;

    fn page(index: usize, text: &str) -> ExtractionResult {
        ExtractionResult {
            page_index: index,
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn doc(results: Vec<ExtractionResult>) -> Document {
        let mut d = Document::new("lm317.pdf", DocumentMetadata::default());
        d.results = results;
        d
    }

    fn plain() -> AssemblyOptions {
        AssemblyOptions {
            header: MetadataHeader::None,
            separator: PageSeparator::None,
            table_of_contents: false,
            pages: None,
        }
    }

    #[test]
    fn joins_pages_with_blank_line() {
        let d = doc(vec![page(0, "one\n"), page(1, "two\n")]);
        assert_eq!(assemble(&d, &plain()), "one\n\ntwo\n");
    }

    #[test]
    fn failed_pages_are_skipped() {
        let d = doc(vec![
            page(0, "one"),
            ExtractionResult::failed(
                1,
                PageError::ExtractionFailed { page: 2, retries: 3, detail: "503".into() },
            ),
            page(2, "three"),
        ]);
        assert_eq!(assemble(&d, &plain()), "one\n\nthree\n");
    }

    #[test]
    fn empty_pages_get_no_separator() {
        let d = doc(vec![page(0, "A\n"), page(1, "\n"), page(2, "B\n")]);
        assert_eq!(assemble(&d, &plain()), "A\n\nB\n");

        let mut opts = plain();
        opts.separator = PageSeparator::HorizontalRule;
        assert_eq!(assemble(&d, &opts), "A\n\n---\n\nB\n");
    }

    #[test]
    fn translated_text_wins() {
        let mut p = page(0, "Hello");
        p.translated = Some("Hallo".into());
        assert_eq!(assemble(&doc(vec![p]), &plain()), "Hallo\n");
    }

    #[test]
    fn range_restriction() {
        let d = doc((0..5).map(|i| page(i, &format!("p{}", i + 1))).collect());
        let out = assemble(&d, &plain().with_pages(PageSelection::Range(2, 3)));
        assert_eq!(out, "p2\n\np3\n");
    }

    #[test]
    fn document_translation_replaces_body_only_without_range() {
        let mut d = doc(vec![page(0, "Hello"), page(1, "World")]);
        d.translated_body = Some("Bonjour\n\nMonde".into());
        assert_eq!(assemble(&d, &plain()), "Bonjour\n\nMonde\n");
        let ranged = assemble(&d, &plain().with_pages(PageSelection::Single(2)));
        assert_eq!(ranged, "World\n");
    }

    #[test]
    fn comment_separator_names_page() {
        let d = doc(vec![page(0, "a"), page(3, "b")]);
        let mut opts = plain();
        opts.separator = PageSeparator::Comment;
        assert_eq!(assemble(&d, &opts), "a\n\n<!-- page 4 -->\n\nb\n");
    }

    #[test]
    fn heading_header_uses_metadata() {
        let mut d = doc(vec![page(0, "body")]);
        d.metadata.title = Some("LM317 Regulator".into());
        d.metadata.author = Some("Texas Instruments".into());
        d.metadata.subject = Some("3-terminal adjustable regulator".into());
        let mut opts = plain();
        opts.header = MetadataHeader::Heading;
        assert_eq!(
            assemble(&d, &opts),
            "# LM317 Regulator\n\n**Author**: Texas Instruments\n\n\
             **Description**: 3-terminal adjustable regulator\n\n---\n\nbody\n"
        );
    }

    #[test]
    fn title_falls_back_to_stem() {
        let d = doc(vec![page(0, "body")]);
        let mut opts = plain();
        opts.header = MetadataHeader::Heading;
        assert!(assemble(&d, &opts).starts_with("# lm317\n"));

        let mut nameless = Document::new("", DocumentMetadata::default());
        nameless.results = vec![page(0, "body")];
        assert!(assemble(&nameless, &opts).starts_with("# Documentation\n"));
    }

    #[test]
    fn yaml_front_matter_escapes() {
        let mut d = doc(vec![page(0, "body")]);
        d.metadata.title = Some("The \"fast\" ADC".into());
        let mut opts = plain();
        opts.header = MetadataHeader::YamlFrontMatter;
        let out = assemble(&d, &opts);
        assert!(out.starts_with("---\ntitle: \"The \\\"fast\\\" ADC\"\n"));
        assert!(out.contains("source: \"lm317.pdf\"\n---\n\nbody\n"));
    }

    #[test]
    fn toc_after_first_heading() {
        let d = doc(vec![page(0, "# LM317\n\nIntro\n\n## Pin Configuration\n\n### Absolute Max. Ratings")]);
        let mut opts = plain();
        opts.table_of_contents = true;
        let out = assemble(&d, &opts);
        assert_eq!(
            out,
            "# LM317\n\n## Table of Contents\n\n\
             - [LM317](#lm317)\n\
             \x20 - [Pin Configuration](#pin-configuration)\n\
             \x20   - [Absolute Max. Ratings](#absolute-max-ratings)\n\
             \nIntro\n\n## Pin Configuration\n\n### Absolute Max. Ratings\n"
        );
    }

    #[test]
    fn toc_skips_existing_contents_and_code() {
        let md = "# Title\n## Contents\n```\n# not a heading\n```\n## Features\n";
        let out = insert_table_of_contents(md);
        assert!(out.contains("- [Title](#title)"));
        assert!(out.contains("  - [Features](#features)"));
        assert!(!out.contains("[Contents]"));
        assert!(!out.contains("[not a heading]"));
    }

    #[test]
    fn no_headings_no_toc() {
        let d = doc(vec![page(0, "just text")]);
        let mut opts = plain();
        opts.table_of_contents = true;
        assert_eq!(assemble(&d, &opts), "just text\n");
    }

    #[test]
    fn anchors() {
        assert_eq!(anchor("Electrical Characteristics"), "electrical-characteristics");
        assert_eq!(anchor("I2C (TWI) Interface"), "i2c-twi-interface");
    }

    #[test]
    fn file_names() {
        assert_eq!(page_file_name("lm317", 7), "lm317_page_007.md");
        assert_eq!(page_file_name("big", 1234), "big_page_1234.md");
        assert_eq!(full_file_name("lm317"), "lm317_full.md");
    }

    #[test]
    fn empty_document_is_single_newline() {
        assert_eq!(assemble(&doc(vec![]), &plain()), "\n");
    }
}
