//! Prompts for datasheet extraction and translation.
//!
//! Every prompt lives here so behaviour changes are made in one place and
//! unit tests can inspect the exact text sent to the model. Callers can
//! override the system prompt via
//! [`crate::config::ConversionConfig::system_prompt`]; page instructions and
//! the context preamble are always generated here.

/// Formatting rules shared by the extraction prompts.
const FORMAT_RULES: &str = r#"Tables:
- Prefer bullet lists over tables when a table has more than 3 columns or any cell would exceed 50 characters
- Keep table cells at 50 characters or fewer
- Never fill cells with repeated characters such as dots or dashes
- Split a complex table into several simple tables with clear headings
- If a cell starts to fill with long text or repeated characters, stop and reformat the content as bullet points

Tables of contents:
- Never use dot leaders or other filler between an entry and its page number
- Write entries as "Section Name - Page X" or list the section names only
- Show hierarchy with nested lists, not alignment

Ignore page numbers, running headers, footers and other layout artefacts that carry no technical content."#;

/// System prompt for extraction in the source language.
pub const SYSTEM_PROMPT_EXTRACT: &str = r#"You are an expert in extracting and structuring information from technical documentation.
Extract all valuable information from the datasheet page and format it as Markdown.
Use headings, lists and other Markdown elements for a clear presentation.
Preserve every technical specification, parameter, diagram description and functional detail.

{format_rules}

Output only the Markdown content: no code fences around the whole page, no commentary.
The result must be well structured, complete and immediately usable as technical documentation."#;

/// System prompt for extraction straight into a target language.
///
/// `{target_language}` is substituted by [`system_prompt`].
pub const SYSTEM_PROMPT_EXTRACT_TRANSLATE: &str = r#"You are an expert in extracting, structuring and translating information from technical documentation.
Extract all valuable information from the datasheet page, translate it into {target_language}, and format the translation as Markdown.
Use headings, lists and other Markdown elements for a clear presentation.
Preserve every technical specification, parameter, diagram description and functional detail.

{format_rules}

Do NOT include the source-language text. Output only the translated Markdown.
Translate technical terms accurately without changing their meaning.
Keep units, chemical formulas, mathematical expressions, part numbers and register names unchanged."#;

/// System prompt for the text-only translation pass.
pub const SYSTEM_PROMPT_TRANSLATE: &str = r#"You are a professional translator of technical documentation.
Translate the Markdown you are given into {target_language}.
Keep the Markdown structure exactly: headings, lists, tables, code blocks and links stay where they are.
Keep units, chemical formulas, mathematical expressions, part numbers, register names and code unchanged.
Output only the translated Markdown, without the source text and without commentary."#;

/// Register-map guidance appended to every page instruction.
const PAGE_RULES: &str = r#"For register descriptions and technical data:
- Present each register as plain text: name, address, type, bank, reset value
- Describe bit fields with bullet points or numbered lists rather than tables
- If a table is unavoidable, keep it to at most 3 columns with cells of 50 characters or fewer
- Never use tables for lengthy descriptions
- Never produce repeating character patterns

If the page is a table of contents, write it as a clean list without dot leaders."#;

/// Build the system prompt for an extraction call.
pub fn system_prompt(target_language: Option<&str>) -> String {
    match target_language {
        Some(lang) => SYSTEM_PROMPT_EXTRACT_TRANSLATE
            .replace("{format_rules}", FORMAT_RULES)
            .replace("{target_language}", lang),
        None => SYSTEM_PROMPT_EXTRACT.replace("{format_rules}", FORMAT_RULES),
    }
}

/// Build the user instruction sent with the page image.
pub fn page_instruction(page_num: usize, total_pages: usize, target_language: Option<&str>) -> String {
    let task = match target_language {
        Some(lang) => format!(
            "Extract all technical information, translate it directly into {lang}, and format it as Markdown.\n\
             Do NOT include the source text. Keep measurements, part numbers and technical values unchanged."
        ),
        None => "Extract all technical information and format it as Markdown.\n\
                 Keep the technical content intact while producing a clean, structured document."
            .to_string(),
    };
    format!(
        "This is page {page_num} of {total_pages} from the datasheet.\n{task}\n\n{PAGE_RULES}"
    )
}

/// Wrap the carried text of previous pages.
pub fn context_block(previous_pages: &str) -> String {
    format!(
        "Here is context from the previous datasheet pages. Continue numbering, \
         tables and heading levels consistently; do not repeat this text:\n\n{}",
        previous_pages
    )
}

/// Build the system prompt for the translation pass.
pub fn translation_prompt(target_language: &str) -> String {
    SYSTEM_PROMPT_TRANSLATE.replace("{target_language}", target_language)
}
