//! Format-specific converters from uploaded bytes to [`DocumentUnit`]s.
//!
//! A [`ConverterRegistry`] maps lower-case file extensions to a
//! [`Converter`]. The built-in set covers PDF, Markdown, JSON, HTML, and
//! plain text; any other extension fails with
//! [`RagError::UnsupportedFormat`].
//!
//! | Extension | Units | Kind |
//! |-----------|-------|------|
//! | `pdf` | one per page with text (page number recorded) | `document` |
//! | `md` | one, markup stripped | `document` |
//! | `json` | one, pretty-printed with key order kept | `document` |
//! | `html` | one, raw markup; bytes also persisted as a session asset | `html_source` |
//! | `txt` | one, verbatim | `document` |
//!
//! Every converter returns at least one unit. A unit with empty text is
//! valid and simply produces no passages.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use qa_harness_core::{DocumentUnit, RagError, SessionId, UnitKind, UnitMetadata};

/// Loader for a single file format.
pub trait Converter: Send + Sync {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError>;

    /// Whether the raw upload must also be kept in the session asset directory.
    fn persists_raw(&self) -> bool {
        false
    }
}

/// Extension-keyed converter lookup.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("pdf", Arc::new(PdfConverter));
        registry.register("md", Arc::new(MarkdownConverter));
        registry.register("json", Arc::new(JsonConverter));
        registry.register("html", Arc::new(HtmlConverter));
        registry.register("txt", Arc::new(TextConverter));
        registry
    }

    /// Register (or replace) the converter for `extension`, with or without a leading dot.
    pub fn register(&mut self, extension: &str, converter: Arc<dyn Converter>) {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.converters.insert(key, converter);
    }

    /// Select the converter for `filename` by its extension, ignoring case.
    pub fn find(&self, filename: &str) -> Result<Arc<dyn Converter>, RagError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        self.converters
            .get(&extension)
            .cloned()
            .ok_or_else(|| RagError::UnsupportedFormat {
                extension: format!(".{}", extension),
            })
    }

    pub fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        self.find(filename)?.load(filename, bytes, session)
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

fn utf8<'a>(filename: &str, bytes: &'a [u8]) -> Result<&'a str, RagError> {
    std::str::from_utf8(bytes).map_err(|e| RagError::Conversion {
        filename: filename.to_string(),
        reason: format!("not valid UTF-8: {}", e),
    })
}

fn single_unit(text: String, filename: &str, session: &SessionId, kind: UnitKind) -> Vec<DocumentUnit> {
    vec![DocumentUnit {
        text,
        metadata: UnitMetadata::new(filename, session, kind),
    }]
}

// ============ Plain text ============

pub struct TextConverter;

impl Converter for TextConverter {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        let text = utf8(filename, bytes)?;
        Ok(single_unit(text.to_string(), filename, session, UnitKind::Document))
    }
}

// ============ HTML ============

/// Raw markup as one unit. The registry's caller persists the original bytes.
pub struct HtmlConverter;

impl Converter for HtmlConverter {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        let text = utf8(filename, bytes)?;
        Ok(single_unit(text.to_string(), filename, session, UnitKind::HtmlSource))
    }

    fn persists_raw(&self) -> bool {
        true
    }
}

// ============ JSON ============

pub struct JsonConverter;

impl Converter for JsonConverter {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        let text = utf8(filename, bytes)?;
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| RagError::Conversion {
                filename: filename.to_string(),
                reason: format!("invalid JSON: {}", e),
            })?;
        let pretty = serde_json::to_string_pretty(&value).map_err(|e| RagError::Conversion {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;
        Ok(single_unit(pretty, filename, session, UnitKind::Document))
    }
}

// ============ PDF ============

pub struct PdfConverter;

impl Converter for PdfConverter {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        let pages =
            pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| RagError::Conversion {
                filename: filename.to_string(),
                reason: format!("PDF extraction failed: {}", e),
            })?;

        let units: Vec<DocumentUnit> = pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| DocumentUnit {
                text,
                metadata: UnitMetadata::new(filename, session, UnitKind::Document)
                    .with_page(i as u32 + 1),
            })
            .collect();

        if units.is_empty() {
            return Ok(single_unit(String::new(), filename, session, UnitKind::Document));
        }
        Ok(units)
    }
}

// ============ Markdown ============

/// Markdown reduced to its readable text.
pub struct MarkdownConverter;

impl Converter for MarkdownConverter {
    fn load(
        &self,
        filename: &str,
        bytes: &[u8],
        session: &SessionId,
    ) -> Result<Vec<DocumentUnit>, RagError> {
        let text = utf8(filename, bytes)?;
        Ok(single_unit(
            strip_markdown(text),
            filename,
            session,
            UnitKind::Document,
        ))
    }
}

/// Drop block markers (headings, quotes, bullets, fences) and paired inline
/// markup (emphasis, code ticks, links, images) while keeping the text.
/// Lines inside a fenced code block are kept verbatim.
pub fn strip_markdown(source: &str) -> String {
    let mut in_fence = false;
    let mut lines = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            lines.push(line.to_string());
        } else {
            lines.push(strip_inline(strip_block_prefix(line)));
        }
    }
    lines.join("\n").trim().to_string()
}

fn strip_block_prefix(line: &str) -> &str {
    let trimmed = line.trim_start();

    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
        return trimmed[hashes..].trim_start();
    }
    if let Some(rest) = trimmed.strip_prefix("> ") {
        return rest;
    }
    for bullet in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            return rest;
        }
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
            return rest;
        }
    }
    line
}

fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    strip_inline_chars(&chars)
}

fn strip_inline_chars(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '`' => {
                let run = run_len(chars, i, c);
                match closing_run(chars, i + run, c, run, false) {
                    Some(close) => {
                        out.extend(&chars[i + run..close]);
                        i = close + run;
                    }
                    None => {
                        out.extend(&chars[i..i + run]);
                        i += run;
                    }
                }
            }
            '*' | '_' => {
                let run = run_len(chars, i, c);
                let marker = if c == '*' { run <= 3 } else { run == 2 };
                let close = if marker {
                    closing_run(chars, i + run, c, run, true)
                } else {
                    None
                };
                match close {
                    Some(close) => {
                        out.push_str(&strip_inline_chars(&chars[i + run..close]));
                        i = close + run;
                    }
                    None => {
                        out.extend(&chars[i..i + run]);
                        i += run;
                    }
                }
            }
            '!' if chars.get(i + 1) == Some(&'[') => match link_end(chars, i + 1) {
                Some((label, end)) => {
                    out.push_str(&label);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            '[' => match link_end(chars, i) {
                Some((label, end)) => {
                    out.push_str(&label);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn run_len(chars: &[char], start: usize, marker: char) -> usize {
    chars[start..].iter().take_while(|c| **c == marker).count()
}

/// Index of the next run of exactly `len` markers at or after `from`.
///
/// With `flanking`, the opener must be followed and the closer preceded by
/// non-whitespace, so `2 * 3 * 4` is left alone.
fn closing_run(chars: &[char], from: usize, marker: char, len: usize, flanking: bool) -> Option<usize> {
    if flanking && chars.get(from).map_or(true, |c| c.is_whitespace()) {
        return None;
    }
    let mut j = from;
    while j < chars.len() {
        if chars[j] != marker {
            j += 1;
            continue;
        }
        let run = run_len(chars, j, marker);
        if run == len && j > from && !(flanking && chars[j - 1].is_whitespace()) {
            return Some(j);
        }
        j += run;
    }
    None
}

/// For `[label](target)` starting at `open`, return the label and the index after `)`.
fn link_end(chars: &[char], open: usize) -> Option<(String, usize)> {
    let close = open + chars[open..].iter().position(|c| *c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let paren = close + 1 + chars[close + 1..].iter().position(|c| *c == ')')?;
    let label: String = chars[open + 1..close].iter().collect();
    Some((label, paren + 1))
}
