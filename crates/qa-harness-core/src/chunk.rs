//! Overlapping sliding-window text chunker.
//!
//! Splits each [`DocumentUnit`]'s text into [`Passage`]s of at most
//! `max_chars` characters, where consecutive passages from the same unit
//! share exactly `overlap_chars` characters.
//!
//! # Algorithm
//!
//! 1. Work on characters, not bytes, so multi-byte UTF-8 is never cut.
//! 2. If the rest of the text fits in `max_chars`, emit it and stop.
//! 3. Otherwise look at the window `[start, start + max_chars)` and cut just
//!    after the last `"\n\n"` in it; failing that the last `"\n"`, then the
//!    last `" "`; failing all three, cut at the window edge.
//! 4. A separator only counts if the cut lands past `start + overlap_chars`,
//!    which guarantees forward progress.
//! 5. The next window starts `overlap_chars` before the cut.
//!
//! Because the overlap is exact, dropping the first `overlap_chars`
//! characters of every passage after the first and concatenating the rest
//! reproduces the unit text.
//!
//! # Example
//!
//! ```rust
//! use qa_harness_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(20, 5).unwrap();
//! let spans = chunker.split_text("First paragraph.\n\nSecond one.");
//! assert_eq!(spans.len(), 2);
//! assert_eq!(spans[0].1, "First paragraph.\n\n");
//! ```

use anyhow::{bail, Result};

use crate::models::{DocumentUnit, Passage};

/// Default maximum passage length, in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;
/// Default overlap between consecutive passages, in characters.
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Boundary preference order; raw character cuts are the implicit fallback.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Deterministic passage splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl Chunker {
    /// Create a chunker. Fails unless `0 <= overlap_chars < max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            bail!("max_chars must be > 0");
        }
        if overlap_chars >= max_chars {
            bail!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                overlap_chars,
                max_chars
            );
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Split every unit, in order. Each passage inherits its unit's metadata.
    ///
    /// Units with empty or whitespace-only text contribute nothing.
    pub fn split(&self, units: &[DocumentUnit]) -> Vec<Passage> {
        let mut passages = Vec::new();
        for unit in units {
            for (index, (start, text)) in self.split_text(&unit.text).into_iter().enumerate() {
                passages.push(Passage {
                    text,
                    index,
                    start,
                    metadata: unit.metadata.clone(),
                });
            }
        }
        passages
    }

    /// Split raw text into `(char_offset, text)` spans.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= self.max_chars {
                spans.push((start, chars[start..].iter().collect()));
                break;
            }
            let end = self.cut_point(&chars, start);
            spans.push((start, chars[start..end].iter().collect()));
            start = end - self.overlap_chars;
        }

        spans
    }

    /// Pick the end of the window starting at `start`.
    fn cut_point(&self, chars: &[char], start: usize) -> usize {
        let limit = start + self.max_chars;
        let floor = start + self.overlap_chars;

        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            if let Some(cut) = last_cut_after(chars, start, limit, &sep) {
                if cut > floor {
                    return cut;
                }
            }
        }

        limit
    }
}

/// Index just past the last occurrence of `sep` lying fully inside `[lo, hi)`.
fn last_cut_after(chars: &[char], lo: usize, hi: usize, sep: &[char]) -> Option<usize> {
    if hi < lo + sep.len() {
        return None;
    }
    (lo..=hi - sep.len())
        .rev()
        .find(|&i| chars[i..i + sep.len()] == *sep)
        .map(|i| i + sep.len())
}
