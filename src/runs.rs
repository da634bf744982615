//! Run merge/resplit: the two-phase transform that reconstructs logical
//! paragraph text across run boundaries and re-fragments rendered text back
//! into styled runs.
//!
//! Authoring tools split paragraph text into runs at arbitrary points
//! (spell-check, autocorrect), fragmenting template expressions. Naive
//! per-run substitution therefore cannot work; instead each paragraph is
//! merged into one logical string (recording every run's byte span), the
//! whole string is rendered, and the result is re-split while preserving
//! formatting:
//!
//! - literal text surviving at the head or tail of the paragraph keeps its
//!   original runs and styles;
//! - substituted plain text becomes a single run styled like the
//!   placeholder's run;
//! - substituted [`RichText`](crate::RichText) values become one run per
//!   segment, segment overrides layered over the placeholder's style;
//! - an empty rendering collapses to zero runs, never to a run with empty
//!   text;
//! - embedded newlines become explicit line-break runs.

use std::ops::Range;

use crate::model::{Paragraph, Run, Style};
use crate::richtext::{Piece, decode_pieces};

/// One original run's byte span within the merged text.
#[derive(Debug, Clone)]
struct Span {
    start: usize,
    end: usize,
    style: Style,
}

/// A read-only projection of a paragraph: its logical text plus, for every
/// character span, the style of the run that produced it.
#[derive(Debug, Clone)]
pub(crate) struct MergedParagraph {
    pub(crate) text: String,
    spans: Vec<Span>,
}

/// Concatenates the paragraph's run texts in order. No runs are mutated.
pub(crate) fn merge(paragraph: &Paragraph) -> MergedParagraph {
    let mut text = String::new();
    let mut spans = Vec::with_capacity(paragraph.runs.len());
    for run in &paragraph.runs {
        let start = text.len();
        text.push_str(&run.text);
        spans.push(Span {
            start,
            end: text.len(),
            style: run.style.clone(),
        });
    }
    MergedParagraph { text, spans }
}

impl MergedParagraph {
    /// Runs covering `range` of the merged text, sliced at the range
    /// boundaries with styles copied verbatim. Empty slices are dropped.
    fn slice_runs(&self, range: Range<usize>) -> Vec<Run> {
        let mut out = Vec::new();
        for span in &self.spans {
            let start = span.start.max(range.start);
            let end = span.end.min(range.end);
            if start < end {
                out.push(Run::new(&self.text[start..end], span.style.clone()));
            }
        }
        out
    }

    /// Style of the run containing byte offset `at` (clamped to the last
    /// run for end-of-text offsets). Default style for empty paragraphs.
    fn style_at(&self, at: usize) -> Style {
        for span in &self.spans {
            if at >= span.start && at < span.end {
                return span.style.clone();
            }
        }
        self.spans
            .last()
            .map(|s| s.style.clone())
            .unwrap_or_default()
    }

    /// The original runs, reconstituted unchanged.
    fn original_runs(&self) -> Vec<Run> {
        self.spans
            .iter()
            .map(|span| Run::new(&self.text[span.start..span.end], span.style.clone()))
            .collect()
    }
}

/// Re-splits `rendered` into a run sequence, honoring rich text segments
/// embedded in the rendered value.
pub(crate) fn resplit(merged: &MergedParagraph, rendered: &str) -> Vec<Run> {
    let pieces = decode_pieces(rendered);

    // Fast paths for the plain-text policy.
    if let [Piece::Plain(text)] = pieces.as_slice() {
        if text.is_empty() {
            return Vec::new();
        }
        if text == &merged.text {
            return merged.original_runs();
        }
    }

    // Literal prefix/suffix shared with the original text keeps its
    // original runs; only the span in between was produced by substitution.
    let head = match pieces.first() {
        Some(Piece::Plain(t)) => t.as_str(),
        _ => "",
    };
    let prefix = common_prefix(&merged.text, head);

    let tail = match (pieces.len(), pieces.last()) {
        // A single plain piece is both head and tail; the suffix may only
        // match what the prefix left over.
        (1, Some(Piece::Plain(t))) => &t[prefix..],
        (_, Some(Piece::Plain(t))) => t.as_str(),
        _ => "",
    };
    let suffix = common_suffix(&merged.text[prefix..], tail);

    let base_style = merged.style_at(prefix);
    let mut out = merged.slice_runs(0..prefix);
    let last = pieces.len() - 1;
    for (idx, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Plain(text) => {
                let start = if idx == 0 { prefix.min(text.len()) } else { 0 };
                let mut end = text.len();
                if idx == last {
                    end -= suffix.min(end - start);
                }
                push_with_breaks(&mut out, &text[start..end], &base_style);
            }
            Piece::Styled { text, style } => {
                push_with_breaks(&mut out, text, &style.merged_over(&base_style));
            }
        }
    }
    out.extend(merged.slice_runs(merged.text.len() - suffix..merged.text.len()));
    out
}

/// Removes the given byte ranges from the paragraph's merged text and
/// rebuilds the run sequence from what remains, styles preserved. Used to
/// strip structural directive markers. Ranges must be sorted and disjoint.
pub(crate) fn remove_ranges(merged: &MergedParagraph, ranges: &[Range<usize>]) -> Vec<Run> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for range in ranges {
        if range.start > cursor {
            out.extend(merged.slice_runs(cursor..range.start));
        }
        cursor = range.end;
    }
    if cursor < merged.text.len() {
        out.extend(merged.slice_runs(cursor..merged.text.len()));
    }
    out
}

/// Splits `text` at newlines, pushing one run per line and an explicit
/// line-break run per newline.
fn push_with_breaks(out: &mut Vec<Run>, text: &str, style: &Style) {
    if text.is_empty() {
        return;
    }
    let mut first = true;
    for line in text.split('\n') {
        if !first {
            out.push(Run::line_break(style.clone()));
        }
        if !line.is_empty() {
            out.push(Run::new(line, style.clone()));
        }
        first = false;
    }
}

/// Longest common prefix of `a` and `b` in bytes, aligned to a char
/// boundary of both.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}

/// Longest common suffix of `a` and `b` in bytes, aligned to a char
/// boundary of both.
fn common_suffix(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().rev().zip(b.chars().rev()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}
