//! Structural directive scanning and pairing.
//!
//! Inline expressions (`{{ }}`, `{% %}`, `{# #}`) are opaque here and flow
//! through to the evaluator as part of merged paragraph text. Structural
//! markers carry a scope prefix before the keyword (`{%slide for x in y%}`,
//! `{%sp if cond%}`, `{%tc endif%}`) and must act above the text level, so
//! the scanner locates them across all text-bearing leaves of a scope,
//! classifies them, and pairs opens with closes. It evaluates nothing: loop
//! variables and condition/iterable sources are extracted as opaque strings
//! for the resolver to hand to the evaluator.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Scope, TemplateError, TemplateResult};
use crate::model::{Paragraph, Row, Shape, Slide, TextFrame};
use crate::runs;

/// Structural marker shape: scope prefix directly after `{%`, then the
/// directive body up to the closing `%}`.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%\s*(slide|sp|tr|tc|pp)\s+(.*?)\s*%\}").expect("marker regex compiles")
});

static FOR_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^for\s+(\w+)\s+in\s+(.+)$").expect("for-body regex compiles")
});

/// True when the text contains any template syntax at all. Paragraphs
/// without it skip the evaluator entirely.
pub(crate) fn has_template_syntax(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

/// Rewrites structural markers to their unprefixed inline form
/// (`{%slide for x in y%}` → `{% for x in y %}`) so the evaluator can
/// parse whole-scope text. Used by the static variable collector.
pub(crate) fn neutralize_structural_markers(text: &str) -> String {
    MARKER_RE.replace_all(text, "{% $2 %}").into_owned()
}

/// An approximate position in the document tree, reported with errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub slide: Option<usize>,
    pub shape: Option<usize>,
    pub row: Option<usize>,
    pub cell: Option<usize>,
    pub paragraph: Option<usize>,
}

impl Location {
    /// A location that names no particular node.
    pub fn document() -> Self {
        Self::default()
    }

    pub fn slide(index: usize) -> Self {
        Self {
            slide: Some(index),
            ..Self::default()
        }
    }

    pub(crate) fn at(slide: usize, addr: &ParaAddr) -> Self {
        Self {
            slide: Some(slide),
            shape: Some(addr.shape),
            row: addr.row,
            cell: addr.cell,
            paragraph: Some(addr.para),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(i) = self.slide {
            parts.push(format!("slide {i}"));
        }
        if let Some(i) = self.shape {
            parts.push(format!("shape {i}"));
        }
        if let Some(i) = self.row {
            parts.push(format!("row {i}"));
        }
        if let Some(i) = self.cell {
            parts.push(format!("cell {i}"));
        }
        if let Some(i) = self.paragraph {
            parts.push(format!("paragraph {i}"));
        }
        if parts.is_empty() {
            write!(f, "document")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Addresses one paragraph within a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ParaAddr {
    pub shape: usize,
    /// Set for paragraphs inside a table cell.
    pub row: Option<usize>,
    pub cell: Option<usize>,
    /// The paragraph lives in a picture caption rather than a text box.
    pub caption: bool,
    pub para: usize,
}

impl ParaAddr {
    fn text_box(shape: usize, para: usize) -> Self {
        Self {
            shape,
            row: None,
            cell: None,
            caption: false,
            para,
        }
    }

    fn table_cell(shape: usize, row: usize, cell: usize, para: usize) -> Self {
        Self {
            shape,
            row: Some(row),
            cell: Some(cell),
            caption: false,
            para,
        }
    }

    fn picture_caption(shape: usize, para: usize) -> Self {
        Self {
            shape,
            row: None,
            cell: None,
            caption: true,
            para,
        }
    }
}

/// Resolves the text frame an address points into, if it still exists.
pub(crate) fn frame_mut<'a>(slide: &'a mut Slide, addr: &ParaAddr) -> Option<&'a mut TextFrame> {
    let shape = slide.shapes.get_mut(addr.shape)?;
    match (shape, addr.row, addr.cell) {
        (Shape::Table(table), Some(row), Some(cell)) => {
            Some(&mut table.rows.get_mut(row)?.cells.get_mut(cell)?.frame)
        }
        (Shape::TextBox(frame), None, None) if !addr.caption => Some(frame),
        (Shape::Picture(picture), None, None) if addr.caption => picture.caption.as_mut(),
        _ => None,
    }
}

/// Resolves a paragraph address within `slide`, if it still exists.
pub(crate) fn paragraph_mut<'a>(slide: &'a mut Slide, addr: &ParaAddr) -> Option<&'a mut Paragraph> {
    frame_mut(slide, addr)?.paragraphs.get_mut(addr.para)
}

/// A directive body, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MarkerBody {
    For { var: String, iterable: String },
    If { condition: String },
    EndFor,
    EndIf,
}

impl MarkerBody {
    fn is_open(&self) -> bool {
        matches!(self, Self::For { .. } | Self::If { .. })
    }
}

/// One discovered structural marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Marker {
    pub scope: Scope,
    pub body: MarkerBody,
    /// Raw body text, e.g. `for item in items`. Error reporting only.
    pub raw: String,
    pub addr: ParaAddr,
    /// Byte range of the whole marker in the paragraph's merged text.
    pub range: Range<usize>,
    /// Position in scope scan order; pairing output is sorted by the open
    /// marker's sequence number.
    pub seq: usize,
}

/// A matched (open, close) marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directive {
    pub scope: Scope,
    pub open: Marker,
    pub close: Marker,
}

impl Directive {
    pub(crate) fn loop_parts(&self) -> Option<(&str, &str)> {
        match &self.open.body {
            MarkerBody::For { var, iterable } => Some((var, iterable)),
            MarkerBody::If { .. } | MarkerBody::EndFor | MarkerBody::EndIf => None,
        }
    }

    pub(crate) fn condition(&self) -> Option<&str> {
        match &self.open.body {
            MarkerBody::If { condition } => Some(condition),
            MarkerBody::For { .. } | MarkerBody::EndFor | MarkerBody::EndIf => None,
        }
    }
}

fn parse_scope(name: &str) -> Scope {
    match name {
        "slide" => Scope::Slide,
        "sp" => Scope::Shape,
        "tr" => Scope::Row,
        "tc" => Scope::Cell,
        _ => Scope::Paragraph,
    }
}

fn parse_body(body: &str) -> Option<MarkerBody> {
    match body {
        "endfor" => Some(MarkerBody::EndFor),
        "endif" => Some(MarkerBody::EndIf),
        _ => {
            if let Some(caps) = FOR_BODY_RE.captures(body) {
                Some(MarkerBody::For {
                    var: caps[1].to_string(),
                    iterable: caps[2].trim().to_string(),
                })
            } else {
                body.strip_prefix("if").and_then(|rest| {
                    let condition = rest.trim();
                    (!condition.is_empty() && rest.starts_with(char::is_whitespace)).then(|| {
                        MarkerBody::If {
                            condition: condition.to_string(),
                        }
                    })
                })
            }
        }
    }
}

/// Scans one paragraph's merged text for markers of `scope`, appending to
/// `out`. Markers of other scopes are left for their own pass.
fn scan_text(
    text: &str,
    scope: Scope,
    addr: ParaAddr,
    slide_idx: usize,
    out: &mut Vec<Marker>,
) -> TemplateResult<()> {
    for caps in MARKER_RE.captures_iter(text) {
        if parse_scope(&caps[1]) != scope {
            continue;
        }
        let raw = caps[2].to_string();
        let body = parse_body(&raw).ok_or_else(|| TemplateError::Expression {
            source_text: caps[0].to_string(),
            location: Location::at(slide_idx, &addr),
            message: format!("unknown structural directive body '{raw}'"),
        })?;
        // Only slides and rows have a loop form; the finer scopes gate
        // content without repeating it.
        if matches!(scope, Scope::Shape | Scope::Cell | Scope::Paragraph)
            && matches!(body, MarkerBody::For { .. } | MarkerBody::EndFor)
        {
            return Err(TemplateError::Expression {
                source_text: caps[0].to_string(),
                location: Location::at(slide_idx, &addr),
                message: format!("'{scope}' markers support conditionals only"),
            });
        }
        let whole = caps.get(0).expect("capture 0 always present");
        out.push(Marker {
            scope,
            body,
            raw,
            addr,
            range: whole.range(),
            seq: out.len(),
        });
    }
    Ok(())
}

/// All markers of `scope` across every text-bearing leaf of the slide, in
/// document order.
pub(crate) fn slide_markers(
    slide: &Slide,
    slide_idx: usize,
    scope: Scope,
) -> TemplateResult<Vec<Marker>> {
    let mut out = Vec::new();
    for (shape_idx, shape) in slide.shapes.iter().enumerate() {
        match shape {
            Shape::TextBox(frame) => {
                for (para_idx, para) in frame.paragraphs.iter().enumerate() {
                    scan_text(
                        &para.text(),
                        scope,
                        ParaAddr::text_box(shape_idx, para_idx),
                        slide_idx,
                        &mut out,
                    )?;
                }
            }
            Shape::Table(table) => {
                for (row_idx, row) in table.rows.iter().enumerate() {
                    for (cell_idx, cell) in row.cells.iter().enumerate() {
                        for (para_idx, para) in cell.frame.paragraphs.iter().enumerate() {
                            scan_text(
                                &para.text(),
                                scope,
                                ParaAddr::table_cell(shape_idx, row_idx, cell_idx, para_idx),
                                slide_idx,
                                &mut out,
                            )?;
                        }
                    }
                }
            }
            Shape::Picture(picture) => {
                if let Some(caption) = &picture.caption {
                    for (para_idx, para) in caption.paragraphs.iter().enumerate() {
                        scan_text(
                            &para.text(),
                            scope,
                            ParaAddr::picture_caption(shape_idx, para_idx),
                            slide_idx,
                            &mut out,
                        )?;
                    }
                }
            }
        }
    }
    renumber(&mut out);
    Ok(out)
}

/// All markers of `scope` within one table row, in document order.
pub(crate) fn row_markers(
    row: &Row,
    slide_idx: usize,
    shape_idx: usize,
    row_idx: usize,
    scope: Scope,
) -> TemplateResult<Vec<Marker>> {
    let mut out = Vec::new();
    for (cell_idx, cell) in row.cells.iter().enumerate() {
        for (para_idx, para) in cell.frame.paragraphs.iter().enumerate() {
            scan_text(
                &para.text(),
                scope,
                ParaAddr::table_cell(shape_idx, row_idx, cell_idx, para_idx),
                slide_idx,
                &mut out,
            )?;
        }
    }
    renumber(&mut out);
    Ok(out)
}

fn renumber(markers: &mut [Marker]) {
    for (seq, marker) in markers.iter_mut().enumerate() {
        marker.seq = seq;
    }
}

/// Pairs open and close markers using a stack per directive kind:
/// first-open/nearest-close within a kind, kinds interleaving freely.
///
/// Fails with [`TemplateError::UnmatchedDirective`] if a close has no
/// pending open, if an open of a kind arrives while another open of the
/// same kind is still pending (same-kind spans must not overlap, so such
/// input cannot pair unambiguously), or if any open remains unmatched at
/// scope end.
pub(crate) fn pair(markers: Vec<Marker>, slide_idx: usize) -> TemplateResult<Vec<Directive>> {
    let mut for_stack: Vec<Marker> = Vec::new();
    let mut if_stack: Vec<Marker> = Vec::new();
    let mut directives = Vec::new();

    for marker in markers {
        if marker.body.is_open() {
            let stack = match marker.body {
                MarkerBody::For { .. } => &mut for_stack,
                MarkerBody::If { .. } => &mut if_stack,
                MarkerBody::EndFor | MarkerBody::EndIf => unreachable!("close marked as open"),
            };
            if !stack.is_empty() {
                return Err(unmatched(&marker, slide_idx));
            }
            stack.push(marker);
            continue;
        }
        let stack = match marker.body {
            MarkerBody::EndFor => &mut for_stack,
            MarkerBody::EndIf => &mut if_stack,
            MarkerBody::For { .. } | MarkerBody::If { .. } => unreachable!("open marked as close"),
        };
        let open = stack.pop().ok_or_else(|| unmatched(&marker, slide_idx))?;
        directives.push(Directive {
            scope: open.scope,
            open,
            close: marker,
        });
    }

    if let Some(open) = for_stack.into_iter().chain(if_stack).next() {
        return Err(unmatched(&open, slide_idx));
    }

    directives.sort_by_key(|d| d.open.seq);
    Ok(directives)
}

fn unmatched(marker: &Marker, slide_idx: usize) -> TemplateError {
    TemplateError::UnmatchedDirective {
        scope: marker.scope,
        marker: marker.raw.clone(),
        location: Location::at(slide_idx, &marker.addr),
    }
}

/// Strips the given markers' text from the slide's paragraphs, preserving
/// all surrounding runs and styles.
pub(crate) fn strip_markers(slide: &mut Slide, markers: &[&Marker]) {
    let mut by_addr: BTreeMap<ParaAddr, Vec<Range<usize>>> = BTreeMap::new();
    for marker in markers {
        by_addr
            .entry(marker.addr)
            .or_default()
            .push(marker.range.clone());
    }
    for (addr, mut ranges) in by_addr {
        ranges.sort_by_key(|r| r.start);
        if let Some(para) = paragraph_mut(slide, &addr) {
            let merged = runs::merge(para);
            para.runs = runs::remove_ranges(&merged, &ranges);
        }
    }
}
