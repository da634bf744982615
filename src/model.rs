//! The owned document tree: Document → Slide → Shape → Paragraph → Run,
//! with Table → Row → Cell on the table branch.
//!
//! Every node exclusively owns its children, so structural templating is
//! plain `Vec` surgery plus `Clone` for subtree duplication. The tree
//! round-trips through serde; the format-specific container layer that
//! produces and consumes it lives outside this crate.

use serde::{Deserialize, Serialize};

/// An opaque bag of formatting attributes attached to a run.
///
/// Every field is optional; `None` means "inherit whatever the surrounding
/// context provides". When a run is split during rendering its style is
/// copied verbatim, so substituted text keeps the placeholder's formatting
/// unless a [`RichText`](crate::RichText) segment overrides it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    /// Hex color string such as `FF0000`. A leading `#` is tolerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Font family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

impl Style {
    /// Layers `self` on top of `base`: set fields win, unset fields fall
    /// through to the base style.
    pub fn merged_over(&self, base: &Self) -> Self {
        Self {
            bold: self.bold.or(base.bold),
            italic: self.italic.or(base.italic),
            underline: self.underline.or(base.underline),
            color: self.color.clone().or_else(|| base.color.clone()),
            size: self.size.or(base.size),
            font: self.font.clone().or_else(|| base.font.clone()),
        }
    }

    /// True when no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.color.is_none()
            && self.size.is_none()
            && self.font.is_none()
    }
}

/// The smallest unit of styled text: an atomic (text, style) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    #[serde(default)]
    pub style: Style,
}

impl Run {
    pub fn new<T: Into<String>>(text: T, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain<T: Into<String>>(text: T) -> Self {
        Self::new(text, Style::default())
    }

    /// A run holding exactly one newline. The container layer serializes
    /// such runs as explicit line-break elements rather than literal text.
    pub fn line_break(style: Style) -> Self {
        Self::new("\n", style)
    }

    pub fn is_line_break(&self) -> bool {
        self.text == "\n"
    }
}

/// An ordered run sequence. Concatenating the runs' text in order yields the
/// paragraph's logical text exactly: no gaps, no overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-run paragraph with default styling.
    pub fn from_text<T: Into<String>>(text: T) -> Self {
        Self {
            runs: vec![Run::plain(text)],
        }
    }

    /// The paragraph's logical text, reconstructed across run boundaries.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// A plain text container: an ordered sequence of paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    pub paragraphs: Vec<Paragraph>,
}

impl TextFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// One paragraph per line of `text`.
    pub fn from_text<T: AsRef<str>>(text: T) -> Self {
        Self {
            paragraphs: text.as_ref().lines().map(Paragraph::from_text).collect(),
        }
    }

    /// All paragraph text joined with newlines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A table cell owning one text frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub frame: TextFrame,
}

impl Cell {
    pub fn from_text<T: AsRef<str>>(text: T) -> Self {
        Self {
            frame: TextFrame::from_text(text),
        }
    }

    pub fn text(&self) -> String {
        self.frame.text()
    }
}

/// An ordered sequence of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn from_texts<T: AsRef<str>>(texts: &[T]) -> Self {
        Self {
            cells: texts.iter().map(Cell::from_text).collect(),
        }
    }
}

/// Rows plus a column-width grid.
///
/// The grid is not content-aware: row and cell mutation during rendering
/// leaves `column_widths` untouched, and a cell conditional can leave rows
/// with uneven cell counts. Any visual grid adjustment is the caller's
/// responsibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Row>,
    #[serde(default)]
    pub column_widths: Vec<u32>,
}

/// A picture with an optional text caption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    /// Identifier of the image in the external container (file name,
    /// relationship id, ...). Opaque to the engine.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<TextFrame>,
}

/// A slide-level content element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    TextBox(TextFrame),
    Table(Table),
    Picture(Picture),
}

/// An ordered sequence of shapes plus provenance metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub shapes: Vec<Shape>,
    /// Index of the template slide this slide came from. Stamped at load
    /// time and copied onto clones, so directive search can be scoped to
    /// "all text on this slide" with a stable identity.
    #[serde(default)]
    pub source_index: usize,
}

impl Slide {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self {
            shapes,
            source_index: 0,
        }
    }

    /// All text on the slide (text boxes, table cells, picture captions)
    /// joined with spaces, in document order. Convenience for assertions
    /// and debugging, not used by the render passes.
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        for shape in &self.shapes {
            match shape {
                Shape::TextBox(frame) => parts.push(frame.text()),
                Shape::Table(table) => {
                    for row in &table.rows {
                        for cell in &row.cells {
                            parts.push(cell.text());
                        }
                    }
                }
                Shape::Picture(picture) => {
                    if let Some(caption) = &picture.caption {
                        parts.push(caption.text());
                    }
                }
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

/// An ordered sequence of slides.
///
/// The tree is mutated in place through the ordered render passes (slide,
/// shape, row, cell, paragraph, inline) and no structural entity survives
/// across two render invocations; callers wanting template reuse must
/// reload the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub slides: Vec<Slide>,
}

impl Document {
    pub fn new(slides: Vec<Slide>) -> Self {
        let mut doc = Self { slides };
        doc.stamp_provenance();
        doc
    }

    /// Re-stamp `source_index` on every slide from its current position.
    /// Called once at construction/load; clones made during rendering keep
    /// the template slide's stamp.
    pub(crate) fn stamp_provenance(&mut self) {
        for (idx, slide) in self.slides.iter_mut().enumerate() {
            slide.source_index = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_text_concatenates_runs_in_order() {
        let para = Paragraph {
            runs: vec![
                Run::plain("Hello, "),
                Run::new(
                    "World",
                    Style {
                        bold: Some(true),
                        ..Style::default()
                    },
                ),
                Run::plain("!"),
            ],
        };
        assert_eq!(para.text(), "Hello, World!");
    }

    #[test]
    fn style_merge_overrides_win() {
        let base = Style {
            bold: Some(true),
            color: Some("000000".into()),
            size: Some(18.0),
            ..Style::default()
        };
        let patch = Style {
            color: Some("FF0000".into()),
            ..Style::default()
        };
        let merged = patch.merged_over(&base);
        assert_eq!(merged.bold, Some(true));
        assert_eq!(merged.color.as_deref(), Some("FF0000"));
        assert_eq!(merged.size, Some(18.0));
    }

    #[test]
    fn document_stamps_source_indices() {
        let doc = Document::new(vec![Slide::default(), Slide::default()]);
        assert_eq!(doc.slides[0].source_index, 0);
        assert_eq!(doc.slides[1].source_index, 1);
    }
}
