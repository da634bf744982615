//! Multi-segment styled values.
//!
//! A [`RichText`] is a context value that, when substituted into a
//! placeholder, is lowered into one run per segment instead of a single run
//! inheriting the placeholder's style. It travels through the expression
//! evaluator as an ordinary string: segments are encoded with Unicode
//! private-use sentinels that the resplit step decodes back into styled
//! runs. Document text never contains these sentinels, so the encoding
//! cannot collide with literal content.

use crate::model::Style;

/// Opens an encoded segment; followed by the segment's style as JSON.
pub(crate) const SEG_OPEN: char = '\u{E000}';
/// Separates the style JSON from the segment text.
pub(crate) const SEG_MID: char = '\u{E001}';
/// Closes an encoded segment.
pub(crate) const SEG_CLOSE: char = '\u{E002}';

/// Styled text built from (text, style) segments.
///
/// Each segment's style is an override set: fields left `None` inherit the
/// placeholder run's original formatting, set fields win.
///
/// # Example
///
/// ```
/// use decktpl::{Context, RichText, Style};
///
/// let mut summary = RichText::new(
///     "Up 12%",
///     Style {
///         bold: Some(true),
///         color: Some("1A7F37".into()),
///         ..Style::default()
///     },
/// );
/// summary.add(" since last quarter", Style::default());
///
/// let mut context = Context::new();
/// context.insert("summary", summary);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichText {
    segments: Vec<(String, Style)>,
}

impl RichText {
    /// A rich text value with one initial segment.
    pub fn new<T: Into<String>>(text: T, style: Style) -> Self {
        let mut rich = Self::default();
        rich.add(text, style);
        rich
    }

    /// Appends a segment. Chainable.
    ///
    /// Empty segments are dropped so they cannot produce stray empty runs.
    pub fn add<T: Into<String>>(&mut self, text: T, style: Style) -> &mut Self {
        let text = text.into();
        if !text.is_empty() {
            self.segments.push((text, style));
        }
        self
    }

    pub fn segments(&self) -> &[(String, Style)] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The sentinel-delimited form handed to the expression evaluator.
    pub(crate) fn encode(&self) -> String {
        let mut out = String::new();
        for (text, style) in &self.segments {
            let style_json =
                serde_json::to_string(style).expect("style serializes to JSON");
            out.push(SEG_OPEN);
            out.push_str(&style_json);
            out.push(SEG_MID);
            out.push_str(text);
            out.push(SEG_CLOSE);
        }
        out
    }
}

impl From<RichText> for minijinja::Value {
    fn from(rich: RichText) -> Self {
        Self::from(rich.encode())
    }
}

impl From<&RichText> for minijinja::Value {
    fn from(rich: &RichText) -> Self {
        Self::from(rich.encode())
    }
}

/// One decoded piece of rendered output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Piece {
    /// Ordinary rendered text; inherits styling from the original runs.
    Plain(String),
    /// A rich text segment carrying explicit style overrides.
    Styled { text: String, style: Style },
}

/// Splits rendered text into plain stretches and decoded rich segments.
///
/// A sentinel sequence whose style payload does not parse is passed through
/// as plain text, payload included.
pub(crate) fn decode_pieces(rendered: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut plain = String::new();
    let mut rest = rendered;

    while let Some(open) = rest.find(SEG_OPEN) {
        plain.push_str(&rest[..open]);
        let after_open = &rest[open + SEG_OPEN.len_utf8()..];

        let Some((mid, close)) = segment_bounds(after_open) else {
            // Unterminated sentinel; emit literally.
            plain.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let style_json = &after_open[..mid];
        let text = &after_open[mid + SEG_MID.len_utf8()..close];
        rest = &after_open[close + SEG_CLOSE.len_utf8()..];

        match serde_json::from_str::<Style>(style_json) {
            Ok(style) => {
                if !plain.is_empty() {
                    pieces.push(Piece::Plain(std::mem::take(&mut plain)));
                }
                if !text.is_empty() {
                    pieces.push(Piece::Styled {
                        text: text.to_string(),
                        style,
                    });
                }
            }
            Err(_) => {
                plain.push_str(style_json);
                plain.push_str(text);
            }
        }
    }

    plain.push_str(rest);
    if !plain.is_empty() || pieces.is_empty() {
        pieces.push(Piece::Plain(plain));
    }
    pieces
}

fn segment_bounds(after_open: &str) -> Option<(usize, usize)> {
    let mid = after_open.find(SEG_MID)?;
    let close_rel = after_open[mid..].find(SEG_CLOSE)?;
    Some((mid, mid + close_rel))
}
