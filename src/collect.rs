//! Static variable collection: which names does this template need?
//!
//! Walks the whole document without resolving or mutating anything, merges
//! paragraph text per slide, and asks the evaluator for the free variable
//! names, including names referenced only by structural directive
//! expressions. Undefined names are exactly what gets reported, never an
//! error; syntactically malformed template text does raise.

use std::collections::BTreeSet;

use crate::error::TemplateResult;
use crate::eval::Evaluator;
use crate::model::{Document, Shape, Slide};
use crate::scanner::{self, Location};

/// Root variable names referenced anywhere in the document, as a set.
pub(crate) fn undeclared_variables(
    doc: &Document,
    evaluator: &Evaluator,
) -> TemplateResult<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for (idx, slide) in doc.slides.iter().enumerate() {
        let text = slide_template_text(slide);
        if !scanner::has_template_syntax(&text) {
            continue;
        }
        let vars = evaluator.undeclared_variables(&text, &Location::slide(idx))?;
        names.extend(vars);
    }
    Ok(names)
}

/// All paragraph text on the slide joined into one parseable template:
/// structural markers are rewritten to their unprefixed inline form so
/// open/close pairs living in different paragraphs still balance, and loop
/// variables they bind are not reported as free.
fn slide_template_text(slide: &Slide) -> String {
    let mut parts = Vec::new();
    for shape in &slide.shapes {
        match shape {
            Shape::TextBox(frame) => {
                parts.extend(frame.paragraphs.iter().map(|p| p.text()));
            }
            Shape::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        parts.extend(cell.frame.paragraphs.iter().map(|p| p.text()));
                    }
                }
            }
            Shape::Picture(picture) => {
                if let Some(caption) = &picture.caption {
                    parts.extend(caption.paragraphs.iter().map(|p| p.text()));
                }
            }
        }
    }
    scanner::neutralize_structural_markers(&parts.join("\n"))
}
