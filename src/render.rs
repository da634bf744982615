//! The inline render pass: merge → evaluate → resplit, per paragraph.
//!
//! Runs after all three structural passes, over every surviving
//! text-bearing leaf, with the context accumulated on the path from the
//! document root (base bindings plus any loop variables bound by enclosing
//! structural directives). Evaluator failures propagate with the offending
//! text and leaf location; this pass does not suppress them.

use tracing::trace;

use crate::context::Context;
use crate::error::TemplateResult;
use crate::eval::Evaluator;
use crate::model::{Paragraph, Shape};
use crate::resolver::SlideState;
use crate::runs;
use crate::scanner::{self, Location};

/// Renders every paragraph of one resolved slide in place.
pub(crate) fn inline_pass(state: &mut SlideState, evaluator: &Evaluator) -> TemplateResult<()> {
    let slide_idx = state.slide.source_index;
    let slide_ctx = state.ctx.clone();

    for shape_idx in 0..state.slide.shapes.len() {
        match &mut state.slide.shapes[shape_idx] {
            Shape::TextBox(frame) => {
                for (para_idx, para) in frame.paragraphs.iter_mut().enumerate() {
                    let location = Location {
                        slide: Some(slide_idx),
                        shape: Some(shape_idx),
                        paragraph: Some(para_idx),
                        ..Location::default()
                    };
                    render_paragraph(para, &slide_ctx, evaluator, &location)?;
                }
            }
            Shape::Picture(picture) => {
                if let Some(caption) = &mut picture.caption {
                    for (para_idx, para) in caption.paragraphs.iter_mut().enumerate() {
                        let location = Location {
                            slide: Some(slide_idx),
                            shape: Some(shape_idx),
                            paragraph: Some(para_idx),
                            ..Location::default()
                        };
                        render_paragraph(para, &slide_ctx, evaluator, &location)?;
                    }
                }
            }
            Shape::Table(_) => {}
        }

        // Tables carry per-row contexts from the row pass; split borrow of
        // the context table and the rows themselves.
        let row_ctxs = state.row_ctxs.get(&shape_idx).cloned();
        let Shape::Table(table) = &mut state.slide.shapes[shape_idx] else {
            continue;
        };
        for (row_idx, row) in table.rows.iter_mut().enumerate() {
            let ctx = row_ctxs
                .as_ref()
                .and_then(|ctxs| ctxs.get(row_idx))
                .unwrap_or(&slide_ctx);
            for (cell_idx, cell) in row.cells.iter_mut().enumerate() {
                for (para_idx, para) in cell.frame.paragraphs.iter_mut().enumerate() {
                    let location = Location {
                        slide: Some(slide_idx),
                        shape: Some(shape_idx),
                        row: Some(row_idx),
                        cell: Some(cell_idx),
                        paragraph: Some(para_idx),
                    };
                    render_paragraph(para, ctx, evaluator, &location)?;
                }
            }
        }
    }
    Ok(())
}

/// Merges the paragraph's runs, renders the merged text, and re-splits the
/// result back into runs. Paragraphs without template syntax are skipped.
fn render_paragraph(
    paragraph: &mut Paragraph,
    ctx: &Context,
    evaluator: &Evaluator,
    location: &Location,
) -> TemplateResult<()> {
    let merged = runs::merge(paragraph);
    if !scanner::has_template_syntax(&merged.text) {
        return Ok(());
    }
    trace!(%location, text = %merged.text, "rendering paragraph");
    let rendered = evaluator.render(&merged.text, ctx, location)?;
    paragraph.runs = runs::resplit(&merged, &rendered);
    Ok(())
}
