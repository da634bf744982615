//! Structural directive resolution: the slide, shape, row, cell, and
//! paragraph passes.
//!
//! Each pass scans its scope for matched directive pairs, evaluates the
//! condition or iterable through the expression evaluator, and performs the
//! tree surgery (subtree cloning for loops, pruning for false conditionals,
//! cell-range collapse for `{%tc if%}`) before any text-level rendering
//! happens. Marker text is always stripped from the output, whether the
//! gated content survives or not.
//!
//! Loop expansion binds a child context per clone (the loop variable plus
//! the `loop` synthetics); those contexts ride alongside the cloned
//! subtrees in [`SlideState`] so the later passes and the inline render
//! see the bindings accumulated on the path from the document root.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use minijinja::Value;
use tracing::debug;

use crate::context::{Context, LoopState};
use crate::error::{Scope, TemplateError, TemplateResult};
use crate::eval::Evaluator;
use crate::model::{Cell, Row, Shape, Slide};
use crate::runs;
use crate::scanner::{self, Directive, Location, Marker, ParaAddr};

/// A slide surviving the slide pass, with the context its content must be
/// rendered against and, after the row pass, per-row contexts for its
/// tables (keyed by shape index).
pub(crate) struct SlideState {
    pub slide: Slide,
    pub ctx: Context,
    pub row_ctxs: HashMap<usize, Vec<Context>>,
}

impl SlideState {
    fn new(slide: Slide, ctx: Context) -> Self {
        Self {
            slide,
            ctx,
            row_ctxs: HashMap::new(),
        }
    }

    /// The context governing one row of one table shape.
    pub(crate) fn row_ctx(&self, shape_idx: usize, row_idx: usize) -> &Context {
        self.row_ctxs
            .get(&shape_idx)
            .and_then(|rows| rows.get(row_idx))
            .unwrap_or(&self.ctx)
    }
}

/// The slide pass: expands `{%slide for%}` template slides into zero or
/// more bound clones and removes slides gated by a false `{%slide if%}`.
///
/// Every slide is scanned (and pairing validated) before any slide is
/// touched, so a scanner error never leaves the document half-mutated.
pub(crate) fn slide_pass(
    slides: &mut Vec<Slide>,
    base: &Context,
    evaluator: &Evaluator,
) -> TemplateResult<Vec<SlideState>> {
    let mut scanned = Vec::with_capacity(slides.len());
    for (idx, slide) in slides.iter().enumerate() {
        let markers = scanner::slide_markers(slide, idx, Scope::Slide)?;
        scanned.push(scanner::pair(markers, idx)?);
    }

    let mut states = Vec::with_capacity(slides.len());
    for (idx, (mut slide, directives)) in slides.drain(..).zip(scanned).enumerate() {
        let refs: Vec<&Marker> = directives
            .iter()
            .flat_map(|d| [&d.open, &d.close])
            .collect();
        scanner::strip_markers(&mut slide, &refs);

        let loops: Vec<&Directive> = directives
            .iter()
            .filter(|d| d.loop_parts().is_some())
            .collect();
        let conditions: Vec<&Directive> =
            directives.iter().filter(|d| d.condition().is_some()).collect();

        if loops.is_empty() {
            if conditions_hold(&conditions, base, evaluator, idx)? {
                states.push(SlideState::new(slide, base.clone()));
            } else {
                debug!(slide = idx, "conditional removed slide");
            }
            continue;
        }

        // Each loop pair expands independently against the same original
        // slide; clones land at the template slide's position in marker
        // order. Conditionals are re-checked inside every iteration's own
        // context.
        for directive in &loops {
            let (var, iterable) = directive.loop_parts().expect("filtered on loop_parts");
            let location = Location::at(idx, &directive.open.addr);
            let items = iterate(evaluator, iterable, base, &location)?;
            let length = items.len();
            debug!(slide = idx, iterable, clones = length, "expanding slide loop");
            for (index0, item) in items.into_iter().enumerate() {
                let ctx = base.with_loop_binding(var, item, &LoopState::new(index0, length));
                if conditions_hold(&conditions, &ctx, evaluator, idx)? {
                    states.push(SlideState::new(slide.clone(), ctx));
                }
            }
        }
    }
    Ok(states)
}

/// The shape pass: removes shapes gated by a false `{%sp if%}`. The pair
/// spans a contiguous run of shapes, bounded by the shapes holding the
/// open and close markers (inclusive); a true condition strips only the
/// marker text. Runs before the row pass, so conditions see the slide
/// context only.
pub(crate) fn shape_pass(state: &mut SlideState, evaluator: &Evaluator) -> TemplateResult<()> {
    let slide_idx = state.slide.source_index;
    let markers = scanner::slide_markers(&state.slide, slide_idx, Scope::Shape)?;
    let directives = scanner::pair(markers, slide_idx)?;
    if directives.is_empty() {
        return Ok(());
    }

    let refs: Vec<&Marker> = directives
        .iter()
        .flat_map(|d| [&d.open, &d.close])
        .collect();
    scanner::strip_markers(&mut state.slide, &refs);

    let mut dead: BTreeSet<usize> = BTreeSet::new();
    for directive in &directives {
        let condition = directive
            .condition()
            .expect("shape markers only pair as conditionals");
        let location = Location::at(slide_idx, &directive.open.addr);
        if evaluator
            .eval_expression(condition, &state.ctx, &location)?
            .is_true()
        {
            continue;
        }
        debug!(
            slide = slide_idx,
            open = directive.open.addr.shape,
            close = directive.close.addr.shape,
            "shape conditional removed shapes"
        );
        dead.extend(directive.open.addr.shape..=directive.close.addr.shape);
    }

    if !dead.is_empty() {
        let mut idx = 0;
        state.slide.shapes.retain(|_| {
            let keep = !dead.contains(&idx);
            idx += 1;
            keep
        });
    }
    Ok(())
}

/// The row pass: expands `{%tr for%}` rows and removes rows gated by a
/// false `{%tr if%}`, per table, within one resolved slide. A `{%tr%}`
/// pair whose open and close sit in different rows is unmatched by
/// construction, since pairing is per row.
pub(crate) fn row_pass(state: &mut SlideState, evaluator: &Evaluator) -> TemplateResult<()> {
    let slide_idx = state.slide.source_index;
    let slide_ctx = state.ctx.clone();

    for shape_idx in 0..state.slide.shapes.len() {
        let Shape::Table(table) = &mut state.slide.shapes[shape_idx] else {
            continue;
        };

        let rows = std::mem::take(&mut table.rows);
        let mut scanned = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            let markers = scanner::row_markers(row, slide_idx, shape_idx, row_idx, Scope::Row)?;
            scanned.push(scanner::pair(markers, slide_idx)?);
        }

        let mut new_rows = Vec::with_capacity(rows.len());
        let mut new_ctxs = Vec::with_capacity(rows.len());
        for (row, directives) in rows.into_iter().zip(scanned) {
            resolve_row(
                row,
                &directives,
                &slide_ctx,
                evaluator,
                slide_idx,
                &mut new_rows,
                &mut new_ctxs,
            )?;
        }
        table.rows = new_rows;
        state.row_ctxs.insert(shape_idx, new_ctxs);
    }
    Ok(())
}

fn resolve_row(
    mut row: Row,
    directives: &[Directive],
    slide_ctx: &Context,
    evaluator: &Evaluator,
    slide_idx: usize,
    out_rows: &mut Vec<Row>,
    out_ctxs: &mut Vec<Context>,
) -> TemplateResult<()> {
    let refs: Vec<&Marker> = directives
        .iter()
        .flat_map(|d| [&d.open, &d.close])
        .collect();
    strip_row_markers(&mut row, &refs);

    let loops: Vec<&Directive> = directives
        .iter()
        .filter(|d| d.loop_parts().is_some())
        .collect();
    let conditions: Vec<&Directive> =
        directives.iter().filter(|d| d.condition().is_some()).collect();

    if loops.is_empty() {
        if conditions_hold(&conditions, slide_ctx, evaluator, slide_idx)? {
            out_rows.push(row);
            out_ctxs.push(slide_ctx.clone());
        }
        return Ok(());
    }

    for directive in &loops {
        let (var, iterable) = directive.loop_parts().expect("filtered on loop_parts");
        let location = Location::at(slide_idx, &directive.open.addr);
        let items = iterate(evaluator, iterable, slide_ctx, &location)?;
        let length = items.len();
        debug!(slide = slide_idx, iterable, clones = length, "expanding row loop");
        for (index0, item) in items.into_iter().enumerate() {
            let ctx = slide_ctx.with_loop_binding(var, item, &LoopState::new(index0, length));
            if conditions_hold(&conditions, &ctx, evaluator, slide_idx)? {
                out_rows.push(row.clone());
                out_ctxs.push(ctx);
            }
        }
    }
    Ok(())
}

/// The cell pass: `{%tc if%}` gates a contiguous run of cells within one
/// row. A false condition removes the cells strictly between the two
/// marker cells and collapses the marker cells into one; a true condition
/// strips only the marker text. Row cell counts may end up uneven across
/// rows; that is accepted layout risk, not an engine error. The
/// column-width grid is left untouched.
pub(crate) fn cell_pass(state: &mut SlideState, evaluator: &Evaluator) -> TemplateResult<()> {
    let slide_idx = state.slide.source_index;

    for shape_idx in 0..state.slide.shapes.len() {
        let row_count = match &state.slide.shapes[shape_idx] {
            Shape::Table(table) => table.rows.len(),
            Shape::TextBox(_) | Shape::Picture(_) => continue,
        };

        for row_idx in 0..row_count {
            let ctx = state.row_ctx(shape_idx, row_idx).clone();
            let Shape::Table(table) = &mut state.slide.shapes[shape_idx] else {
                continue;
            };
            let row = &mut table.rows[row_idx];

            let markers = scanner::row_markers(row, slide_idx, shape_idx, row_idx, Scope::Cell)?;
            let mut directives = scanner::pair(markers, slide_idx)?;

            // Directive spans within a row never overlap; resolving from
            // the rightmost span leftwards keeps cell indices, and marker
            // offsets in shared boundary cells, stable while content is
            // removed.
            directives.sort_by_key(|d| {
                std::cmp::Reverse((d.open.addr.cell, d.open.addr.para, d.open.range.start))
            });
            for directive in &directives {
                resolve_cell_range(row, directive, &ctx, evaluator, slide_idx)?;
            }
        }
    }
    Ok(())
}

fn resolve_cell_range(
    row: &mut Row,
    directive: &Directive,
    ctx: &Context,
    evaluator: &Evaluator,
    slide_idx: usize,
) -> TemplateResult<()> {
    let condition = directive
        .condition()
        .expect("tc markers only pair as conditionals");
    let location = Location::at(slide_idx, &directive.open.addr);
    let keep = evaluator
        .eval_expression(condition, ctx, &location)?
        .is_true();

    let open_cell = directive.open.addr.cell.expect("cell marker has cell index");
    let close_cell = directive.close.addr.cell.expect("cell marker has cell index");

    // Both markers in one cell: no cells are removed; a false condition
    // removes the gated text along with the markers.
    if open_cell == close_cell {
        let cell = &mut row.cells[open_cell];
        let open_para = directive.open.addr.para;
        let close_para = directive.close.addr.para;
        if keep {
            if open_para == close_para {
                strip_cell_ranges(
                    cell,
                    open_para,
                    &[directive.open.range.clone(), directive.close.range.clone()],
                );
            } else {
                strip_cell_ranges(cell, open_para, &[directive.open.range.clone()]);
                strip_cell_ranges(cell, close_para, &[directive.close.range.clone()]);
            }
        } else if open_para == close_para {
            strip_cell_ranges(
                cell,
                open_para,
                &[directive.open.range.start..directive.close.range.end],
            );
        } else {
            cut_paragraph(cell, open_para, directive.open.range.start, usize::MAX);
            cut_paragraph(cell, close_para, 0, directive.close.range.end);
            if close_para > open_para + 1 {
                cell.frame.paragraphs.drain(open_para + 1..close_para);
            }
        }
        return Ok(());
    }

    strip_cell_ranges(
        &mut row.cells[open_cell],
        directive.open.addr.para,
        &[directive.open.range.clone()],
    );
    strip_cell_ranges(
        &mut row.cells[close_cell],
        directive.close.addr.para,
        &[directive.close.range.clone()],
    );

    if keep {
        return Ok(());
    }

    debug!(
        slide = slide_idx,
        open = open_cell,
        close = close_cell,
        "cell conditional collapsed range"
    );
    // Merge the close cell's remaining content into the open cell, then
    // drop everything from the first interior cell through the close cell.
    let close_content = std::mem::take(&mut row.cells[close_cell].frame.paragraphs);
    row.cells[open_cell].frame.paragraphs.extend(close_content);
    row.cells.drain(open_cell + 1..=close_cell);
    Ok(())
}

/// The paragraph pass: removes whole paragraphs gated by a false
/// `{%pp if%}`. The pair spans the paragraphs holding the open and close
/// markers (inclusive) and must sit within one text frame; a pair whose
/// markers live in different frames is unmatched by construction. Runs
/// after the cell pass, so conditions inside table cells see their row
/// context.
pub(crate) fn paragraph_pass(state: &mut SlideState, evaluator: &Evaluator) -> TemplateResult<()> {
    let slide_idx = state.slide.source_index;
    let markers = scanner::slide_markers(&state.slide, slide_idx, Scope::Paragraph)?;
    let directives = scanner::pair(markers, slide_idx)?;
    if directives.is_empty() {
        return Ok(());
    }

    for directive in &directives {
        let (open, close) = (&directive.open.addr, &directive.close.addr);
        if (open.shape, open.row, open.cell, open.caption)
            != (close.shape, close.row, close.cell, close.caption)
        {
            return Err(TemplateError::UnmatchedDirective {
                scope: Scope::Paragraph,
                marker: directive.open.raw.clone(),
                location: Location::at(slide_idx, open),
            });
        }
    }

    let refs: Vec<&Marker> = directives
        .iter()
        .flat_map(|d| [&d.open, &d.close])
        .collect();
    scanner::strip_markers(&mut state.slide, &refs);

    // Dead paragraph indices, grouped per frame, resolved in one sweep so
    // removals never shift another directive's addresses.
    let mut dead: BTreeMap<ParaAddr, BTreeSet<usize>> = BTreeMap::new();
    for directive in &directives {
        let condition = directive
            .condition()
            .expect("paragraph markers only pair as conditionals");
        let addr = directive.open.addr;
        let ctx = match addr.row {
            Some(row) => state.row_ctx(addr.shape, row).clone(),
            None => state.ctx.clone(),
        };
        let location = Location::at(slide_idx, &addr);
        if evaluator.eval_expression(condition, &ctx, &location)?.is_true() {
            continue;
        }
        debug!(
            slide = slide_idx,
            shape = addr.shape,
            "paragraph conditional removed paragraphs"
        );
        dead.entry(ParaAddr { para: 0, ..addr })
            .or_default()
            .extend(addr.para..=directive.close.addr.para);
    }

    for (addr, paras) in dead {
        if let Some(frame) = scanner::frame_mut(&mut state.slide, &addr) {
            let mut idx = 0;
            frame.paragraphs.retain(|_| {
                let keep = !paras.contains(&idx);
                idx += 1;
                keep
            });
        }
    }
    Ok(())
}

/// Removes `start..end` of one paragraph's merged text, clamped to the
/// paragraph length.
fn cut_paragraph(cell: &mut Cell, para_idx: usize, start: usize, end: usize) {
    if let Some(para) = cell.frame.paragraphs.get_mut(para_idx) {
        let merged = runs::merge(para);
        let end = end.min(merged.text.len());
        if start < end {
            para.runs = runs::remove_ranges(&merged, &[start..end]);
        }
    }
}

fn strip_cell_ranges(cell: &mut Cell, para_idx: usize, ranges: &[Range<usize>]) {
    if let Some(para) = cell.frame.paragraphs.get_mut(para_idx) {
        let merged = runs::merge(para);
        let mut sorted = ranges.to_vec();
        sorted.sort_by_key(|r| r.start);
        para.runs = runs::remove_ranges(&merged, &sorted);
    }
}

fn strip_row_markers(row: &mut Row, markers: &[&Marker]) {
    let mut by_para: HashMap<(usize, usize), Vec<Range<usize>>> = HashMap::new();
    for marker in markers {
        let cell = marker.addr.cell.expect("row marker has cell index");
        by_para
            .entry((cell, marker.addr.para))
            .or_default()
            .push(marker.range.clone());
    }
    for ((cell_idx, para_idx), ranges) in by_para {
        if let Some(cell) = row.cells.get_mut(cell_idx) {
            strip_cell_ranges(cell, para_idx, &ranges);
        }
    }
}

fn conditions_hold(
    conditions: &[&Directive],
    ctx: &Context,
    evaluator: &Evaluator,
    slide_idx: usize,
) -> TemplateResult<bool> {
    for directive in conditions {
        let condition = directive.condition().expect("filtered on condition");
        let location = Location::at(slide_idx, &directive.open.addr);
        if !evaluator.eval_expression(condition, ctx, &location)?.is_true() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluates a loop's iterable expression and materializes its items. An
/// empty result is defined removal behavior, not an error.
fn iterate(
    evaluator: &Evaluator,
    iterable: &str,
    ctx: &Context,
    location: &Location,
) -> TemplateResult<Vec<Value>> {
    let value = evaluator.eval_expression(iterable, ctx, location)?;
    let iter = value
        .try_iter()
        .map_err(|err| TemplateError::Expression {
            source_text: iterable.to_string(),
            location: location.clone(),
            message: err.to_string(),
        })?;
    Ok(iter.collect())
}
