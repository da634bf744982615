use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::collect;
use crate::context::Context;
use crate::error::{TemplateError, TemplateResult};
use crate::eval::Evaluator;
use crate::model::Document;
use crate::{render, resolver};

/// A loaded document template: the document tree plus the expression
/// evaluator it renders with.
///
/// Rendering runs ordered passes over the tree, in place: slide resolution
/// (loop expansion and conditional removal), then shape, row, cell, and
/// paragraph resolution, then inline text substitution. A render call
/// either completes every pass or returns the first error encountered;
/// templates are single-shot, so reload the document to render again with
/// different data.
///
/// # Examples
///
/// ```
/// use decktpl::{Context, DeckTemplate, Document, Shape, Slide, TextFrame};
///
/// let doc = Document::new(vec![Slide::new(vec![Shape::TextBox(
///     TextFrame::from_text("Hello, {{ name }}!"),
/// )])]);
///
/// let mut template = DeckTemplate::new(doc);
/// let mut context = Context::new();
/// context.insert("name", "World");
///
/// template.render(&context).unwrap();
/// assert_eq!(template.document().slides[0].text(), "Hello, World!");
/// ```
#[derive(Debug)]
pub struct DeckTemplate {
    doc: Document,
    evaluator: Evaluator,
}

impl DeckTemplate {
    /// Wraps a document tree with a default evaluator.
    pub fn new(doc: Document) -> Self {
        Self::with_evaluator(doc, Evaluator::new())
    }

    /// Wraps a document tree with a caller-configured evaluator (custom
    /// filters, globals, ...).
    pub fn with_evaluator(mut doc: Document, evaluator: Evaluator) -> Self {
        doc.stamp_provenance();
        Self { doc, evaluator }
    }

    /// Reads a document tree from its serialized JSON form.
    ///
    /// The crate speaks JSON at the container seam; reading and writing the
    /// real presentation package (archive plus XML parts) is the container
    /// layer's concern, outside this crate.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::InvalidDocument`] if the stream is not a
    /// valid document tree.
    pub fn load<R: Read>(reader: R) -> TemplateResult<Self> {
        let doc: Document = serde_json::from_reader(reader)
            .map_err(|err| TemplateError::InvalidDocument(err.to_string()))?;
        Ok(Self::new(doc))
    }

    /// Reads a serialized document tree from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> TemplateResult<Self> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file))
    }

    /// Renders the document in place against `context`.
    ///
    /// # Errors
    ///
    /// * [`TemplateError::UnmatchedDirective`]: a structural open marker
    ///   has no close (or vice versa) within its scope.
    /// * [`TemplateError::Expression`]: the evaluator rejected template
    ///   text, at parse time or during evaluation.
    ///
    /// On error the document should be discarded: structural passes may
    /// already have run. A document whose slide-scope markers fail to pair
    /// is reported before any mutation.
    pub fn render(&mut self, context: &Context) -> TemplateResult<()> {
        debug!(slides = self.doc.slides.len(), "render: slide pass");
        let mut states = resolver::slide_pass(&mut self.doc.slides, context, &self.evaluator)?;
        debug!(slides = states.len(), "render: shape pass");
        for state in &mut states {
            resolver::shape_pass(state, &self.evaluator)?;
        }
        debug!("render: row pass");
        for state in &mut states {
            resolver::row_pass(state, &self.evaluator)?;
        }
        debug!("render: cell pass");
        for state in &mut states {
            resolver::cell_pass(state, &self.evaluator)?;
        }
        debug!("render: paragraph pass");
        for state in &mut states {
            resolver::paragraph_pass(state, &self.evaluator)?;
        }
        debug!("render: inline pass");
        for state in &mut states {
            render::inline_pass(state, &self.evaluator)?;
        }
        self.doc.slides = states.into_iter().map(|s| s.slide).collect();
        Ok(())
    }

    /// Serializes the document tree as JSON.
    pub fn save<W: Write>(&self, writer: W) -> TemplateResult<()> {
        serde_json::to_writer(writer, &self.doc)
            .map_err(|err| TemplateError::InvalidDocument(err.to_string()))
    }

    /// Serializes the document tree to a file path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> TemplateResult<()> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))
    }

    /// Root variable names referenced anywhere in the document, without
    /// substituting anything.
    ///
    /// Undefined names are the point, not an error; syntactically malformed
    /// template text does raise.
    ///
    /// # Examples
    ///
    /// ```
    /// use decktpl::{DeckTemplate, Document, Shape, Slide, TextFrame};
    ///
    /// let doc = Document::new(vec![Slide::new(vec![Shape::TextBox(
    ///     TextFrame::from_text("{{ title }}: {{ metrics.revenue }}"),
    /// )])]);
    /// let template = DeckTemplate::new(doc);
    ///
    /// let vars = template.undeclared_variables().unwrap();
    /// assert!(vars.contains("title"));
    /// assert!(vars.contains("metrics"));
    /// ```
    pub fn undeclared_variables(&self) -> TemplateResult<BTreeSet<String>> {
        collect::undeclared_variables(&self.doc, &self.evaluator)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// The evaluator, for registering filters or globals after
    /// construction.
    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }
}
