use thiserror::Error;

use crate::scanner::Location;

pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// The scope a structural directive operates at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Slide,
    Shape,
    Row,
    Cell,
    Paragraph,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slide => write!(f, "slide"),
            Self::Shape => write!(f, "sp"),
            Self::Row => write!(f, "tr"),
            Self::Cell => write!(f, "tc"),
            Self::Paragraph => write!(f, "pp"),
        }
    }
}

/// Errors raised while rendering a document template.
///
/// A render call surfaces the first error encountered and aborts; the
/// document may have been partially mutated by earlier passes and should be
/// discarded by the caller.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A structural open marker has no matching close (or vice versa)
    /// within its scope.
    #[error("unmatched {{%{scope} {marker}%}} at {location}")]
    UnmatchedDirective {
        scope: Scope,
        /// The raw marker body, e.g. `for item in items` or `endif`.
        marker: String,
        location: Location,
    },

    /// The expression evaluator rejected template text, either at parse
    /// time or during evaluation.
    #[error("expression error at {location}: {message} (in {source_text:?})")]
    Expression {
        /// The offending template text as it appeared in the document.
        source_text: String,
        location: Location,
        message: String,
    },

    /// The document tree could not be loaded or is not well-formed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
