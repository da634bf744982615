mod collect;
mod context;
mod engine;
mod error;
mod eval;
mod model;
mod render;
mod resolver;
mod richtext;
mod runs;
mod scanner;

// Public exports.
pub use context::Context;
pub use engine::DeckTemplate;
pub use error::{Scope, TemplateError, TemplateResult};
pub use eval::Evaluator;
pub use model::{
    Cell, Document, Paragraph, Picture, Row, Run, Shape, Slide, Style, Table, TextFrame,
};
pub use richtext::RichText;
pub use scanner::Location;
