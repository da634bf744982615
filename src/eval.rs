//! The expression evaluator seam.
//!
//! The engine does not implement an expression language; it hands template
//! text to a MiniJinja environment and consumes the result. [`Evaluator`]
//! owns that environment and maps its errors onto
//! [`TemplateError::Expression`] with the offending text and tree location
//! attached.

use std::collections::HashSet;

use minijinja::{Environment, Value};

use crate::context::Context;
use crate::error::{TemplateError, TemplateResult};
use crate::scanner::Location;

/// Wraps a `minijinja::Environment` configured for document rendering.
///
/// The environment is exposed so callers can register custom filters,
/// functions, or globals before rendering:
///
/// ```
/// use decktpl::Evaluator;
///
/// let mut evaluator = Evaluator::new();
/// evaluator
///     .environment_mut()
///     .add_filter("shout", |s: String| s.to_uppercase());
/// ```
#[derive(Debug)]
pub struct Evaluator {
    env: Environment<'static>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// The underlying MiniJinja environment.
    pub fn environment(&self) -> &Environment<'static> {
        &self.env
    }

    /// Mutable access to the underlying MiniJinja environment.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    /// Renders `template` against `context`, reporting failures at
    /// `location`.
    pub(crate) fn render(
        &self,
        template: &str,
        context: &Context,
        location: &Location,
    ) -> TemplateResult<String> {
        self.env
            .render_str(template, context.to_value())
            .map_err(|err| expression_error(template, location, &err))
    }

    /// Evaluates a bare expression (a structural directive's condition or
    /// iterable) against `context`.
    pub(crate) fn eval_expression(
        &self,
        expr: &str,
        context: &Context,
        location: &Location,
    ) -> TemplateResult<Value> {
        let compiled = self
            .env
            .compile_expression(expr)
            .map_err(|err| expression_error(expr, location, &err))?;
        compiled
            .eval(context.to_value())
            .map_err(|err| expression_error(expr, location, &err))
    }

    /// Root-level variable names referenced by `template` (dotted or
    /// indexed access only contributes its root name). Raises on
    /// syntactically malformed template text.
    pub(crate) fn undeclared_variables(
        &self,
        template: &str,
        location: &Location,
    ) -> TemplateResult<HashSet<String>> {
        let parsed = self
            .env
            .template_from_str(template)
            .map_err(|err| expression_error(template, location, &err))?;
        Ok(parsed.undeclared_variables(false))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn expression_error(source_text: &str, location: &Location, err: &minijinja::Error) -> TemplateError {
    TemplateError::Expression {
        source_text: source_text.to_string(),
        location: location.clone(),
        message: err.to_string(),
    }
}
