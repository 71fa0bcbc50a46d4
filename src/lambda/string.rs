//! String lambdas - interpreter-side lambdas written as source text
//!
//! `"x: x * 2"` becomes the global `lmbstrN = lambda x: x * 2`, defined on
//! first use and read back from the namespace afterwards.

use super::LambdaError;
use crate::exec::ExecutionContext;
use crate::ffi::PyRef;
use crate::registry::LambdaId;
use crate::runtime::ExecMode;
use once_cell::sync::OnceCell;
use tracing::debug;

const INTRODUCER: &str = "lambda";

/// Source text of an interpreter lambda, without the `lambda` keyword
#[derive(Debug)]
pub struct StringLambda {
    source: String,
    global: OnceCell<LambdaId>,
}

impl StringLambda {
    /// Validate `source` (`"params: body"`)
    pub fn new(source: impl Into<String>) -> Result<Self, LambdaError> {
        let source = source.into();
        let text = source.trim_start();

        if let Some(rest) = text.strip_prefix(INTRODUCER) {
            let at_boundary = rest
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            if at_boundary {
                return Err(LambdaError::IntroducerKeyword);
            }
        }
        if !text.contains(':') {
            return Err(LambdaError::MissingSeparator);
        }

        Ok(Self { source, global: OnceCell::new() })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Global name once the lambda has been defined
    pub fn global_name(&self) -> Option<&LambdaId> {
        self.global.get()
    }

    /// The interpreter function object, defining it in `ctx` on first use
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<PyRef, LambdaError> {
        let name = self.global.get_or_try_init(|| self.define(ctx))?;
        ctx.get_global(name.as_str())
            .ok_or_else(|| LambdaError::Evaluation(format!("global {} is not defined", name)))
    }

    fn define(&self, ctx: &ExecutionContext) -> Result<LambdaId, LambdaError> {
        let name = LambdaId::next_string_lambda();
        let statement = format!("{} = {} {}", name, INTRODUCER, self.source.trim());
        let result = ctx
            .execute(&statement, ExecMode::File, false)
            .ok_or_else(|| LambdaError::Evaluation(format!("could not evaluate lambda {}", self.source)))?;
        ctx.discard(result);
        debug!(target: "pylambda::lambda", name = %name, "string lambda defined");
        Ok(name)
    }
}
