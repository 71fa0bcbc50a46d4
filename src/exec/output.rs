//! Output capture - an interpreter-side buffer behind `sys.stdout`/`sys.stderr`
//!
//! The buffer keeps a mark; `recent()` returns what was written since the
//! last `mark()`, `value()` everything.

use super::ExecutionContext;
use crate::runtime::ExecMode;
use tracing::{debug, warn};

/// Global the buffer is bound to
pub const OUTPUT_NAME: &str = "__pylambda_output__";

/// Installs the buffer in the executing namespace and redirects both streams
pub const SHIM_SOURCE: &str = "\
import sys as _pylambda_sys

class _PyLambdaOutput:
    def __init__(self):
        self._chunks = []
        self._mark = 0

    def write(self, text):
        self._chunks.append(text)
        return len(text)

    def flush(self):
        pass

    def value(self):
        return ''.join(self._chunks)

    def recent(self):
        return ''.join(self._chunks[self._mark:])

    def mark(self):
        self._mark = len(self._chunks)

__pylambda_output__ = _PyLambdaOutput()
_pylambda_sys.stdout = __pylambda_output__
_pylambda_sys.stderr = __pylambda_output__
";

/// Install the buffer unless the namespace already has one
///
/// Another context over the same namespace may have installed it; running the
/// shim again would replace it and lose undrained output.
pub(super) fn install(ctx: &ExecutionContext) -> bool {
    if ctx.get_global(OUTPUT_NAME).is_some() {
        debug!(target: "pylambda::exec", "output capture already installed in this namespace");
        return true;
    }
    match ctx.execute(SHIM_SOURCE, ExecMode::File, true) {
        Some(result) => {
            ctx.discard(result);
            debug!(target: "pylambda::exec", "output capture installed");
            true
        }
        None => {
            warn!(target: "pylambda::exec", "output capture could not be installed");
            false
        }
    }
}

/// Text since the last mark, then move the mark to the end
pub(super) fn drain(ctx: &ExecutionContext) -> String {
    let text = read(ctx, "recent");
    if let Some(result) = ctx.execute(&format!("{}.mark()", OUTPUT_NAME), ExecMode::File, false) {
        ctx.discard(result);
    }
    text
}

pub(super) fn all(ctx: &ExecutionContext) -> String {
    read(ctx, "value")
}

fn read(ctx: &ExecutionContext, method: &str) -> String {
    let Some(result) = ctx.execute(&format!("{}.{}()", OUTPUT_NAME, method), ExecMode::Eval, false) else {
        return String::new();
    };
    let text = ctx.str_of(result).unwrap_or_default();
    ctx.discard(result);
    text
}
