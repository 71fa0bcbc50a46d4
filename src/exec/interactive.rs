//! Interactive cells - notebook-style evaluation
//!
//! A cell is a block of source. Lines starting with the magic marker are
//! directives handed to a `MagicHandler`. When the last line looks like a
//! standalone expression it is evaluated separately and its `repr` appended
//! to the cell's output, the way an interactive prompt echoes values.

use super::ExecutionContext;
use crate::runtime::ExecMode;
use tracing::{debug, trace};

pub const DEFAULT_MAGIC_MARKER: char = '%';

/// What a magic line turns into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagicOutcome {
    /// Source spliced into the cell in place of the magic line
    pub code: Option<String>,
    /// Text added to the cell's output verbatim
    pub inline: Option<String>,
}

impl MagicOutcome {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: Some(code.into()), inline: None }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self { code: None, inline: Some(text.into()) }
    }
}

/// Interprets magic directives (`%directive argument`)
pub trait MagicHandler {
    fn handle(&mut self, directive: &str, argument: &str) -> MagicOutcome;
}

impl<F> MagicHandler for F
where
    F: FnMut(&str, &str) -> MagicOutcome,
{
    fn handle(&mut self, directive: &str, argument: &str) -> MagicOutcome {
        self(directive, argument)
    }
}

/// Handler for hosts without magics
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMagic;

impl MagicHandler for NoMagic {
    fn handle(&mut self, directive: &str, _argument: &str) -> MagicOutcome {
        MagicOutcome::inline(format!("Unknown magic directive: {}", directive))
    }
}

/// Evaluate `input` with the context's magic marker (`%` unless configured)
pub fn run_cell(ctx: &ExecutionContext, input: &str, handler: &mut dyn MagicHandler) -> String {
    run_cell_with(ctx, input, ctx.magic_marker(), handler)
}

/// Evaluate a cell and return everything it produced
///
/// Output order: captured stdout/stderr, then inline magic text, then the
/// trailing expression's `repr` (omitted when it is `None`). An interpreter
/// error stops evaluation; its traceback ends up in the captured text and the
/// inline magic text still follows it.
pub fn run_cell_with(
    ctx: &ExecutionContext,
    input: &str,
    marker: char,
    handler: &mut dyn MagicHandler,
) -> String {
    ctx.capture_output();
    // Anything printed before this cell is not ours
    ctx.drain_output();

    let mut inline = Vec::new();
    let mut lines = Vec::new();
    for line in input.lines() {
        match line.strip_prefix(marker) {
            Some(magic) => {
                let magic = magic.trim();
                let (directive, argument) = magic
                    .split_once(char::is_whitespace)
                    .map_or((magic, ""), |(d, a)| (d, a.trim()));
                trace!(target: "pylambda::exec", directive, "magic line");
                let outcome = handler.handle(directive, argument);
                if let Some(code) = outcome.code {
                    lines.extend(code.lines().map(str::to_string));
                }
                inline.extend(outcome.inline);
            }
            None => lines.push(line.to_string()),
        }
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let tail = match lines.last() {
        Some(last) if is_trailing_expression(ctx, last) => lines.pop(),
        _ => None,
    };

    let body = lines.join("\n");
    if !body.trim().is_empty() {
        match ctx.execute(&body, ExecMode::File, true) {
            Some(result) => ctx.discard(result),
            None => {
                debug!(target: "pylambda::exec", "cell body raised");
                return assemble(ctx.drain_output(), inline, None);
            }
        }
    }

    let mut echoed = None;
    if let Some(tail) = tail {
        match ctx.execute(&tail, ExecMode::Eval, true) {
            Some(value) => {
                echoed = ctx.repr_of(value).filter(|r| r != "None");
                ctx.discard(value);
            }
            None => {
                debug!(target: "pylambda::exec", "cell expression raised");
                return assemble(ctx.drain_output(), inline, None);
            }
        }
    }

    assemble(ctx.drain_output(), inline, echoed)
}

fn assemble(mut out: String, inline: Vec<String>, echoed: Option<String>) -> String {
    for text in inline {
        out.push_str(&text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    if let Some(repr) = echoed {
        out.push_str(&repr);
    }
    out
}

/// Heuristic for "the last line is an expression statement"
///
/// Misses expressions continued from a previous line and accepts the last
/// line of a bracketed multi-line literal when it happens to parse alone.
fn is_trailing_expression(ctx: &ExecutionContext, line: &str) -> bool {
    !line.starts_with(char::is_whitespace)
        && !line.trim_end().ends_with(':')
        && ctx.compiles(line, ExecMode::Eval)
}
