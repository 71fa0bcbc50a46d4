//! pylambda - host closures as native callables in an embedded Python
//!
//! Closures are registered under generated identifiers and exposed to the
//! interpreter as builtin functions that all share one C trampoline. The
//! trampoline looks the identifier up, converts arguments, runs the closure
//! and converts the result back.
//!
//! ```no_run
//! use pylambda::{Config, Lambda};
//!
//! let session = pylambda::init(&Config::discover())?;
//! let mut double = Lambda::new(|x: i64| x * 2)?;
//! if let Some(callable) = double.object() {
//!     session.set_global("double", callable);
//! }
//! let value = session.run("list(map(double, [1, 2, 3]))", pylambda::ExecMode::Eval);
//! double.release();
//! # Ok::<(), pylambda::Error>(())
//! ```

// Interpreter surface
pub mod ffi;
pub mod runtime;

// Closure plumbing
pub mod lambda;
pub mod marshal;
pub mod registry;

// Running source in the interpreter
pub mod exec;

// Ambient
pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use exec::{run_cell, ExecutionContext, MagicHandler, MagicOutcome, NoMagic};
pub use ffi::PyRef;
pub use lambda::{with_scoped_release, Lambda, LambdaError, StringLambda};
pub use logging::{init_dev_logging, init_logging, LogConfig, LogFormat, LogOutput};
pub use marshal::{Arguments, InputKind, OutputKind, Returned, Shape};
pub use registry::{DispatchStats, LambdaId};
pub use runtime::{BindError, ExecMode, Interpreter};

use std::ops::Deref;
use tracing_appender::non_blocking::WorkerGuard;

/// What `init` sets up
///
/// Dereferences to the `__main__` execution context. Holds the log writer's
/// guard when `init` installed the global subscriber; buffered log events are
/// flushed when the session is dropped.
pub struct Session {
    context: ExecutionContext,
    log_guard: Option<WorkerGuard>,
}

impl Session {
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Whether this session owns the global log subscriber
    pub fn owns_logging(&self) -> bool {
        self.log_guard.is_some()
    }

    pub fn into_parts(self) -> (ExecutionContext, Option<WorkerGuard>) {
        (self.context, self.log_guard)
    }
}

impl Deref for Session {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        &self.context
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("owns_logging", &self.owns_logging())
            .finish()
    }
}

/// Apply `config`: start logging, bind the interpreter and open its `__main__`
/// namespace
///
/// Logging is left alone when the host already installed a subscriber.
pub fn init(config: &Config) -> Result<Session> {
    let log_guard = logging::init_logging(config.logging.to_log_config()?);
    runtime::load(&config.runtime)?;
    let context = ExecutionContext::main()?
        .show_errors(config.runtime.show_errors)
        .with_magic_marker(config.interactive.magic_marker);
    tracing::debug!(target: "pylambda::runtime", ?context, "session ready");
    Ok(Session { context, log_guard })
}
