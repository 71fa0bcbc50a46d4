//! Runtime binding - the embedded interpreter's native surface
//!
//! Architecture:
//! - `library.rs` - Dynamic library loading (dlopen/LoadLibrary)
//! - `api.rs` - Function-pointer table resolved from a loaded CPython image
//! - `Interpreter` - the seam every other module talks to
//!
//! Binding is a one-time, process-wide step. The first successful `bind` or
//! `install` wins; later calls are no-ops.

mod api;
mod library;

#[cfg(test)]
pub(crate) mod fake;


pub use api::PythonApi;
pub use library::{Library, LoadError, SymbolError};

use crate::config::RuntimeConfig;
use crate::ffi::{PyMethodDef, PyObject, PyRef};
use core::ffi::{c_long, CStr};
use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable naming the interpreter library to load
pub const LIBRARY_ENV: &str = "PYLAMBDA_LIBRARY";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &[
    "libpython3.dylib",
    "libpython3.13.dylib",
    "libpython3.12.dylib",
    "libpython3.11.dylib",
    "libpython3.10.dylib",
    "/Library/Frameworks/Python.framework/Versions/Current/Python",
];

#[cfg(windows)]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["python3.dll", "python313.dll", "python312.dll", "python311.dll"];

#[cfg(not(any(target_os = "macos", windows)))]
const DEFAULT_LIBRARY_NAMES: &[&str] = &[
    "libpython3.so",
    "libpython3.13.so.1.0",
    "libpython3.12.so.1.0",
    "libpython3.11.so.1.0",
    "libpython3.10.so.1.0",
];

/// Process-wide bound interpreter
static RUNTIME: OnceCell<Arc<dyn Interpreter>> = OnceCell::new();

/// Argument tuple format codes understood by `PyArg_ParseTuple`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgFormat {
    Long,
    Double,
    Text,
    Object,
    ObjectPair,
    ObjectTriple,
}

impl ArgFormat {
    /// Format string passed to the interpreter
    pub const fn code(self) -> &'static CStr {
        match self {
            Self::Long => c"l",
            Self::Double => c"d",
            Self::Text => c"s",
            Self::Object => c"O",
            Self::ObjectPair => c"OO",
            Self::ObjectTriple => c"OOO",
        }
    }

    /// Number of positional arguments the code consumes
    pub const fn arity(self) -> usize {
        match self {
            Self::ObjectPair => 2,
            Self::ObjectTriple => 3,
            _ => 1,
        }
    }
}

/// Host-side view of a successfully parsed argument tuple
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTuple {
    Long(c_long),
    Double(f64),
    Text(String),
    /// Borrowed handles, in call order
    Objects(SmallVec<[PyRef; 3]>),
}

/// Host value to turn into a new interpreter reference
#[derive(Debug, Clone, Copy)]
pub enum BuildValue<'a> {
    None,
    Long(c_long),
    Double(f64),
    Text(&'a CStr),
    Bool(bool),
    Object(PyRef),
}

/// Start symbols for `PyRun_String` / `Py_CompileString`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExecMode {
    /// One interactive statement (`Py_single_input`)
    Single = 256,
    /// A block of statements (`Py_file_input`)
    File = 257,
    /// One expression (`Py_eval_input`)
    Eval = 258,
}

impl ExecMode {
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Native surface of the embedded interpreter
///
/// Pointers returned by the `*_value`, `new_*`, `run_string`, `compile` and
/// `get_attr` methods are new references; `dict_get` returns a borrowed one.
/// A null return means the interpreter has an error pending.
///
/// # Safety
/// Implementations are called with raw interpreter pointers. Callers must hold
/// the interpreter lock and pass live objects.
pub trait Interpreter: Send + Sync {
    /// Unpack `args` with the format code; `None` leaves a `TypeError` pending
    unsafe fn parse_tuple(&self, args: *mut PyObject, format: ArgFormat) -> Option<ParsedTuple>;

    unsafe fn build_value(&self, value: BuildValue<'_>) -> *mut PyObject;

    /// Construct a text object. Requires interpreter major version 3.
    fn new_text(&self, text: &CStr) -> Result<*mut PyObject, BindError>;

    /// Build a native callable whose `self` slot is `slf`
    unsafe fn new_callable(&self, def: *mut PyMethodDef, slf: *mut PyObject) -> *mut PyObject;

    /// UTF-8 contents of a text object
    unsafe fn text_of(&self, obj: *mut PyObject) -> Option<String>;

    unsafe fn str_of(&self, obj: *mut PyObject) -> Option<String>;

    unsafe fn repr_of(&self, obj: *mut PyObject) -> Option<String>;

    unsafe fn incref(&self, obj: *mut PyObject);

    unsafe fn decref(&self, obj: *mut PyObject);

    /// Namespace dict of `__main__` (borrowed)
    fn main_dict(&self) -> *mut PyObject;

    fn new_dict(&self) -> *mut PyObject;

    /// Builtins dict of the current frame (borrowed)
    fn builtins(&self) -> *mut PyObject;

    unsafe fn dict_get(&self, dict: *mut PyObject, key: &CStr) -> *mut PyObject;

    unsafe fn dict_set(&self, dict: *mut PyObject, key: &CStr, value: *mut PyObject) -> bool;

    unsafe fn get_attr(&self, obj: *mut PyObject, name: &CStr) -> *mut PyObject;

    unsafe fn set_attr(&self, obj: *mut PyObject, name: &CStr, value: *mut PyObject) -> bool;

    unsafe fn run_string(
        &self,
        code: &CStr,
        mode: ExecMode,
        globals: *mut PyObject,
        locals: *mut PyObject,
    ) -> *mut PyObject;

    /// Compile without running; null plus a pending `SyntaxError` on failure
    fn compile(&self, code: &CStr, filename: &CStr, mode: ExecMode) -> *mut PyObject;

    /// Run in `__main__`, printing any error. Returns success.
    fn run_simple(&self, code: &CStr) -> bool;

    fn error_occurred(&self) -> bool;

    /// Print the pending error to `sys.stderr` and clear it
    fn print_error(&self);

    fn clear_error(&self);

    fn raise_runtime_error(&self, message: &CStr);

    /// Start the interpreter if the host process has not done so
    fn ensure_initialized(&self);
}

/// Install an interpreter as the process-wide runtime
///
/// Returns `false` (and leaves the existing runtime in place) when one is
/// already bound.
pub fn install(interpreter: Arc<dyn Interpreter>) -> bool {
    let mut installed = false;
    RUNTIME.get_or_init(|| {
        installed = true;
        interpreter
    });
    if installed {
        info!(target: "pylambda::runtime", "interpreter runtime bound");
    } else {
        debug!(target: "pylambda::runtime", "runtime already bound; install ignored");
    }
    installed
}

/// Resolve the interpreter's entry points from `library` and bind them
///
/// Idempotent: once a runtime is bound the library is dropped unused.
pub fn bind(library: Library) -> Result<(), BindError> {
    if RUNTIME.get().is_some() {
        debug!(target: "pylambda::runtime", library = library.name(), "runtime already bound");
        return Ok(());
    }
    let api = PythonApi::resolve(library)?;
    install(Arc::new(api));
    Ok(())
}

/// The bound runtime
pub fn current() -> Result<Arc<dyn Interpreter>, BindError> {
    RUNTIME.get().cloned().ok_or(BindError::NotBound)
}

pub fn is_bound() -> bool {
    RUNTIME.get().is_some()
}

/// Locate, bind and (optionally) initialize the interpreter described by `config`
///
/// Library lookup order: `config.library`, `$PYLAMBDA_LIBRARY`, then the
/// platform's usual shared-library names.
pub fn load(config: &RuntimeConfig) -> Result<Arc<dyn Interpreter>, BindError> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.clone());
    }

    bind(open_library(config)?)?;
    let runtime = current()?;
    if config.initialize {
        runtime.ensure_initialized();
    }
    Ok(runtime)
}

fn open_library(config: &RuntimeConfig) -> Result<Library, BindError> {
    if let Some(path) = &config.library {
        return Library::load_path(path).map_err(BindError::Load);
    }

    if let Ok(path) = std::env::var(LIBRARY_ENV) {
        return Library::load_path(&path).map_err(BindError::Load);
    }

    let mut tried = Vec::with_capacity(DEFAULT_LIBRARY_NAMES.len());
    for name in DEFAULT_LIBRARY_NAMES {
        match Library::load(name) {
            Ok(library) => return Ok(library),
            Err(err) => {
                debug!(target: "pylambda::runtime", library = name, error = %err, "candidate rejected");
                tried.push((*name).to_string());
            }
        }
    }
    warn!(target: "pylambda::runtime", "no interpreter library found");
    Err(BindError::NoLibrary(tried))
}

/// Runtime binding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The interpreter image could not be opened
    Load(LoadError),
    /// No candidate library could be opened
    NoLibrary(Vec<String>),
    /// A required entry point is absent
    MissingSymbol(&'static str),
    /// The interpreter predates an entry point this crate needs
    IncompatibleVersion { missing: &'static str },
    /// Nothing has been bound yet
    NotBound,
}

impl core::fmt::Display for BindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "{}", err),
            Self::NoLibrary(tried) => {
                write!(f, "No interpreter library found (tried: {})", tried.join(", "))
            }
            Self::MissingSymbol(name) => write!(f, "Required interpreter symbol missing: {}", name),
            Self::IncompatibleVersion { missing } => write!(
                f,
                "Interpreter runtime too old: {} unavailable (Python 3 required)",
                missing
            ),
            Self::NotBound => write!(f, "Interpreter runtime not bound"),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoadError> for BindError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}
