//! Scripted interpreter used by the unit tests
//!
//! Implements `Interpreter` over a small boxed object model plus a tiny
//! expression language: int/float/str literals, lists, names, `+ * % ==`,
//! unary minus, `lambda`, calls, method calls, assignment and `raise`.
//! Builtins: `print`, `len`, `map`, `list`, `str`, `repr`. Native callables
//! built with `new_callable` are invoked through their real `ml_meth`
//! pointer, so calls go through the actual dispatch trampoline.
//!
//! Objects are leaked boxes; nothing is ever freed.

#![allow(dead_code)]

use super::{ArgFormat, BindError, BuildValue, ExecMode, Interpreter, ParsedTuple};
use crate::exec::{OUTPUT_NAME, SHIM_SOURCE};
use crate::ffi::{PyMethodDef, PyObject, PyRef};
use core::ffi::{c_long, CStr};
use core::ptr;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

type P = *mut PyObject;

/// Fake object model
pub(crate) enum Obj {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<P>),
    List(Vec<P>),
    Dict(Mutex<HashMap<String, P>>),
    Namespace(Mutex<HashMap<String, P>>),
    Callable { def: *mut PyMethodDef, slf: P },
    Function { params: Vec<String>, body: Expr },
    Output(Mutex<OutputBuffer>),
    Code,
}

#[derive(Default)]
pub(crate) struct OutputBuffer {
    text: String,
    mark: usize,
}

fn alloc(obj: Obj) -> P {
    Box::into_raw(Box::new(obj)) as P
}

unsafe fn obj<'a>(p: P) -> &'a Obj {
    &*(p as *const Obj)
}

/// Pending exception
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeError {
    pub kind: &'static str,
    pub message: String,
}

impl FakeError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    fn syntax(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }

    fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }
}

static SHARED: Lazy<Arc<FakeInterpreter>> = Lazy::new(|| Arc::new(FakeInterpreter::new()));

/// The fake bound as the process-wide runtime
///
/// Lambda tests go through `runtime::current()` during dispatch, so they all
/// share this one instance.
pub(crate) fn shared() -> Arc<FakeInterpreter> {
    let fake = SHARED.clone();
    super::install(fake.clone());
    fake
}

pub(crate) struct FakeInterpreter {
    main: P,
    builtins: P,
    errors: Mutex<HashMap<ThreadId, FakeError>>,
    sink: Mutex<Option<P>>,
    console: Mutex<String>,
    executed: Mutex<Vec<String>>,
    text_constructor: bool,
}

// Safety: objects are immutable or guarded by their own mutexes, and are
// never freed.
unsafe impl Send for FakeInterpreter {}
unsafe impl Sync for FakeInterpreter {}

impl FakeInterpreter {
    pub fn new() -> Self {
        Self {
            main: alloc(Obj::Dict(Mutex::new(HashMap::new()))),
            builtins: alloc(Obj::Dict(Mutex::new(HashMap::new()))),
            errors: Mutex::new(HashMap::new()),
            sink: Mutex::new(None),
            console: Mutex::new(String::new()),
            executed: Mutex::new(Vec::new()),
            text_constructor: true,
        }
    }

    /// Behaves like a Python 2 image without `PyUnicode_FromString`
    pub fn without_text_constructor() -> Self {
        Self { text_constructor: false, ..Self::new() }
    }

    pub fn int(&self, v: i64) -> P {
        alloc(Obj::Int(v))
    }

    pub fn float(&self, v: f64) -> P {
        alloc(Obj::Float(v))
    }

    pub fn text(&self, v: &str) -> P {
        alloc(Obj::Str(v.to_string()))
    }

    pub fn boolean(&self, v: bool) -> P {
        alloc(Obj::Bool(v))
    }

    pub fn list(&self, items: &[P]) -> P {
        alloc(Obj::List(items.to_vec()))
    }

    pub fn tuple(&self, items: &[P]) -> P {
        alloc(Obj::Tuple(items.to_vec()))
    }

    pub fn namespace(&self) -> P {
        alloc(Obj::Namespace(Mutex::new(HashMap::new())))
    }

    /// Call a callable the way the interpreter would
    pub fn call(&self, callable: P, args: &[P]) -> P {
        match unsafe { self.invoke(callable, args.to_vec()) } {
            Ok(result) => result,
            Err(err) => {
                self.set_error(err);
                ptr::null_mut()
            }
        }
    }

    /// Equivalent of `list(map(callable, values))`
    pub fn map(&self, callable: P, values: &[P]) -> Vec<P> {
        values.iter().map(|v| self.call(callable, &[*v])).collect()
    }

    pub fn repr(&self, p: P) -> String {
        unsafe { repr(p) }
    }

    pub fn take_error(&self) -> Option<FakeError> {
        self.errors.lock().remove(&thread::current().id())
    }

    pub fn pending_error(&self) -> Option<FakeError> {
        self.errors.lock().get(&thread::current().id()).cloned()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Text printed while no output capture was installed
    pub fn console(&self) -> String {
        self.console.lock().clone()
    }

    fn set_error(&self, err: FakeError) {
        self.errors.lock().insert(thread::current().id(), err);
    }

    fn write(&self, text: &str) {
        let sink = *self.sink.lock();
        match sink {
            Some(out) => {
                if let Obj::Output(buffer) = unsafe { obj(out) } {
                    buffer.lock().text.push_str(text);
                }
            }
            None => self.console.lock().push_str(text),
        }
    }

    unsafe fn invoke(&self, callable: P, args: Vec<P>) -> Result<P, FakeError> {
        match obj(callable) {
            Obj::Callable { def, slf } => {
                let meth = (**def)
                    .ml_meth
                    .ok_or_else(|| FakeError::new("SystemError", "callable without entry point"))?;
                let result = meth(*slf, alloc(Obj::Tuple(args)));
                if result.is_null() {
                    Err(self.take_error().unwrap_or_else(|| {
                        FakeError::new("SystemError", "error return without exception set")
                    }))
                } else {
                    Ok(result)
                }
            }
            Obj::Function { params, body } => {
                if params.len() != args.len() {
                    return Err(FakeError::type_error(format!(
                        "<lambda>() takes {} positional arguments but {} were given",
                        params.len(),
                        args.len()
                    )));
                }
                let locals: HashMap<String, P> = params.iter().cloned().zip(args).collect();
                self.eval(body, self.main, &locals)
            }
            _ => Err(FakeError::type_error(format!(
                "'{}' object is not callable",
                type_name(callable)
            ))),
        }
    }

    unsafe fn lookup(&self, name: &str, globals: P, locals: &HashMap<String, P>) -> Option<P> {
        if let Some(v) = locals.get(name) {
            return Some(*v);
        }
        if let Obj::Dict(map) = obj(globals) {
            if let Some(v) = map.lock().get(name) {
                return Some(*v);
            }
        }
        match name {
            "None" => Some(alloc(Obj::None)),
            "True" => Some(alloc(Obj::Bool(true))),
            "False" => Some(alloc(Obj::Bool(false))),
            _ => None,
        }
    }

    unsafe fn eval(&self, expr: &Expr, globals: P, locals: &HashMap<String, P>) -> Result<P, FakeError> {
        match expr {
            Expr::Int(v) => Ok(alloc(Obj::Int(*v))),
            Expr::Float(v) => Ok(alloc(Obj::Float(*v))),
            Expr::Str(v) => Ok(alloc(Obj::Str(v.clone()))),
            Expr::Name(name) => self
                .lookup(name, globals, locals)
                .ok_or_else(|| FakeError::new("NameError", format!("name '{}' is not defined", name))),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e, globals, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(alloc(Obj::List(values)))
            }
            Expr::Neg(inner) => match obj(self.eval(inner, globals, locals)?) {
                Obj::Int(v) => Ok(alloc(Obj::Int(-v))),
                Obj::Float(v) => Ok(alloc(Obj::Float(-v))),
                _ => Err(FakeError::type_error("bad operand type for unary -")),
            },
            Expr::Binary(lhs, op, rhs) => {
                let a = self.eval(lhs, globals, locals)?;
                let b = self.eval(rhs, globals, locals)?;
                binary(a, *op, b)
            }
            Expr::Lambda(params, body) => Ok(alloc(Obj::Function {
                params: params.clone(),
                body: (**body).clone(),
            })),
            Expr::Call(callee, args) => {
                let values = args
                    .iter()
                    .map(|e| self.eval(e, globals, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Expr::Name(name) = &**callee {
                    if self.lookup(name, globals, locals).is_none() {
                        return self.builtin(name, values);
                    }
                }
                let target = self.eval(callee, globals, locals)?;
                self.invoke(target, values)
            }
            Expr::Method(receiver, name, args) => {
                let target = self.eval(receiver, globals, locals)?;
                let values = args
                    .iter()
                    .map(|e| self.eval(e, globals, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                method(target, name, values)
            }
        }
    }

    unsafe fn builtin(&self, name: &str, args: Vec<P>) -> Result<P, FakeError> {
        match name {
            "print" => {
                let line = args.iter().map(|a| str_of(*a)).collect::<Vec<_>>().join(" ");
                self.write(&line);
                self.write("\n");
                Ok(alloc(Obj::None))
            }
            "len" => {
                let [arg] = args[..] else {
                    return Err(FakeError::type_error("len() takes exactly one argument"));
                };
                match obj(arg) {
                    Obj::Str(s) => Ok(alloc(Obj::Int(s.chars().count() as i64))),
                    Obj::List(v) | Obj::Tuple(v) => Ok(alloc(Obj::Int(v.len() as i64))),
                    _ => Err(FakeError::type_error(format!(
                        "object of type '{}' has no len()",
                        type_name(arg)
                    ))),
                }
            }
            "map" => {
                let [f, items] = args[..] else {
                    return Err(FakeError::type_error("map() takes exactly two arguments"));
                };
                let (Obj::List(items) | Obj::Tuple(items)) = obj(items) else {
                    return Err(FakeError::type_error("map() argument is not iterable"));
                };
                let results = items
                    .iter()
                    .map(|item| self.invoke(f, vec![*item]))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(alloc(Obj::List(results)))
            }
            "list" => {
                let [arg] = args[..] else {
                    return Err(FakeError::type_error("list() takes exactly one argument"));
                };
                match obj(arg) {
                    Obj::List(v) | Obj::Tuple(v) => Ok(alloc(Obj::List(v.clone()))),
                    _ => Err(FakeError::type_error("object is not iterable")),
                }
            }
            "str" | "repr" => {
                let [arg] = args[..] else {
                    return Err(FakeError::type_error(format!("{}() takes exactly one argument", name)));
                };
                let text = if name == "str" { str_of(arg) } else { repr(arg) };
                Ok(alloc(Obj::Str(text)))
            }
            _ => Err(FakeError::new("NameError", format!("name '{}' is not defined", name))),
        }
    }

    unsafe fn exec_block(&self, code: &str, globals: P) -> Result<P, FakeError> {
        let statements = parse_block(code)?;
        for statement in &statements {
            match statement {
                Stmt::Assign(name, expr) => {
                    let value = self.eval(expr, globals, &HashMap::new())?;
                    if let Obj::Dict(map) = obj(globals) {
                        map.lock().insert(name.clone(), value);
                    }
                }
                Stmt::Raise(kind, message) => {
                    let kind: &'static str = Box::leak(kind.clone().into_boxed_str());
                    return Err(FakeError::new(kind, message.clone()));
                }
                Stmt::Expr(expr) => {
                    self.eval(expr, globals, &HashMap::new())?;
                }
            }
        }
        Ok(alloc(Obj::None))
    }

    fn install_output(&self, globals: P) -> P {
        let out = alloc(Obj::Output(Mutex::new(OutputBuffer::default())));
        if let Obj::Dict(map) = unsafe { obj(globals) } {
            map.lock().insert(OUTPUT_NAME.to_string(), out);
        }
        *self.sink.lock() = Some(out);
        alloc(Obj::None)
    }
}

impl Default for FakeInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter for FakeInterpreter {
    unsafe fn parse_tuple(&self, args: P, format: ArgFormat) -> Option<ParsedTuple> {
        let Obj::Tuple(items) = obj(args) else {
            self.set_error(FakeError::type_error("argument list must be a tuple"));
            return None;
        };
        if items.len() != format.arity() {
            self.set_error(FakeError::type_error(format!(
                "function takes exactly {} argument{} ({} given)",
                format.arity(),
                if format.arity() == 1 { "" } else { "s" },
                items.len()
            )));
            return None;
        }
        let first = items[0];
        let parsed = match (format, obj(first)) {
            (ArgFormat::Long, Obj::Int(v)) => Some(ParsedTuple::Long(*v as c_long)),
            (ArgFormat::Long, Obj::Bool(v)) => Some(ParsedTuple::Long(c_long::from(*v))),
            (ArgFormat::Double, Obj::Float(v)) => Some(ParsedTuple::Double(*v)),
            (ArgFormat::Double, Obj::Int(v)) => Some(ParsedTuple::Double(*v as f64)),
            (ArgFormat::Text, Obj::Str(v)) => Some(ParsedTuple::Text(v.clone())),
            (ArgFormat::Object | ArgFormat::ObjectPair | ArgFormat::ObjectTriple, _) => {
                let handles: SmallVec<[PyRef; 3]> =
                    items.iter().filter_map(|p| PyRef::from_raw(*p)).collect();
                Some(ParsedTuple::Objects(handles))
            }
            _ => None,
        };
        if parsed.is_none() {
            let expected = match format {
                ArgFormat::Long => "an integer is required",
                ArgFormat::Double => "must be real number",
                _ => "argument 1 must be str",
            };
            self.set_error(FakeError::type_error(format!("{}, not {}", expected, type_name(first))));
        }
        parsed
    }

    unsafe fn build_value(&self, value: BuildValue<'_>) -> P {
        match value {
            BuildValue::None => alloc(Obj::None),
            BuildValue::Long(v) => alloc(Obj::Int(i64::from(v))),
            BuildValue::Double(v) => alloc(Obj::Float(v)),
            BuildValue::Text(v) => alloc(Obj::Str(v.to_string_lossy().into_owned())),
            BuildValue::Bool(v) => alloc(Obj::Bool(v)),
            BuildValue::Object(v) => v.as_ptr(),
        }
    }

    fn new_text(&self, text: &CStr) -> Result<P, BindError> {
        if !self.text_constructor {
            return Err(BindError::IncompatibleVersion { missing: "PyUnicode_FromString" });
        }
        Ok(alloc(Obj::Str(text.to_string_lossy().into_owned())))
    }

    unsafe fn new_callable(&self, def: *mut PyMethodDef, slf: P) -> P {
        alloc(Obj::Callable { def, slf })
    }

    unsafe fn text_of(&self, p: P) -> Option<String> {
        if p.is_null() {
            return None;
        }
        match obj(p) {
            Obj::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    unsafe fn str_of(&self, p: P) -> Option<String> {
        (!p.is_null()).then(|| str_of(p))
    }

    unsafe fn repr_of(&self, p: P) -> Option<String> {
        (!p.is_null()).then(|| repr(p))
    }

    unsafe fn incref(&self, _obj: P) {}

    unsafe fn decref(&self, _obj: P) {}

    fn main_dict(&self) -> P {
        self.main
    }

    fn new_dict(&self) -> P {
        alloc(Obj::Dict(Mutex::new(HashMap::new())))
    }

    fn builtins(&self) -> P {
        self.builtins
    }

    unsafe fn dict_get(&self, dict: P, key: &CStr) -> P {
        match obj(dict) {
            Obj::Dict(map) => map
                .lock()
                .get(key.to_string_lossy().as_ref())
                .copied()
                .unwrap_or(ptr::null_mut()),
            _ => ptr::null_mut(),
        }
    }

    unsafe fn dict_set(&self, dict: P, key: &CStr, value: P) -> bool {
        match obj(dict) {
            Obj::Dict(map) => {
                map.lock().insert(key.to_string_lossy().into_owned(), value);
                true
            }
            _ => {
                self.set_error(FakeError::new("SystemError", "bad argument to internal function"));
                false
            }
        }
    }

    unsafe fn get_attr(&self, target: P, name: &CStr) -> P {
        let name = name.to_string_lossy();
        if let Obj::Namespace(map) = obj(target) {
            if let Some(v) = map.lock().get(name.as_ref()) {
                return *v;
            }
        }
        self.set_error(FakeError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", type_name(target), name),
        ));
        ptr::null_mut()
    }

    unsafe fn set_attr(&self, target: P, name: &CStr, value: P) -> bool {
        match obj(target) {
            Obj::Namespace(map) => {
                map.lock().insert(name.to_string_lossy().into_owned(), value);
                true
            }
            _ => {
                self.set_error(FakeError::new(
                    "AttributeError",
                    format!("'{}' object attribute is read-only", type_name(target)),
                ));
                false
            }
        }
    }

    unsafe fn run_string(&self, code: &CStr, mode: ExecMode, globals: P, _locals: P) -> P {
        let code = code.to_string_lossy().into_owned();
        self.executed.lock().push(code.clone());

        if code == SHIM_SOURCE {
            return self.install_output(globals);
        }

        let result = match mode {
            ExecMode::Eval => {
                parse_expression(&code).and_then(|expr| self.eval(&expr, globals, &HashMap::new()))
            }
            ExecMode::File | ExecMode::Single => self.exec_block(&code, globals),
        };
        match result {
            Ok(value) => value,
            Err(err) => {
                self.set_error(err);
                ptr::null_mut()
            }
        }
    }

    fn compile(&self, code: &CStr, _filename: &CStr, mode: ExecMode) -> P {
        let code = code.to_string_lossy();
        let checked = match mode {
            ExecMode::Eval => parse_expression(&code).map(|_| ()),
            ExecMode::File | ExecMode::Single => parse_block(&code).map(|_| ()),
        };
        match checked {
            Ok(()) => alloc(Obj::Code),
            Err(err) => {
                self.set_error(err);
                ptr::null_mut()
            }
        }
    }

    fn run_simple(&self, code: &CStr) -> bool {
        let result = unsafe { self.run_string(code, ExecMode::File, self.main, self.main) };
        if result.is_null() {
            self.print_error();
            false
        } else {
            true
        }
    }

    fn error_occurred(&self) -> bool {
        self.pending_error().is_some()
    }

    fn print_error(&self) {
        if let Some(err) = self.take_error() {
            self.write(&format!(
                "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\n{}: {}\n",
                err.kind, err.message
            ));
        }
    }

    fn clear_error(&self) {
        self.take_error();
    }

    fn raise_runtime_error(&self, message: &CStr) {
        self.set_error(FakeError::new("RuntimeError", message.to_string_lossy()));
    }

    fn ensure_initialized(&self) {}
}

unsafe fn type_name(p: P) -> &'static str {
    match obj(p) {
        Obj::None => "NoneType",
        Obj::Bool(_) => "bool",
        Obj::Int(_) => "int",
        Obj::Float(_) => "float",
        Obj::Str(_) => "str",
        Obj::Tuple(_) => "tuple",
        Obj::List(_) => "list",
        Obj::Dict(_) => "dict",
        Obj::Namespace(_) => "SimpleNamespace",
        Obj::Callable { .. } => "builtin_function_or_method",
        Obj::Function { .. } => "function",
        Obj::Output(_) => "_PyLambdaOutput",
        Obj::Code => "code",
    }
}

fn float_repr(v: f64) -> String {
    format!("{:?}", v)
}

unsafe fn str_of(p: P) -> String {
    match obj(p) {
        Obj::Str(s) => s.clone(),
        _ => repr(p),
    }
}

unsafe fn repr(p: P) -> String {
    if p.is_null() {
        return "<NULL>".to_string();
    }
    match obj(p) {
        Obj::None => "None".to_string(),
        Obj::Bool(true) => "True".to_string(),
        Obj::Bool(false) => "False".to_string(),
        Obj::Int(v) => v.to_string(),
        Obj::Float(v) => float_repr(*v),
        Obj::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Obj::List(items) => format!("[{}]", items.iter().map(|i| repr(*i)).collect::<Vec<_>>().join(", ")),
        Obj::Tuple(items) if items.len() == 1 => format!("({},)", repr(items[0])),
        Obj::Tuple(items) => format!("({})", items.iter().map(|i| repr(*i)).collect::<Vec<_>>().join(", ")),
        Obj::Dict(map) => format!("{{{} items}}", map.lock().len()),
        Obj::Namespace(_) => "namespace()".to_string(),
        Obj::Callable { def, .. } => {
            let name = CStr::from_ptr((**def).ml_name).to_string_lossy();
            format!("<built-in function {}>", name)
        }
        Obj::Function { .. } => "<function <lambda>>".to_string(),
        Obj::Output(_) => "<_PyLambdaOutput object>".to_string(),
        Obj::Code => "<code object <module>>".to_string(),
    }
}

unsafe fn binary(a: P, op: char, b: P) -> Result<P, FakeError> {
    let value = match (obj(a), op, obj(b)) {
        (Obj::Int(x), '+', Obj::Int(y)) => Obj::Int(x + y),
        (Obj::Int(x), '*', Obj::Int(y)) => Obj::Int(x * y),
        (Obj::Int(x), '%', Obj::Int(y)) => {
            if *y == 0 {
                return Err(FakeError::new("ZeroDivisionError", "integer modulo by zero"));
            }
            Obj::Int(((x % y) + y) % y)
        }
        (Obj::Float(x), '+', Obj::Float(y)) => Obj::Float(x + y),
        (Obj::Float(x), '*', Obj::Float(y)) => Obj::Float(x * y),
        (Obj::Int(x), '+', Obj::Float(y)) | (Obj::Float(y), '+', Obj::Int(x)) => Obj::Float(*x as f64 + y),
        (Obj::Int(x), '*', Obj::Float(y)) | (Obj::Float(y), '*', Obj::Int(x)) => Obj::Float(*x as f64 * y),
        (Obj::Str(x), '+', Obj::Str(y)) => Obj::Str(format!("{}{}", x, y)),
        (_, '=', _) => Obj::Bool(repr(a) == repr(b)),
        _ => {
            return Err(FakeError::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op,
                type_name(a),
                type_name(b)
            )))
        }
    };
    Ok(alloc(value))
}

unsafe fn method(target: P, name: &str, args: Vec<P>) -> Result<P, FakeError> {
    let Obj::Output(buffer) = obj(target) else {
        return Err(FakeError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", type_name(target), name),
        ));
    };
    let mut buffer = buffer.lock();
    let value = match (name, args.as_slice()) {
        ("write", [text]) => {
            let text = str_of(*text);
            buffer.text.push_str(&text);
            Obj::Int(text.len() as i64)
        }
        ("flush", []) => Obj::None,
        ("value", []) => Obj::Str(buffer.text.clone()),
        ("recent", []) => Obj::Str(buffer.text[buffer.mark..].to_string()),
        ("mark", []) => {
            buffer.mark = buffer.text.len();
            Obj::None
        }
        _ => {
            return Err(FakeError::new(
                "AttributeError",
                format!("'_PyLambdaOutput' object has no attribute '{}'", name),
            ))
        }
    };
    Ok(alloc(value))
}

// ---------------------------------------------------------------------------
// Language

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(char),
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    /// `'='` stands for `==`
    Binary(Box<Expr>, char, Box<Expr>),
    Lambda(Vec<String>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Method(Box<Expr>, String, Vec<Expr>),
}

#[derive(Debug, Clone)]
enum Stmt {
    Assign(String, Expr),
    Raise(String, String),
    Expr(Expr),
}

fn tokenize(src: &str) -> Result<Vec<Token>, FakeError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                let v = text.parse().map_err(|_| FakeError::syntax("invalid decimal literal"))?;
                tokens.push(Token::Float(v));
            } else {
                let v = text.parse().map_err(|_| FakeError::syntax("invalid decimal literal"))?;
                tokens.push(Token::Int(v));
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(FakeError::syntax("unterminated string literal")),
                    Some(q) if *q == c => break,
                    Some('\\') => {
                        if let Some(next) = chars.get(i + 1) {
                            text.push(match next {
                                'n' => '\n',
                                other => *other,
                            });
                        }
                        i += 2;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            i += 1;
            tokens.push(Token::Str(text));
        } else if c == '=' && chars.get(i + 1) == Some(&'=') {
            tokens.push(Token::Op('~'));
            i += 2;
        } else if "()[],.+*%:=-".contains(c) {
            tokens.push(Token::Op(c));
            i += 1;
        } else {
            return Err(FakeError::syntax("invalid syntax"));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, op: char) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: char) -> Result<(), FakeError> {
        if self.eat(op) {
            Ok(())
        } else if self.peek().is_none() {
            Err(FakeError::syntax("unexpected EOF while parsing"))
        } else {
            Err(FakeError::syntax("invalid syntax"))
        }
    }

    fn name(&mut self) -> Result<String, FakeError> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Name(n)) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(FakeError::syntax("invalid syntax")),
        }
    }

    fn expr(&mut self) -> Result<Expr, FakeError> {
        if self.peek() == Some(&Token::Name("lambda".into())) {
            self.pos += 1;
            let mut params = Vec::new();
            if !self.eat(':') {
                loop {
                    params.push(self.name()?);
                    if self.eat(':') {
                        break;
                    }
                    self.expect(',')?;
                }
            }
            let body = self.expr()?;
            return Ok(Expr::Lambda(params, Box::new(body)));
        }
        let lhs = self.sum()?;
        if self.eat('~') {
            let rhs = self.sum()?;
            return Ok(Expr::Binary(Box::new(lhs), '=', Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<Expr, FakeError> {
        let mut lhs = self.term()?;
        while self.eat('+') {
            let rhs = self.term()?;
            lhs = Expr::Binary(Box::new(lhs), '+', Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FakeError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat('*') {
                '*'
            } else if self.eat('%') {
                '%'
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FakeError> {
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, FakeError> {
        let mut target = self.atom()?;
        loop {
            if self.eat('(') {
                let args = self.args(')')?;
                target = Expr::Call(Box::new(target), args);
            } else if self.eat('.') {
                let name = self.name()?;
                self.expect('(')?;
                let args = self.args(')')?;
                target = Expr::Method(Box::new(target), name, args);
            } else {
                return Ok(target);
            }
        }
    }

    fn args(&mut self, close: char) -> Result<Vec<Expr>, FakeError> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(close) {
                return Ok(args);
            }
            self.expect(',')?;
        }
    }

    fn atom(&mut self) -> Result<Expr, FakeError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| FakeError::syntax("unexpected EOF while parsing"))?;
        self.pos += 1;
        match token {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Float(v) => Ok(Expr::Float(v)),
            Token::Str(v) => Ok(Expr::Str(v)),
            Token::Name(n) if n == "lambda" || n == "raise" => Err(FakeError::syntax("invalid syntax")),
            Token::Name(n) => Ok(Expr::Name(n)),
            Token::Op('(') => {
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            Token::Op('[') => Ok(Expr::List(self.args(']')?)),
            Token::Op(_) => Err(FakeError::syntax("invalid syntax")),
        }
    }

    fn finish(&self) -> Result<(), FakeError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(FakeError::syntax("invalid syntax"))
        }
    }
}

fn parse_expression(code: &str) -> Result<Expr, FakeError> {
    let mut parser = Parser { tokens: tokenize(code.trim())?, pos: 0 };
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

fn parse_statement(line: &str) -> Result<Stmt, FakeError> {
    let tokens = tokenize(line)?;
    match tokens.as_slice() {
        [Token::Name(kw), Token::Name(kind), ..] if kw == "raise" => {
            let message = line.split_once(kind.as_str()).map(|(_, m)| m.trim()).unwrap_or("");
            let message = message.trim_start_matches('(').trim_end_matches(')').trim_matches('\'');
            Ok(Stmt::Raise(kind.clone(), message.to_string()))
        }
        [Token::Name(name), Token::Op('='), ..] => {
            let mut parser = Parser { tokens: tokens[2..].to_vec(), pos: 0 };
            let expr = parser.expr()?;
            parser.finish()?;
            Ok(Stmt::Assign(name.clone(), expr))
        }
        _ => {
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expr()?;
            parser.finish()?;
            Ok(Stmt::Expr(expr))
        }
    }
}

fn parse_block(code: &str) -> Result<Vec<Stmt>, FakeError> {
    let mut statements = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            return Err(FakeError::new("IndentationError", "unexpected indent"));
        }
        if trimmed.ends_with(':') {
            return Err(FakeError::syntax("compound statements are not supported"));
        }
        statements.push(parse_statement(trimmed)?);
    }
    Ok(statements)
}
