//! CPython entry-point table
//!
//! Every function pointer is resolved once, by name, from the loaded image.
//! Calls go straight through the table with no further lookup.

use super::{ArgFormat, BindError, BuildValue, ExecMode, Interpreter, Library, ParsedTuple};
use crate::ffi::{PyMethodDef, PyObject, PyRef};
use core::ffi::{c_char, c_int, c_long, CStr};
use core::ptr;
use smallvec::smallvec;
use tracing::{debug, warn};

type ParseTupleFn = unsafe extern "C" fn(*mut PyObject, *const c_char, ...) -> c_int;
type BuildValueFn = unsafe extern "C" fn(*const c_char, ...) -> *mut PyObject;
type TextFromObjectFn = unsafe extern "C" fn(*mut PyObject) -> *const c_char;
type ObjectFromTextFn = unsafe extern "C" fn(*const c_char) -> *mut PyObject;
type BoolFromLongFn = unsafe extern "C" fn(c_long) -> *mut PyObject;
type NewCallableFn =
    unsafe extern "C" fn(*mut PyMethodDef, *mut PyObject, *mut PyObject) -> *mut PyObject;
type RunStringFn =
    unsafe extern "C" fn(*const c_char, c_int, *mut PyObject, *mut PyObject) -> *mut PyObject;
type VoidFn = unsafe extern "C" fn();
type ObjectFn = unsafe extern "C" fn() -> *mut PyObject;
type UnaryFn = unsafe extern "C" fn(*mut PyObject) -> *mut PyObject;
type RefcountFn = unsafe extern "C" fn(*mut PyObject);
type GetItemStringFn = unsafe extern "C" fn(*mut PyObject, *const c_char) -> *mut PyObject;
type SetItemStringFn = unsafe extern "C" fn(*mut PyObject, *const c_char, *mut PyObject) -> c_int;
type CompileStringFn = unsafe extern "C" fn(*const c_char, *const c_char, c_int) -> *mut PyObject;
type RunSimpleFn = unsafe extern "C" fn(*const c_char) -> c_int;
type SetStringFn = unsafe extern "C" fn(*mut PyObject, *const c_char);
type IsInitializedFn = unsafe extern "C" fn() -> c_int;

/// Resolved CPython C API
pub struct PythonApi {
    parse_tuple: ParseTupleFn,
    build_value: BuildValueFn,
    unicode_as_utf8: TextFromObjectFn,
    unicode_from_string: Option<ObjectFromTextFn>,
    bool_from_long: BoolFromLongFn,
    cfunction_new: NewCallableFn,
    run_string: RunStringFn,
    err_print: VoidFn,
    err_clear: VoidFn,
    err_occurred: ObjectFn,
    err_set_string: SetStringFn,
    exc_runtime_error: *const *mut PyObject,
    dict_get_item_string: GetItemStringFn,
    dict_set_item_string: SetItemStringFn,
    dict_new: ObjectFn,
    eval_get_builtins: ObjectFn,
    import_add_module: ObjectFromTextFn,
    module_get_dict: UnaryFn,
    object_get_attr_string: GetItemStringFn,
    object_set_attr_string: SetItemStringFn,
    object_str: UnaryFn,
    object_repr: UnaryFn,
    incref: RefcountFn,
    decref: RefcountFn,
    compile_string: CompileStringFn,
    run_simple_string: RunSimpleFn,
    is_initialized: IsInitializedFn,
    initialize: VoidFn,
    // Keeps every pointer above valid
    library: Library,
}

// Safety: the table is immutable after resolution and the library stays
// loaded for its lifetime. Calls through it follow the interpreter's own
// locking rules.
unsafe impl Send for PythonApi {}
unsafe impl Sync for PythonApi {}

macro_rules! required {
    ($library:expr, $name:literal) => {{
        let ptr = $library
            .symbol($name)
            .map_err(|_| BindError::MissingSymbol($name))?;
        // Safety: the symbol is the documented C API entry point of that name.
        unsafe { core::mem::transmute::<*const (), _>(ptr) }
    }};
}

impl PythonApi {
    /// Resolve the full table from `library`
    pub fn resolve(library: Library) -> Result<Self, BindError> {
        let unicode_from_string = match library.symbol("PyUnicode_FromString") {
            // Safety: documented C API entry point.
            Ok(ptr) => Some(unsafe { core::mem::transmute::<*const (), ObjectFromTextFn>(ptr) }),
            Err(_) => {
                warn!(
                    target: "pylambda::runtime",
                    library = library.name(),
                    "PyUnicode_FromString missing; lambdas unavailable on this runtime"
                );
                None
            }
        };

        let exc_runtime_error = library
            .symbol("PyExc_RuntimeError")
            .map_err(|_| BindError::MissingSymbol("PyExc_RuntimeError"))?
            as *const *mut PyObject;

        let api = Self {
            parse_tuple: required!(library, "PyArg_ParseTuple"),
            build_value: required!(library, "Py_BuildValue"),
            unicode_as_utf8: required!(library, "PyUnicode_AsUTF8"),
            unicode_from_string,
            bool_from_long: required!(library, "PyBool_FromLong"),
            cfunction_new: required!(library, "PyCFunction_NewEx"),
            run_string: required!(library, "PyRun_String"),
            err_print: required!(library, "PyErr_Print"),
            err_clear: required!(library, "PyErr_Clear"),
            err_occurred: required!(library, "PyErr_Occurred"),
            err_set_string: required!(library, "PyErr_SetString"),
            exc_runtime_error,
            dict_get_item_string: required!(library, "PyDict_GetItemString"),
            dict_set_item_string: required!(library, "PyDict_SetItemString"),
            dict_new: required!(library, "PyDict_New"),
            eval_get_builtins: required!(library, "PyEval_GetBuiltins"),
            import_add_module: required!(library, "PyImport_AddModule"),
            module_get_dict: required!(library, "PyModule_GetDict"),
            object_get_attr_string: required!(library, "PyObject_GetAttrString"),
            object_set_attr_string: required!(library, "PyObject_SetAttrString"),
            object_str: required!(library, "PyObject_Str"),
            object_repr: required!(library, "PyObject_Repr"),
            incref: required!(library, "Py_IncRef"),
            decref: required!(library, "Py_DecRef"),
            compile_string: required!(library, "Py_CompileString"),
            run_simple_string: required!(library, "PyRun_SimpleString"),
            is_initialized: required!(library, "Py_IsInitialized"),
            initialize: required!(library, "Py_Initialize"),
            library,
        };

        debug!(target: "pylambda::runtime", library = api.library.name(), "entry points resolved");
        Ok(api)
    }

    /// Consume a new reference to a text object, returning its contents
    unsafe fn take_text(&self, obj: *mut PyObject) -> Option<String> {
        if obj.is_null() {
            return None;
        }
        let text = self.text_of(obj);
        (self.decref)(obj);
        text
    }
}

impl Interpreter for PythonApi {
    unsafe fn parse_tuple(&self, args: *mut PyObject, format: ArgFormat) -> Option<ParsedTuple> {
        let code = format.code().as_ptr();
        match format {
            ArgFormat::Long => {
                let mut value: c_long = 0;
                ((self.parse_tuple)(args, code, &mut value as *mut c_long) != 0)
                    .then_some(ParsedTuple::Long(value))
            }
            ArgFormat::Double => {
                let mut value: f64 = 0.0;
                ((self.parse_tuple)(args, code, &mut value as *mut f64) != 0)
                    .then_some(ParsedTuple::Double(value))
            }
            ArgFormat::Text => {
                let mut value: *const c_char = ptr::null();
                if (self.parse_tuple)(args, code, &mut value as *mut *const c_char) == 0
                    || value.is_null()
                {
                    return None;
                }
                // "s" guarantees UTF-8 without interior NULs
                Some(ParsedTuple::Text(CStr::from_ptr(value).to_string_lossy().into_owned()))
            }
            ArgFormat::Object => {
                let mut a: *mut PyObject = ptr::null_mut();
                if (self.parse_tuple)(args, code, &mut a as *mut *mut PyObject) == 0 {
                    return None;
                }
                Some(ParsedTuple::Objects(smallvec![PyRef::from_raw(a)?]))
            }
            ArgFormat::ObjectPair => {
                let mut a: *mut PyObject = ptr::null_mut();
                let mut b: *mut PyObject = ptr::null_mut();
                if (self.parse_tuple)(
                    args,
                    code,
                    &mut a as *mut *mut PyObject,
                    &mut b as *mut *mut PyObject,
                ) == 0
                {
                    return None;
                }
                Some(ParsedTuple::Objects(smallvec![PyRef::from_raw(a)?, PyRef::from_raw(b)?]))
            }
            ArgFormat::ObjectTriple => {
                let mut a: *mut PyObject = ptr::null_mut();
                let mut b: *mut PyObject = ptr::null_mut();
                let mut c: *mut PyObject = ptr::null_mut();
                if (self.parse_tuple)(
                    args,
                    code,
                    &mut a as *mut *mut PyObject,
                    &mut b as *mut *mut PyObject,
                    &mut c as *mut *mut PyObject,
                ) == 0
                {
                    return None;
                }
                Some(ParsedTuple::Objects(smallvec![
                    PyRef::from_raw(a)?,
                    PyRef::from_raw(b)?,
                    PyRef::from_raw(c)?
                ]))
            }
        }
    }

    unsafe fn build_value(&self, value: BuildValue<'_>) -> *mut PyObject {
        match value {
            BuildValue::None => (self.build_value)(c"".as_ptr()),
            BuildValue::Long(v) => (self.build_value)(c"l".as_ptr(), v),
            BuildValue::Double(v) => (self.build_value)(c"d".as_ptr(), v),
            BuildValue::Text(v) => (self.build_value)(c"s".as_ptr(), v.as_ptr()),
            BuildValue::Bool(v) => (self.bool_from_long)(c_long::from(v)),
            BuildValue::Object(v) => (self.build_value)(c"O".as_ptr(), v.as_ptr()),
        }
    }

    fn new_text(&self, text: &CStr) -> Result<*mut PyObject, BindError> {
        let ctor = self
            .unicode_from_string
            .ok_or(BindError::IncompatibleVersion { missing: "PyUnicode_FromString" })?;
        // Safety: `text` is a valid NUL-terminated string.
        Ok(unsafe { ctor(text.as_ptr()) })
    }

    unsafe fn new_callable(&self, def: *mut PyMethodDef, slf: *mut PyObject) -> *mut PyObject {
        (self.cfunction_new)(def, slf, ptr::null_mut())
    }

    unsafe fn text_of(&self, obj: *mut PyObject) -> Option<String> {
        if obj.is_null() {
            return None;
        }
        let raw = (self.unicode_as_utf8)(obj);
        if raw.is_null() {
            (self.err_clear)();
            return None;
        }
        Some(CStr::from_ptr(raw).to_string_lossy().into_owned())
    }

    unsafe fn str_of(&self, obj: *mut PyObject) -> Option<String> {
        if obj.is_null() {
            return None;
        }
        self.take_text((self.object_str)(obj))
    }

    unsafe fn repr_of(&self, obj: *mut PyObject) -> Option<String> {
        if obj.is_null() {
            return None;
        }
        self.take_text((self.object_repr)(obj))
    }

    unsafe fn incref(&self, obj: *mut PyObject) {
        if !obj.is_null() {
            (self.incref)(obj);
        }
    }

    unsafe fn decref(&self, obj: *mut PyObject) {
        if !obj.is_null() {
            (self.decref)(obj);
        }
    }

    fn main_dict(&self) -> *mut PyObject {
        unsafe {
            let module = (self.import_add_module)(c"__main__".as_ptr());
            if module.is_null() {
                return ptr::null_mut();
            }
            (self.module_get_dict)(module)
        }
    }

    fn new_dict(&self) -> *mut PyObject {
        unsafe { (self.dict_new)() }
    }

    fn builtins(&self) -> *mut PyObject {
        unsafe { (self.eval_get_builtins)() }
    }

    unsafe fn dict_get(&self, dict: *mut PyObject, key: &CStr) -> *mut PyObject {
        (self.dict_get_item_string)(dict, key.as_ptr())
    }

    unsafe fn dict_set(&self, dict: *mut PyObject, key: &CStr, value: *mut PyObject) -> bool {
        (self.dict_set_item_string)(dict, key.as_ptr(), value) == 0
    }

    unsafe fn get_attr(&self, obj: *mut PyObject, name: &CStr) -> *mut PyObject {
        (self.object_get_attr_string)(obj, name.as_ptr())
    }

    unsafe fn set_attr(&self, obj: *mut PyObject, name: &CStr, value: *mut PyObject) -> bool {
        (self.object_set_attr_string)(obj, name.as_ptr(), value) == 0
    }

    unsafe fn run_string(
        &self,
        code: &CStr,
        mode: ExecMode,
        globals: *mut PyObject,
        locals: *mut PyObject,
    ) -> *mut PyObject {
        (self.run_string)(code.as_ptr(), mode.as_raw(), globals, locals)
    }

    fn compile(&self, code: &CStr, filename: &CStr, mode: ExecMode) -> *mut PyObject {
        unsafe { (self.compile_string)(code.as_ptr(), filename.as_ptr(), mode.as_raw()) }
    }

    fn run_simple(&self, code: &CStr) -> bool {
        unsafe { (self.run_simple_string)(code.as_ptr()) == 0 }
    }

    fn error_occurred(&self) -> bool {
        unsafe { !(self.err_occurred)().is_null() }
    }

    fn print_error(&self) {
        unsafe { (self.err_print)() }
    }

    fn clear_error(&self) {
        unsafe { (self.err_clear)() }
    }

    fn raise_runtime_error(&self, message: &CStr) {
        unsafe { (self.err_set_string)(*self.exc_runtime_error, message.as_ptr()) }
    }

    fn ensure_initialized(&self) {
        unsafe {
            if (self.is_initialized)() == 0 {
                debug!(target: "pylambda::runtime", "initializing interpreter");
                (self.initialize)();
            }
        }
    }
}

impl core::fmt::Debug for PythonApi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PythonApi")
            .field("library", &self.library)
            .field("text_constructor", &self.unicode_from_string.is_some())
            .finish()
    }
}
