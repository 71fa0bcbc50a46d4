//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary for the interpreter's
//! shared image.

use core::ffi::c_void;
use core::ptr::NonNull;
use std::ffi::CString;

use tracing::{debug, trace};

/// Handle to a dynamically loaded library
///
/// Closing happens on drop. The bound interpreter table keeps its library
/// alive for the rest of the process.
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
}

impl Library {
    /// Load library by name
    ///
    /// Searches standard library paths. Use `load_path` for absolute paths.
    pub fn load(name: &str) -> Result<Self, LoadError> {
        Self::load_impl(name)
    }

    /// Load library from a filesystem path
    pub fn load_path(path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        Self::load_impl(&path.to_string_lossy())
    }

    /// Name or path the library was loaded from
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        // RTLD_GLOBAL so extension modules imported later can see the
        // interpreter's symbols.
        let raw = unsafe { libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };

        match NonNull::new(raw) {
            Some(handle) => {
                debug!(target: "pylambda::runtime", library = name, "library loaded");
                Ok(Self { handle, name: name.to_string() })
            }
            None => {
                let err = unsafe { libc::dlerror() };
                let msg = if err.is_null() {
                    "Unknown error".to_string()
                } else {
                    unsafe { std::ffi::CStr::from_ptr(err) }
                        .to_string_lossy()
                        .into_owned()
                };
                Err(LoadError::LoadFailed(msg))
            }
        }
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::LoadLibraryW;

        let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            match NonNull::new(handle as *mut c_void) {
                Some(handle) => {
                    debug!(target: "pylambda::runtime", library = name, "library loaded");
                    Ok(Self { handle, name: name.to_string() })
                }
                None => Err(LoadError::LoadFailed(format!("Error code: {}", GetLastError()))),
            }
        }
    }

    /// Get symbol address by name
    pub fn symbol(&self, name: &str) -> Result<*const (), SymbolError> {
        let ptr = self.symbol_impl(name)?;
        trace!(target: "pylambda::runtime", symbol = name, "symbol resolved");
        Ok(ptr)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &str) -> Result<*const (), SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        let ptr = unsafe { libc::dlsym(self.handle.as_ptr(), cname.as_ptr()) };
        if ptr.is_null() {
            Err(SymbolError::NotFound(name.to_string()))
        } else {
            Ok(ptr as *const ())
        }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &str) -> Result<*const (), SymbolError> {
        use winapi::um::libloaderapi::GetProcAddress;

        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        unsafe {
            let ptr = GetProcAddress(self.handle.as_ptr() as _, cname.as_ptr());
            if ptr.is_null() {
                Err(SymbolError::NotFound(name.to_string()))
            } else {
                Ok(ptr as *const ())
            }
        }
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use winapi::um::libloaderapi::FreeLibrary;
        unsafe {
            FreeLibrary(self.handle.as_ptr() as _);
        }
    }
}

impl core::fmt::Debug for Library {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish()
    }
}

// Safety: the handle is an opaque token; dlsym/GetProcAddress are thread-safe.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    InvalidName,
    NotFound(String),
    LoadFailed(String),
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::NotFound(path) => write!(f, "Library file not found: {}", path),
            Self::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    InvalidName,
    NotFound(String),
}

impl core::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound(name) => write!(f, "Symbol not found: {}", name),
        }
    }
}

impl std::error::Error for SymbolError {}
