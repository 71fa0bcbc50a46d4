//! Lambda handles - host closures as interpreter callables
//!
//! Architecture:
//! - `shapes.rs` - `IntoLambda` for every catalog shape
//! - `descriptor.rs` - Pool of method descriptors (never freed)
//! - `string.rs` - Lambdas written as interpreter source text
//! - this file - `Lambda` lifecycle: create, hand out, release
//!
//! Lifecycle: `Unregistered → Registered → Released`. Release is explicit
//! because the interpreter cannot tell the host when it drops its last
//! reference. A handle dropped without `release` leaks its registry entry and
//! descriptor, so callables still held by interpreter code keep working.

mod descriptor;
mod shapes;
mod string;


pub use descriptor::pooled as pooled_descriptors;
pub use shapes::{FromArguments, IntoLambda, IntoReturned};
pub use string::StringLambda;

use crate::ffi::{PyObject, PyRef};
use crate::marshal::{Arguments, Returned, Shape};
use crate::registry::{self, ErasedFn, LambdaId, RegistryError};
use crate::runtime::{self, BindError, Interpreter};
use core::fmt;
use core::ptr;
use descriptor::Descriptor;
use std::sync::Arc;
use tracing::debug;

/// A host closure exposed as an interpreter callable
pub struct Lambda {
    id: LambdaId,
    shape: Shape,
    callable: PyRef,
    descriptor: Option<Descriptor>,
    interp: Arc<dyn Interpreter>,
}

impl Lambda {
    /// Expose a typed closure, e.g. `Lambda::new(|x: i64| x * 2)`
    pub fn new<M, F: IntoLambda<M>>(closure: F) -> Result<Self, LambdaError> {
        Self::create_in(runtime::current()?, LambdaId::next_lambda(), F::shape(), closure.into_erased())
    }

    /// Like `new`, under a caller-chosen identifier
    pub fn with_id<M, F: IntoLambda<M>>(id: &str, closure: F) -> Result<Self, LambdaError> {
        let id = LambdaId::new(id).ok_or_else(|| LambdaError::InvalidIdentifier(id.to_string()))?;
        Self::create_in(runtime::current()?, id, F::shape(), closure.into_erased())
    }

    /// Expose an untyped closure for `shape`
    ///
    /// Results are coerced to the shape's output kind at call time.
    pub fn from_fn<F>(shape: Shape, closure: F) -> Result<Self, LambdaError>
    where
        F: Fn(Arguments) -> Returned + Send + Sync + 'static,
    {
        if !shape.is_supported() {
            return Err(LambdaError::UnsupportedShape(shape));
        }
        Self::create_in(runtime::current()?, LambdaId::next_lambda(), shape, Arc::new(closure))
    }

    /// Create, run `body`, release on every exit path
    pub fn scoped<M, F, B, T>(closure: F, body: B) -> Result<T, LambdaError>
    where
        F: IntoLambda<M>,
        B: FnOnce(&Lambda) -> T,
    {
        Ok(with_scoped_release(Self::new(closure)?, body))
    }

    pub(crate) fn create_in(
        interp: Arc<dyn Interpreter>,
        id: LambdaId,
        shape: Shape,
        call: ErasedFn,
    ) -> Result<Self, LambdaError> {
        let slf = interp.new_text(&id.to_cstring())?;
        if slf.is_null() {
            interp.clear_error();
            return Err(LambdaError::CallableConstruction(id));
        }

        if let Err(err) = registry::register(id.clone(), shape, call) {
            // Safety: `slf` is the new reference created above.
            unsafe { interp.decref(slf) };
            return Err(err.into());
        }

        let descriptor = descriptor::acquire(&id);
        // Safety: the descriptor is never freed and `slf` is live. The
        // callable takes its own reference to `slf`.
        let raw = unsafe {
            let raw = interp.new_callable(descriptor.as_def(), slf);
            interp.decref(slf);
            raw
        };

        let Some(callable) = PyRef::from_raw(raw) else {
            interp.clear_error();
            registry::unregister(id.as_str());
            descriptor::release(descriptor);
            return Err(LambdaError::CallableConstruction(id));
        };

        debug!(target: "pylambda::lambda", id = %id, shape = %shape, "lambda created");
        Ok(Self {
            id,
            shape,
            callable,
            descriptor: Some(descriptor),
            interp,
        })
    }

    #[inline]
    pub fn id(&self) -> &LambdaId {
        &self.id
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// The callable, to pass to interpreter code
    ///
    /// `None` once released: the handle no longer owns a reference, so the
    /// object may already be gone. Interpreter code that took its own
    /// reference earlier keeps a callable that yields `None`.
    #[inline]
    pub fn object(&self) -> Option<PyRef> {
        (!self.is_released()).then_some(self.callable)
    }

    /// Raw callable pointer; null once released
    #[inline]
    pub fn as_ptr(&self) -> *mut PyObject {
        self.object().map_or(ptr::null_mut(), PyRef::as_ptr)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.descriptor.is_none()
    }

    /// Unregister and return the descriptor to the pool
    ///
    /// Returns `false` if the handle was already released.
    pub fn release(&mut self) -> bool {
        let Some(descriptor) = self.descriptor.take() else {
            return false;
        };
        registry::unregister(self.id.as_str());
        descriptor::release(descriptor);
        // Safety: the handle owned one reference to the callable.
        unsafe { self.interp.decref(self.callable.as_ptr()) };
        debug!(target: "pylambda::lambda", id = %self.id, "lambda released");
        true
    }
}

impl Drop for Lambda {
    fn drop(&mut self) {
        if !self.is_released() {
            debug!(
                target: "pylambda::lambda",
                id = %self.id,
                "lambda dropped without release; entry and descriptor leaked"
            );
        }
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Run `body` with `lambda`, releasing it afterwards even if `body` panics
pub fn with_scoped_release<T>(lambda: Lambda, body: impl FnOnce(&Lambda) -> T) -> T {
    let guard = ReleaseGuard(lambda);
    body(&guard.0)
}

struct ReleaseGuard(Lambda);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Lambda construction errors
#[derive(Debug, Clone, PartialEq)]
pub enum LambdaError {
    /// No usable runtime
    Bind(BindError),
    /// The shape is not in the catalog
    UnsupportedShape(Shape),
    DuplicateIdentifier(LambdaId),
    /// The interpreter refused to build the callable
    CallableConstruction(LambdaId),
    /// Not a valid interpreter identifier
    InvalidIdentifier(String),
    /// String lambda source started with the `lambda` keyword
    IntroducerKeyword,
    /// String lambda source has no `:` between parameters and body
    MissingSeparator,
    /// String lambda source failed to evaluate
    Evaluation(String),
}

impl fmt::Display for LambdaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(err) => write!(f, "{}", err),
            Self::UnsupportedShape(shape) => write!(f, "Unsupported lambda shape {}", shape),
            Self::DuplicateIdentifier(id) => write!(f, "Identifier already registered: {}", id),
            Self::CallableConstruction(id) => write!(f, "Could not build callable for {}", id),
            Self::InvalidIdentifier(id) => write!(f, "Invalid lambda identifier: {:?}", id),
            Self::IntroducerKeyword => {
                write!(f, "String lambda must not start with the 'lambda' keyword")
            }
            Self::MissingSeparator => write!(f, "String lambda needs ':' between parameters and body"),
            Self::Evaluation(msg) => write!(f, "String lambda evaluation failed: {}", msg),
        }
    }
}

impl std::error::Error for LambdaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BindError> for LambdaError {
    fn from(err: BindError) -> Self {
        Self::Bind(err)
    }
}

impl From<RegistryError> for LambdaError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateIdentifier(id) => Self::DuplicateIdentifier(id),
        }
    }
}
