//! Lambda identifiers - unique names the interpreter routes calls by

use core::borrow::Borrow;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::ffi::CString;

/// Prefix of identifiers for closure-backed lambdas
pub const LAMBDA_PREFIX: &str = "lmb";

/// Prefix of globals holding memoized string lambdas
pub const STRING_LAMBDA_PREFIX: &str = "lmbstr";

static LAMBDA_IDS: IdGenerator = IdGenerator::new(LAMBDA_PREFIX);
static STRING_LAMBDA_IDS: IdGenerator = IdGenerator::new(STRING_LAMBDA_PREFIX);

/// Identifier of a registered lambda
///
/// Always a valid interpreter identifier (ASCII letter or `_` first, then
/// ASCII alphanumerics or `_`), so it can double as a global name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LambdaId(String);

impl LambdaId {
    /// Validate a caller-chosen identifier
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let mut chars = text.chars();
        let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        (head_ok && tail_ok).then_some(Self(text))
    }

    /// Next identifier for a closure-backed lambda (`lmb<N>`)
    pub fn next_lambda() -> Self {
        LAMBDA_IDS.next()
    }

    /// Next global name for a string lambda (`lmbstr<N>`)
    pub fn next_string_lambda() -> Self {
        STRING_LAMBDA_IDS.next()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NUL-terminated copy for the C API
    pub fn to_cstring(&self) -> CString {
        // Validated identifiers never contain NUL
        CString::new(self.0.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Display for LambdaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for LambdaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LambdaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Monotonic identifier source
///
/// Lock-free; safe to draw from any thread.
pub struct IdGenerator {
    prefix: &'static str,
    counter: AtomicU64,
}

impl IdGenerator {
    pub const fn new(prefix: &'static str) -> Self {
        Self { prefix, counter: AtomicU64::new(0) }
    }

    pub fn next(&self) -> LambdaId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        LambdaId(format!("{}{}", self.prefix, n))
    }

    /// How many identifiers have been handed out
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
