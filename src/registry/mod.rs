//! Callable registry - identifier to (shape, closure) routing table
//!
//! Architecture:
//! - `ident.rs` - Identifier format and generators
//! - `dispatch.rs` - The single trampoline every native callable points at
//! - this file - Slot arena + identifier index behind one mutex
//!
//! The lock is held only for insert/remove/lookup. Lookups clone the closure
//! handle out, so a closure may itself create, call or release lambdas.

mod dispatch;
mod ident;


pub use dispatch::{dispatch, stats, DispatchStats};
pub use ident::{IdGenerator, LambdaId, LAMBDA_PREFIX, STRING_LAMBDA_PREFIX};

use crate::marshal::{Arguments, Returned, Shape};
use core::fmt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Type-erased host closure
pub type ErasedFn = Arc<dyn Fn(Arguments) -> Returned + Send + Sync>;

/// Process-wide registry
static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::new()));

struct Entry {
    id: LambdaId,
    shape: Shape,
    call: ErasedFn,
}

/// Slot arena with an identifier index
///
/// Vacated slots are recycled through a free list, so long-running hosts that
/// create and release many lambdas keep a bounded table.
pub struct Registry {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: HashMap<LambdaId, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(64),
            free: Vec::new(),
            index: HashMap::with_capacity(64),
        }
    }

    pub fn insert(&mut self, id: LambdaId, shape: Shape, call: ErasedFn) -> Result<(), RegistryError> {
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateIdentifier(id));
        }

        let entry = Entry { id: id.clone(), shape, call };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        Ok(())
    }

    /// Remove an entry, returning its shape
    pub fn remove(&mut self, id: &str) -> Option<Shape> {
        let slot = self.index.remove(id)?;
        let entry = self.slots[slot].take()?;
        self.free.push(slot);
        Some(entry.shape)
    }

    pub fn get(&self, id: &str) -> Option<(Shape, ErasedFn)> {
        let slot = *self.index.get(id)?;
        self.slots[slot]
            .as_ref()
            .map(|entry| (entry.shape, entry.call.clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Identifiers registered under `shape`, in slot order
    pub fn ids_for(&self, shape: Shape) -> Vec<LambdaId> {
        self.slots
            .iter()
            .flatten()
            .filter(|entry| entry.shape == shape)
            .map(|entry| entry.id.clone())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Add a closure to the process-wide registry
pub fn register(id: LambdaId, shape: Shape, call: ErasedFn) -> Result<(), RegistryError> {
    let result = REGISTRY.lock().insert(id.clone(), shape, call);
    match &result {
        Ok(()) => debug!(target: "pylambda::registry", id = %id, shape = %shape, "registered"),
        Err(err) => debug!(target: "pylambda::registry", error = %err, "registration rejected"),
    }
    result
}

/// Remove a closure; `false` if it was not registered
pub fn unregister(id: &str) -> bool {
    let removed = REGISTRY.lock().remove(id);
    if let Some(shape) = removed {
        debug!(target: "pylambda::registry", id, shape = %shape, "unregistered");
    }
    removed.is_some()
}

/// Shape and closure for `id`; the registry lock is released on return
pub fn lookup(id: &str) -> Option<(Shape, ErasedFn)> {
    let found = REGISTRY.lock().get(id);
    trace!(target: "pylambda::registry", id, hit = found.is_some(), "lookup");
    found
}

pub fn contains(id: &str) -> bool {
    REGISTRY.lock().contains(id)
}

/// Number of live entries
pub fn len() -> usize {
    REGISTRY.lock().len()
}

pub fn ids_for(shape: Shape) -> Vec<LambdaId> {
    REGISTRY.lock().ids_for(shape)
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateIdentifier(LambdaId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateIdentifier(id) => write!(f, "Identifier already registered: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
