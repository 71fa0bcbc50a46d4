//! Shape catalog and boundary value types
//!
//! Defines which (input, output) signatures can cross the boundary.

use crate::ffi::PyRef;
use crate::runtime::ArgFormat;
use core::fmt;

/// What a callable receives from the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Integer,
    /// Parsed as an integer, non-zero is `true`
    Boolean,
    Float,
    Text,
    Object,
    ObjectPair,
    ObjectTriple,
}

impl InputKind {
    /// Tuple format used to unpack this input
    #[inline]
    pub const fn format(self) -> ArgFormat {
        match self {
            Self::Integer | Self::Boolean => ArgFormat::Long,
            Self::Float => ArgFormat::Double,
            Self::Text => ArgFormat::Text,
            Self::Object => ArgFormat::Object,
            Self::ObjectPair => ArgFormat::ObjectPair,
            Self::ObjectTriple => ArgFormat::ObjectTriple,
        }
    }

    #[inline]
    pub const fn arity(self) -> usize {
        self.format().arity()
    }

    /// Interpreter-side type name (for diagnostics)
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Boolean => "bool",
            Self::Float => "float",
            Self::Text => "str",
            Self::Object => "object",
            Self::ObjectPair => "object, object",
            Self::ObjectTriple => "object, object, object",
        }
    }
}

/// What a callable hands back to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Integer,
    Float,
    Text,
    Boolean,
    Object,
}

impl OutputKind {
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Float => "float",
            Self::Text => "str",
            Self::Boolean => "bool",
            Self::Object => "object",
        }
    }
}

/// An (input, output) signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub input: InputKind,
    pub output: OutputKind,
}

impl Shape {
    #[inline]
    pub const fn new(input: InputKind, output: OutputKind) -> Self {
        Self { input, output }
    }

    /// Every shape a lambda may take
    pub const CATALOG: &'static [Shape] = &[
        Shape::new(InputKind::Integer, OutputKind::Integer),
        Shape::new(InputKind::Integer, OutputKind::Float),
        Shape::new(InputKind::Integer, OutputKind::Text),
        Shape::new(InputKind::Integer, OutputKind::Boolean),
        Shape::new(InputKind::Boolean, OutputKind::Boolean),
        Shape::new(InputKind::Boolean, OutputKind::Integer),
        Shape::new(InputKind::Float, OutputKind::Float),
        Shape::new(InputKind::Float, OutputKind::Integer),
        Shape::new(InputKind::Float, OutputKind::Text),
        Shape::new(InputKind::Float, OutputKind::Boolean),
        Shape::new(InputKind::Text, OutputKind::Text),
        Shape::new(InputKind::Text, OutputKind::Integer),
        Shape::new(InputKind::Text, OutputKind::Float),
        Shape::new(InputKind::Text, OutputKind::Boolean),
        Shape::new(InputKind::Object, OutputKind::Object),
        Shape::new(InputKind::Object, OutputKind::Integer),
        Shape::new(InputKind::Object, OutputKind::Float),
        Shape::new(InputKind::Object, OutputKind::Text),
        Shape::new(InputKind::Object, OutputKind::Boolean),
        Shape::new(InputKind::ObjectPair, OutputKind::Object),
        Shape::new(InputKind::ObjectTriple, OutputKind::Object),
    ];

    pub fn is_supported(self) -> bool {
        Self::CATALOG.contains(&self)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> {}", self.input.type_name(), self.output.type_name())
    }
}

/// Arguments after unpacking, ready for a closure
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    Integer(i64),
    Boolean(bool),
    Float(f64),
    Text(String),
    Object(PyRef),
    Pair(PyRef, PyRef),
    Triple(PyRef, PyRef, PyRef),
}

impl Arguments {
    pub const fn kind(&self) -> InputKind {
        match self {
            Self::Integer(_) => InputKind::Integer,
            Self::Boolean(_) => InputKind::Boolean,
            Self::Float(_) => InputKind::Float,
            Self::Text(_) => InputKind::Text,
            Self::Object(_) => InputKind::Object,
            Self::Pair(..) => InputKind::ObjectPair,
            Self::Triple(..) => InputKind::ObjectTriple,
        }
    }
}

/// A closure's result before it is turned into an interpreter value
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Object(PyRef),
}

impl Returned {
    pub const fn kind(&self) -> OutputKind {
        match self {
            Self::Integer(_) => OutputKind::Integer,
            Self::Float(_) => OutputKind::Float,
            Self::Text(_) => OutputKind::Text,
            Self::Boolean(_) => OutputKind::Boolean,
            Self::Object(_) => OutputKind::Object,
        }
    }

    /// Convert into the slot type `target`
    ///
    /// Only exact conversions succeed: a float becomes an integer only when it
    /// is integral and representable.
    pub fn coerce(self, target: OutputKind) -> Option<Self> {
        if self.kind() == target {
            return Some(self);
        }
        match (self, target) {
            (Self::Integer(v), OutputKind::Float) => Some(Self::Float(v as f64)),
            (Self::Integer(v), OutputKind::Boolean) => Some(Self::Boolean(v != 0)),
            (Self::Boolean(v), OutputKind::Integer) => Some(Self::Integer(i64::from(v))),
            (Self::Boolean(v), OutputKind::Float) => Some(Self::Float(if v { 1.0 } else { 0.0 })),
            (Self::Float(v), OutputKind::Integer) => {
                let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
                (v.fract() == 0.0 && in_range).then(|| Self::Integer(v as i64))
            }
            _ => None,
        }
    }
}
