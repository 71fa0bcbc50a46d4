//! Typed closure → shape mapping
//!
//! `IntoLambda<Marker>` is implemented once per catalog shape. The marker is
//! the closure's function-pointer type, so `|x: i64| x * 2` selects
//! `fn(i64) -> i64` and nothing else.

use crate::ffi::PyRef;
use crate::marshal::{Arguments, InputKind, OutputKind, Returned, Shape};
use crate::registry::ErasedFn;
use std::sync::Arc;

/// Host types a lambda can receive
pub trait FromArguments: Sized {
    const KIND: InputKind;

    fn from_arguments(args: Arguments) -> Option<Self>;
}

/// Host types a lambda can return
pub trait IntoReturned {
    const KIND: OutputKind;

    fn into_returned(self) -> Returned;
}

/// Closures that can be exposed as lambdas
pub trait IntoLambda<Marker>: Send + Sync + 'static {
    fn shape() -> Shape;

    fn into_erased(self) -> ErasedFn;
}

macro_rules! from_arguments {
    ($($ty:ty => $kind:ident($($bind:ident),+) as $variant:ident),* $(,)?) => {$(
        impl FromArguments for $ty {
            const KIND: InputKind = InputKind::$kind;

            #[inline]
            fn from_arguments(args: Arguments) -> Option<Self> {
                match args {
                    Arguments::$variant($($bind),+) => Some(($($bind),+)),
                    _ => None,
                }
            }
        }
    )*};
}

from_arguments! {
    i64 => Integer(v) as Integer,
    bool => Boolean(v) as Boolean,
    f64 => Float(v) as Float,
    String => Text(v) as Text,
    PyRef => Object(v) as Object,
    (PyRef, PyRef) => ObjectPair(a, b) as Pair,
    (PyRef, PyRef, PyRef) => ObjectTriple(a, b, c) as Triple,
}

macro_rules! into_returned {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl IntoReturned for $ty {
            const KIND: OutputKind = OutputKind::$kind;

            #[inline]
            fn into_returned(self) -> Returned {
                Returned::$kind(self)
            }
        }
    )*};
}

into_returned! {
    i64 => Integer,
    f64 => Float,
    String => Text,
    bool => Boolean,
    PyRef => Object,
}

fn erase<A, R>(f: impl Fn(A) -> R + Send + Sync + 'static) -> ErasedFn
where
    A: FromArguments,
    R: IntoReturned,
{
    Arc::new(move |args: Arguments| {
        let found = args.kind();
        match A::from_arguments(args) {
            Some(a) => f(a).into_returned(),
            // Dispatch parses by the registered shape, so this cannot happen
            None => unreachable!("{:?} arguments routed to a ({}) lambda", found, A::KIND.type_name()),
        }
    })
}

macro_rules! unary_lambdas {
    ($($input:ty => [$($output:ty),+]);* $(;)?) => {$($(
        impl<F> IntoLambda<fn($input) -> $output> for F
        where
            F: Fn($input) -> $output + Send + Sync + 'static,
        {
            fn shape() -> Shape {
                Shape::new(<$input as FromArguments>::KIND, <$output as IntoReturned>::KIND)
            }

            fn into_erased(self) -> ErasedFn {
                erase::<$input, $output>(self)
            }
        }
    )+)*};
}

unary_lambdas! {
    i64 => [i64, f64, String, bool];
    bool => [bool, i64];
    f64 => [f64, i64, String, bool];
    String => [String, i64, f64, bool];
    PyRef => [PyRef, i64, f64, String, bool];
}

impl<F> IntoLambda<fn(PyRef, PyRef) -> PyRef> for F
where
    F: Fn(PyRef, PyRef) -> PyRef + Send + Sync + 'static,
{
    fn shape() -> Shape {
        Shape::new(InputKind::ObjectPair, OutputKind::Object)
    }

    fn into_erased(self) -> ErasedFn {
        erase::<(PyRef, PyRef), PyRef>(move |(a, b)| self(a, b))
    }
}

impl<F> IntoLambda<fn(PyRef, PyRef, PyRef) -> PyRef> for F
where
    F: Fn(PyRef, PyRef, PyRef) -> PyRef + Send + Sync + 'static,
{
    fn shape() -> Shape {
        Shape::new(InputKind::ObjectTriple, OutputKind::Object)
    }

    fn into_erased(self) -> ErasedFn {
        erase::<(PyRef, PyRef, PyRef), PyRef>(move |(a, b, c)| self(a, b, c))
    }
}
