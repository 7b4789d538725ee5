//! Expressions
//!
//! An [`Expr`] is an unbound accessor: given a context value it produces a
//! value, and if it is assignable it can also write one back. Binding an
//! expression to a [`Context`] yields a [`BoundExpr`], a zero-argument
//! accessor the rest of the engine can call without knowing where its data
//! lives.
//!
//! Whether an expression is writable is decided once, at compile time, and
//! carried as the [`Access`] variant.

mod bind;
mod path;

pub use bind::bind_expr;
pub use path::PathCompiler;

use std::fmt;
use std::rc::Rc;

use crate::error::{DddiError, Result};
use crate::value::Value;

/// Reads a value relative to a context.
pub type Getter = Rc<dyn Fn(&Value) -> Value>;

/// Writes a value relative to a context.
pub type Setter = Rc<dyn Fn(&Value, Value) -> Result<()>>;

/// Reads a value from an already-bound context.
pub type BoundGetter = Rc<dyn Fn() -> Value>;

/// Writes a value into an already-bound context.
pub type BoundSetter = Rc<dyn Fn(Value) -> Result<()>>;

/// Turns expression text into an [`Expr`].
pub trait ExpressionCompiler {
    /// Compile `text`, failing if it is syntactically invalid.
    fn compile(&self, text: &str) -> Result<Expr>;
}

/// Capability of an unbound expression.
#[derive(Clone)]
pub enum Access {
    ReadOnly(Getter),
    Assignable { get: Getter, set: Setter },
}

/// An unbound, compiled expression.
#[derive(Clone)]
pub struct Expr {
    text: Rc<str>,
    access: Access,
}

impl Expr {
    /// A read-only expression.
    pub fn read_only<G>(text: &str, get: G) -> Self
    where
        G: Fn(&Value) -> Value + 'static,
    {
        Self {
            text: Rc::from(text),
            access: Access::ReadOnly(Rc::new(get)),
        }
    }

    /// An expression that can be both read and assigned.
    pub fn assignable<G, S>(text: &str, get: G, set: S) -> Self
    where
        G: Fn(&Value) -> Value + 'static,
        S: Fn(&Value, Value) -> Result<()> + 'static,
    {
        Self {
            text: Rc::from(text),
            access: Access::Assignable {
                get: Rc::new(get),
                set: Rc::new(set),
            },
        }
    }

    /// The source text, kept for diagnostics.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn is_assignable(&self) -> bool {
        matches!(self.access, Access::Assignable { .. })
    }

    /// Evaluate against `context`.
    pub fn eval(&self, context: &Value) -> Value {
        match &self.access {
            Access::ReadOnly(get) | Access::Assignable { get, .. } => get(context),
        }
    }

    /// Assign `value` relative to `context`.
    pub fn assign(&self, context: &Value, value: Value) -> Result<()> {
        match &self.access {
            Access::Assignable { set, .. } => set(context, value),
            Access::ReadOnly(_) => Err(DddiError::NonWritableTarget {
                target: self.text.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expr")
            .field("text", &self.text)
            .field("assignable", &self.is_assignable())
            .finish()
    }
}

/// The context an expression is evaluated against.
#[derive(Clone)]
pub enum Context {
    /// Fixed at bind time.
    Static(Value),
    /// Resolved afresh on every read and write.
    Dynamic(Rc<dyn Fn() -> Value>),
}

impl Context {
    /// A context produced by `f` on each access.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Context::Dynamic(Rc::new(f))
    }

    /// The current context value.
    pub fn resolve(&self) -> Value {
        match self {
            Context::Static(value) => value.clone(),
            Context::Dynamic(f) => f(),
        }
    }
}

impl From<Value> for Context {
    fn from(value: Value) -> Self {
        Context::Static(value)
    }
}

/// Capability of a bound expression.
#[derive(Clone)]
pub enum BoundAccess {
    ReadOnly(BoundGetter),
    Assignable { get: BoundGetter, set: BoundSetter },
}

/// An expression closed over its evaluation context.
#[derive(Clone)]
pub struct BoundExpr {
    text: Rc<str>,
    access: BoundAccess,
}

impl BoundExpr {
    pub(crate) fn new(text: Rc<str>, access: BoundAccess) -> Self {
        Self { text, access }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_assignable(&self) -> bool {
        matches!(self.access, BoundAccess::Assignable { .. })
    }

    /// Evaluate in the bound context.
    pub fn get(&self) -> Value {
        self.getter()()
    }

    /// The zero-argument accessor, shareable with watches.
    pub fn getter(&self) -> BoundGetter {
        match &self.access {
            BoundAccess::ReadOnly(get) | BoundAccess::Assignable { get, .. } => Rc::clone(get),
        }
    }

    /// Assign in the bound context.
    pub fn assign(&self, value: Value) -> Result<()> {
        match &self.access {
            BoundAccess::Assignable { set, .. } => set(value),
            BoundAccess::ReadOnly(_) => Err(DddiError::NonWritableTarget {
                target: self.text.to_string(),
            }),
        }
    }
}

impl fmt::Debug for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundExpr")
            .field("text", &self.text)
            .field("assignable", &self.is_assignable())
            .finish()
    }
}
