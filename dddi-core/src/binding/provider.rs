//! Providers and Assignments
//!
//! An [`Assignment`] is one declared rule, "target gets the value of this
//! provider". It is context-free and may be bound many times, once per
//! evaluation context, producing a [`BoundAssignment`] each time.

use std::fmt;
use std::rc::Rc;

use super::spec::{parse_provider_spec, CompareMode, ComputeFn, Provider, ProviderSpec};
use crate::error::{DddiError, Result};
use crate::expr::{bind_expr, BoundExpr, BoundGetter, Context, Expr, ExpressionCompiler};
use crate::value::Value;

/// A dependency closed over a context.
#[derive(Clone)]
pub struct BoundDependency {
    pub expr: BoundExpr,
    pub optional: bool,
    pub mode: CompareMode,
}

impl BoundDependency {
    /// Evaluate the dependency.
    pub fn get(&self) -> Value {
        self.expr.get()
    }

    pub fn getter(&self) -> BoundGetter {
        self.expr.getter()
    }
}

impl fmt::Debug for BoundDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundDependency")
            .field("expr", &self.expr.text())
            .field("optional", &self.optional)
            .field("mode", &self.mode)
            .finish()
    }
}

/// A provider whose dependencies are bound.
#[derive(Clone)]
pub struct BoundProvider {
    pub compute: ComputeFn,
    pub deps: Vec<BoundDependency>,
}

/// Bind every dependency of `provider` to `context`.
pub fn bind_provider(provider: &Provider, context: &Context) -> BoundProvider {
    BoundProvider {
        compute: Rc::clone(&provider.compute),
        deps: provider
            .deps
            .iter()
            .map(|dep| BoundDependency {
                expr: bind_expr(&dep.expr, context.clone()),
                optional: dep.optional,
                mode: dep.mode,
            })
            .collect(),
    }
}

/// A declared binding rule.
#[derive(Clone)]
pub struct Assignment {
    pub target: Expr,
    /// The target's source text, used as the registration key and in logs.
    pub target_text: Rc<str>,
    pub provider: Provider,
}

impl Assignment {
    /// Compile the target and parse the provider spec.
    ///
    /// Fails with `NonWritableTarget` before looking at the provider if the
    /// target cannot be assigned.
    pub fn new(
        compiler: &dyn ExpressionCompiler,
        target_text: &str,
        spec: &ProviderSpec,
    ) -> Result<Self> {
        let target = compiler.compile(target_text)?;
        if !target.is_assignable() {
            return Err(DddiError::NonWritableTarget {
                target: target_text.to_string(),
            });
        }

        let provider = parse_provider_spec(compiler, spec)?;

        Ok(Self {
            target,
            target_text: Rc::from(target_text),
            provider,
        })
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assignment")
            .field("target", &self.target_text)
            .field("provider", &self.provider)
            .finish()
    }
}

/// An assignment bound to one evaluation context.
#[derive(Clone)]
pub struct BoundAssignment {
    pub target: BoundExpr,
    pub provider: BoundProvider,
    /// Diagnostic name, e.g. `items[2].total` for array slots.
    pub target_text: Rc<str>,
}

/// Bind `assignment`. The target uses `target_context` when given, otherwise
/// the dependency context.
pub fn bind_assignment(
    assignment: &Assignment,
    dep_context: Context,
    target_context: Option<Context>,
) -> BoundAssignment {
    let target_context = target_context.unwrap_or_else(|| dep_context.clone());
    BoundAssignment {
        target: bind_expr(&assignment.target, target_context),
        provider: bind_provider(&assignment.provider, &dep_context),
        target_text: Rc::clone(&assignment.target_text),
    }
}
