//! Dependency and Provider Specs
//!
//! # Dependency Specs
//!
//! A textual dependency has the shape `<flag?><mode?><path>`:
//!
//! - `?` marks the dependency optional
//! - `=` selects deep comparison, `@` shallow array comparison
//! - everything else is the path, compiled with the session's
//!   [`ExpressionCompiler`]
//!
//! So `=foo.bar` is a required, deep-compared `foo.bar`, and `?@items` is an
//! optional, shallow-array-compared `items`. A function dependency is always
//! optional and compared by reference.
//!
//! # Provider Specs
//!
//! [`ProviderSpec`] is a closed union decided when the spec is written:
//! a dependency list plus compute function, a bare function (which depends on
//! itself and passes its value through), or a named-injection form that is
//! rejected.

use std::fmt;
use std::rc::Rc;

use crate::error::{DddiError, Result};
use crate::expr::{Expr, ExpressionCompiler};
use crate::reactive::Computation;
use crate::value::Value;

/// A zero-argument value producer.
pub type ValueFn = Rc<dyn Fn() -> Value>;

/// A provider's compute function: `(scope, args) -> computation`.
pub type ComputeFn = Rc<dyn Fn(&Value, &[Value]) -> Computation>;

/// A raw dependency declaration.
#[derive(Clone)]
pub enum DepSpec {
    /// `<flag?><mode?><path>`
    Text(String),
    /// Evaluated without a context on every reaction.
    Function(ValueFn),
    /// Anything else a host may hand over; always rejected.
    Other(Value),
}

impl DepSpec {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        DepSpec::Function(Rc::new(f))
    }
}

impl From<&str> for DepSpec {
    fn from(text: &str) -> Self {
        DepSpec::Text(text.to_string())
    }
}

impl From<String> for DepSpec {
    fn from(text: String) -> Self {
        DepSpec::Text(text)
    }
}

impl From<Value> for DepSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => DepSpec::Text(text),
            other => DepSpec::Other(other),
        }
    }
}

impl fmt::Debug for DepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepSpec::Text(text) => f.debug_tuple("Text").field(text).finish(),
            DepSpec::Function(_) => f.write_str("Function"),
            DepSpec::Other(value) => f.debug_tuple("Other").field(value).finish(),
        }
    }
}

/// How changes to a dependency are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompareMode {
    /// Reference comparison (tag `''`).
    #[default]
    Default,
    /// Deep structural comparison (tag `'='`).
    Deep,
    /// Element-wise comparison of an array (tag `'@'`).
    ShallowArray,
}

impl CompareMode {
    pub fn tag(self) -> &'static str {
        match self {
            CompareMode::Default => "",
            CompareMode::Deep => "=",
            CompareMode::ShallowArray => "@",
        }
    }
}

impl TryFrom<&str> for CompareMode {
    type Error = DddiError;

    fn try_from(tag: &str) -> Result<Self> {
        match tag {
            "" => Ok(CompareMode::Default),
            "=" => Ok(CompareMode::Deep),
            "@" => Ok(CompareMode::ShallowArray),
            other => Err(DddiError::UnsupportedWatchMode {
                tag: other.to_string(),
            }),
        }
    }
}

/// The pieces of a textual dependency spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepText<'a> {
    pub optional: bool,
    pub mode: CompareMode,
    pub path: &'a str,
}

/// Split a textual dependency spec into flag, mode and path.
///
/// A flag or mode character is only taken when something follows it, so
/// `"?"` alone is a (bad) path rather than an optional empty one.
pub fn parse_dep_text(text: &str) -> Result<DepText<'_>> {
    let (optional, rest) = match text.strip_prefix('?') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, text),
    };

    let (tag, path) = match rest.chars().next() {
        Some('=' | '@') if rest.len() > 1 => rest.split_at(1),
        _ => ("", rest),
    };

    Ok(DepText {
        optional,
        mode: CompareMode::try_from(tag)?,
        path,
    })
}

/// A parsed dependency.
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    pub expr: Expr,
    pub optional: bool,
    pub mode: CompareMode,
}

/// Parse one dependency spec.
pub fn parse_dep_spec(
    compiler: &dyn ExpressionCompiler,
    spec: &DepSpec,
) -> Result<DependencyDescriptor> {
    match spec {
        DepSpec::Text(text) => {
            let parts = parse_dep_text(text)?;
            Ok(DependencyDescriptor {
                expr: compiler.compile(parts.path)?,
                optional: parts.optional,
                mode: parts.mode,
            })
        }
        DepSpec::Function(f) => {
            let f = Rc::clone(f);
            Ok(DependencyDescriptor {
                expr: Expr::read_only("<function>", move |_| f()),
                optional: true,
                mode: CompareMode::Default,
            })
        }
        DepSpec::Other(value) => Err(DddiError::UnsupportedSpecKind {
            kind: value.type_name().to_string(),
        }),
    }
}

/// A raw provider declaration.
#[derive(Clone)]
pub enum ProviderSpec {
    /// Dependencies followed by the compute function.
    Sequence {
        deps: Vec<DepSpec>,
        compute: ComputeFn,
    },
    /// A function that is its own (optional) dependency.
    Function(ValueFn),
    /// Named-injection form. Rejected with `NotSupportedYet`.
    Injected {
        names: Vec<String>,
        compute: ComputeFn,
    },
    /// An unrecognized shape. Rejected with `UnknownSpec`.
    Unsupported(Value),
}

impl ProviderSpec {
    /// `[dep, dep, ..., compute]`
    pub fn new<I, D, F>(deps: I, compute: F) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DepSpec>,
        F: Fn(&Value, &[Value]) -> Computation + 'static,
    {
        ProviderSpec::Sequence {
            deps: deps.into_iter().map(Into::into).collect(),
            compute: Rc::new(compute),
        }
    }

    /// A bare function provider.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        ProviderSpec::Function(Rc::new(f))
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSpec::Sequence { deps, .. } => {
                f.debug_struct("Sequence").field("deps", deps).finish()
            }
            ProviderSpec::Function(_) => f.write_str("Function"),
            ProviderSpec::Injected { names, .. } => {
                f.debug_struct("Injected").field("names", names).finish()
            }
            ProviderSpec::Unsupported(value) => f.debug_tuple("Unsupported").field(value).finish(),
        }
    }
}

/// A parsed provider: compute function plus ordered dependencies.
#[derive(Clone)]
pub struct Provider {
    pub compute: ComputeFn,
    pub deps: Vec<DependencyDescriptor>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("deps", &self.deps).finish()
    }
}

/// Parse a provider spec.
pub fn parse_provider_spec(compiler: &dyn ExpressionCompiler, spec: &ProviderSpec) -> Result<Provider> {
    match spec {
        ProviderSpec::Sequence { deps, compute } => {
            let deps = deps
                .iter()
                .map(|dep| parse_dep_spec(compiler, dep))
                .collect::<Result<Vec<_>>>()?;
            Ok(Provider {
                compute: Rc::clone(compute),
                deps,
            })
        }
        ProviderSpec::Function(f) => {
            let identity: ComputeFn = Rc::new(|_: &Value, args: &[Value]| {
                Computation::Ready(args.first().cloned().unwrap_or_default())
            });
            let rephrased = ProviderSpec::Sequence {
                deps: vec![DepSpec::Function(Rc::clone(f))],
                compute: identity,
            };
            parse_provider_spec(compiler, &rephrased)
        }
        ProviderSpec::Injected { .. } => Err(DddiError::NotSupportedYet),
        ProviderSpec::Unsupported(value) => Err(DddiError::UnknownSpec {
            kind: value.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::PathCompiler;
    use serde_json::json;

    #[test]
    fn parses_flags_and_modes() {
        assert_eq!(
            parse_dep_text("=foo.bar").unwrap(),
            DepText { optional: false, mode: CompareMode::Deep, path: "foo.bar" }
        );
        assert_eq!(
            parse_dep_text("?@items").unwrap(),
            DepText { optional: true, mode: CompareMode::ShallowArray, path: "items" }
        );
        assert_eq!(
            parse_dep_text("plain").unwrap(),
            DepText { optional: false, mode: CompareMode::Default, path: "plain" }
        );
        assert_eq!(
            parse_dep_text("?x").unwrap(),
            DepText { optional: true, mode: CompareMode::Default, path: "x" }
        );
    }

    #[test]
    fn lone_markers_fall_through_to_the_path() {
        assert_eq!(parse_dep_text("?").unwrap().path, "?");
        assert_eq!(
            parse_dep_text("?=").unwrap(),
            DepText {
                optional: true,
                mode: CompareMode::Default,
                path: "=",
            }
        );
    }

    #[test]
    fn compare_mode_tags() {
        for mode in [CompareMode::Default, CompareMode::Deep, CompareMode::ShallowArray] {
            assert_eq!(CompareMode::try_from(mode.tag()).unwrap(), mode);
        }
        assert_eq!(
            CompareMode::try_from("#").unwrap_err(),
            DddiError::UnsupportedWatchMode { tag: "#".into() }
        );
    }

    #[test]
    fn text_dependency_compiles_path() {
        let compiler = PathCompiler::new();
        let dep = parse_dep_spec(&compiler, &"?=a.b".into()).unwrap();
        assert!(dep.optional);
        assert_eq!(dep.mode, CompareMode::Deep);
        assert_eq!(dep.expr.text(), "a.b");
        assert_eq!(dep.expr.eval(&Value::from(json!({"a": {"b": 4}}))), Value::from(4));
    }

    #[test]
    fn function_dependency_is_optional() {
        let dep = parse_dep_spec(&PathCompiler::new(), &DepSpec::function(|| Value::from(9))).unwrap();
        assert!(dep.optional);
        assert_eq!(dep.mode, CompareMode::Default);
        assert!(!dep.expr.is_assignable());
        assert_eq!(dep.expr.eval(&Value::Null), Value::from(9));
    }

    #[test]
    fn other_dependency_kinds_are_rejected() {
        let err = parse_dep_spec(&PathCompiler::new(), &DepSpec::from(Value::from(3))).unwrap_err();
        assert_eq!(err, DddiError::UnsupportedSpecKind { kind: "number".into() });
    }

    #[test]
    fn sequence_provider_keeps_dependency_order() {
        let spec = ProviderSpec::new(["b", "?a"], |_, args| Computation::Ready(args[0].clone()));
        let provider = parse_provider_spec(&PathCompiler::new(), &spec).unwrap();
        let texts: Vec<_> = provider.deps.iter().map(|d| d.expr.text().to_string()).collect();
        assert_eq!(texts, vec!["b", "a"]);
        assert!(!provider.deps[0].optional);
        assert!(provider.deps[1].optional);
    }

    #[test]
    fn function_provider_is_identity_over_itself() {
        let spec = ProviderSpec::function(|| Value::from("self"));
        let provider = parse_provider_spec(&PathCompiler::new(), &spec).unwrap();
        assert_eq!(provider.deps.len(), 1);

        let arg = provider.deps[0].expr.eval(&Value::Null);
        match (provider.compute)(&Value::Null, &[arg]) {
            Computation::Ready(value) => assert_eq!(value, Value::from("self")),
            _ => panic!("identity provider should be synchronous"),
        }
    }

    #[test]
    fn injected_and_unknown_specs_are_rejected() {
        let compiler = PathCompiler::new();
        let injected = ProviderSpec::Injected {
            names: vec!["a".into()],
            compute: Rc::new(|_: &Value, _: &[Value]| Computation::Ready(Value::Null)),
        };
        assert_eq!(
            parse_provider_spec(&compiler, &injected).unwrap_err(),
            DddiError::NotSupportedYet
        );
        assert_eq!(
            parse_provider_spec(&compiler, &ProviderSpec::Unsupported(Value::from(true))).unwrap_err(),
            DddiError::UnknownSpec { kind: "bool".into() }
        );
    }

    #[test]
    fn bad_paths_fail_at_parse_time() {
        let spec = ProviderSpec::new(["a..b"], |_, _| Computation::Ready(Value::Null));
        assert!(matches!(
            parse_provider_spec(&PathCompiler::new(), &spec),
            Err(DddiError::InvalidExpression { .. })
        ));
    }
}
