//! Engine Facade
//!
//! An [`Engine`] is one binding session over one scope object. It owns the
//! session's collaborators (expression compiler, change detector, async
//! bridge) and the per-session registry of array registrars.
//!
//! # Example
//!
//! ```rust
//! use dddi_core::{Computation, Engine, ProviderSpec, Value};
//! use serde_json::json;
//!
//! let engine = Engine::new(Value::from(json!({"a": 1, "b": 2}))).unwrap();
//! let _sum = engine
//!     .register("sum", ProviderSpec::new(["a", "b"], |_, args| {
//!         Computation::ready(args.iter().filter_map(Value::as_f64).sum::<f64>())
//!     }))
//!     .unwrap();
//! assert_eq!(engine.scope().get("sum"), Value::from(3));
//!
//! engine.scope().as_object().unwrap().insert("a", Value::from(5));
//! engine.digest().unwrap();
//! assert_eq!(engine.scope().get("sum"), Value::from(7));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::binding::{bind_assignment, Assignment, ProviderSpec};
use crate::config::EngineConfig;
use crate::error::{DddiError, Result};
use crate::expr::{bind_expr, Context, ExpressionCompiler, PathCompiler};
use crate::reactive::{ArrayRegistrar, AsyncBridge, LocalTaskBridge, Reactor};
use crate::util::{resize_array, ResizeHooks};
use crate::value::{Array, Value};
use crate::watch::{ChangeDetector, Digest, DigestStats, Unwatch, WatchMode};

/// Builder for an [`Engine`] with custom configuration or collaborators.
pub struct EngineBuilder {
    scope: Value,
    config: EngineConfig,
    compiler: Option<Rc<dyn ExpressionCompiler>>,
    detector: Option<Rc<dyn ChangeDetector>>,
    bridge: Option<Rc<dyn AsyncBridge>>,
}

impl EngineBuilder {
    fn new(scope: Value) -> Self {
        Self {
            scope,
            config: EngineConfig::default(),
            compiler: None,
            detector: None,
            bridge: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compiler<C>(mut self, compiler: C) -> Self
    where
        C: ExpressionCompiler + 'static,
    {
        self.compiler = Some(Rc::new(compiler));
        self
    }

    /// Use a host-provided change detector instead of a fresh [`Digest`].
    pub fn detector(mut self, detector: Rc<dyn ChangeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Use a host-provided async bridge instead of a [`LocalTaskBridge`].
    pub fn bridge(mut self, bridge: Rc<dyn AsyncBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Validate the configuration and create the engine.
    ///
    /// A `Null` scope is replaced by an empty object; any other non-object
    /// scope is rejected.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let scope = match self.scope {
            Value::Null => Value::object(),
            scope @ Value::Object(_) => scope,
            other => {
                return Err(DddiError::InvalidConfig(format!(
                    "scope must be an object, got {}",
                    other.type_name()
                )))
            }
        };

        let compiler: Rc<dyn ExpressionCompiler> = match self.compiler {
            Some(compiler) => compiler,
            None => Rc::new(PathCompiler::new()),
        };
        let detector: Rc<dyn ChangeDetector> = match self.detector {
            Some(detector) => detector,
            None => Rc::new(Digest::with_config(&self.config)),
        };

        let mut local_tasks = None;
        let bridge: Rc<dyn AsyncBridge> = match self.bridge {
            Some(bridge) => bridge,
            None => {
                let tasks = LocalTaskBridge::new();
                local_tasks = Some(tasks.clone());
                Rc::new(tasks)
            }
        };

        let reactor = Reactor::new(Rc::clone(&detector), bridge, scope.clone());

        tracing::debug!(digest_ttl = self.config.digest_ttl, "engine created");

        Ok(Engine {
            scope,
            compiler,
            detector,
            reactor,
            arrays: RefCell::new(HashMap::new()),
            local_tasks,
            config: self.config,
        })
    }
}

/// A binding session over one scope.
pub struct Engine {
    scope: Value,
    compiler: Rc<dyn ExpressionCompiler>,
    detector: Rc<dyn ChangeDetector>,
    reactor: Reactor,
    arrays: RefCell<HashMap<String, ArrayRegistrar>>,
    local_tasks: Option<LocalTaskBridge>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with default collaborators.
    pub fn new(scope: Value) -> Result<Self> {
        Self::builder(scope).build()
    }

    pub fn builder(scope: Value) -> EngineBuilder {
        EngineBuilder::new(scope)
    }

    pub fn scope(&self) -> &Value {
        &self.scope
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Rc<dyn ExpressionCompiler> {
        &self.compiler
    }

    pub fn detector(&self) -> &Rc<dyn ChangeDetector> {
        &self.detector
    }

    /// The default async bridge, when no custom bridge was supplied.
    ///
    /// Asynchronous providers only make progress while its task set is
    /// driven, e.g. with [`LocalTaskBridge::run_until`].
    pub fn local_tasks(&self) -> Option<&LocalTaskBridge> {
        self.local_tasks.as_ref()
    }

    /// Bind `target` in the scope to the value of `spec`.
    ///
    /// The target is computed once before this returns, and again whenever a
    /// dependency changes.
    pub fn register(&self, target: &str, spec: ProviderSpec) -> Result<Registration> {
        let assignment = Assignment::new(&*self.compiler, target, &spec)?;
        let bound = bind_assignment(&assignment, Context::Static(self.scope.clone()), None);
        Ok(Registration {
            target: Rc::clone(&assignment.target_text),
            unwatch: self.reactor.install(bound),
        })
    }

    /// The registrar for the array at `path`, created on first use.
    pub fn for_array(&self, path: &str) -> Result<ArrayRegistrar> {
        let key = path.trim();
        if let Some(registrar) = self.arrays.borrow().get(key) {
            return Ok(registrar.clone());
        }

        let registrar = ArrayRegistrar::new(self.reactor.clone(), Rc::clone(&self.compiler), key)?;
        self.arrays
            .borrow_mut()
            .insert(key.to_string(), registrar.clone());
        Ok(registrar)
    }

    /// Keep the array at `target` as long as the array at `source`.
    ///
    /// `hooks` see every slot created in or removed from the target. If the
    /// target is absent it is initialized to an empty array. Once linked, a
    /// target that stops being an array fails the update with
    /// `StaleTargetVanished`, reported through [`Engine::digest`].
    pub fn link_array<H>(&self, target: &str, source: &str, hooks: H) -> Result<Unwatch>
    where
        H: ResizeHooks<Value> + 'static,
    {
        let target_expr = bind_expr(
            &self.compiler.compile(target)?,
            Context::Static(self.scope.clone()),
        );
        let source_expr = bind_expr(
            &self.compiler.compile(source)?,
            Context::Static(self.scope.clone()),
        );

        match target_expr.get() {
            Value::Array(_) => {}
            Value::Null if target_expr.is_assignable() => {
                target_expr.assign(Value::Array(Array::new()))?;
            }
            _ => {
                return Err(DddiError::NonWritableTarget {
                    target: target.to_string(),
                })
            }
        }

        let mut hooks = hooks;
        let target_text = target.to_string();
        let mut update = move |source: &Value| -> Result<()> {
            let Value::Array(array) = target_expr.get() else {
                return Err(DddiError::StaleTargetVanished {
                    target: target_text.clone(),
                });
            };

            let len = source.as_array().map_or(0, Array::len);
            let mut items = mem::take(&mut *array.borrow_mut());
            resize_array(&mut items, len, &mut hooks);
            *array.borrow_mut() = items;
            Ok(())
        };

        update(&source_expr.get())?;

        tracing::debug!(target_path = target, source, "linking array");
        Ok(self.detector.watch(
            source_expr.getter(),
            WatchMode::Collection,
            Box::new(move |new, _| update(new)),
        ))
    }

    /// Run the session's change detector.
    pub fn digest(&self) -> Result<DigestStats> {
        self.detector.digest()
    }

    /// Tear down every array registrar. Scalar registrations stay with
    /// their handles.
    pub fn dispose(self) {
        let arrays = mem::take(&mut *self.arrays.borrow_mut());
        for registrar in arrays.into_values() {
            registrar.dispose();
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("arrays", &self.arrays.borrow().len())
            .finish()
    }
}

/// Handle for a scalar registration.
#[must_use = "dropping a Registration leaves the binding installed"]
pub struct Registration {
    target: Rc<str>,
    unwatch: Unwatch,
}

impl Registration {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Uninstall the binding. Pending results are discarded.
    pub fn unregister(self) {
        self.unwatch.unwatch();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("target", &self.target)
            .finish()
    }
}
