//! dddi Core
//!
//! This crate provides the runtime for dddi, a declarative dependency-binding
//! engine. Callers declare that a location in a scope object is computed from
//! other locations, and the engine keeps it up to date. It implements:
//!
//! - Dependency and provider spec parsing (`"?=path"`, `"@items"`, ...)
//! - Reactive recomputation with last-write-wins async results
//! - Per-element bindings over arrays
//! - A dirty-checking change detector and a path expression compiler
//!
//! The engine is single-threaded. Asynchronous providers are futures resolved
//! on a tokio `LocalSet`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the shared, mutable value model bindings read and write
//! - `expr`: expression compilation and binding to contexts
//! - `binding`: spec parsing, providers and assignments
//! - `watch`: change detection
//! - `reactive`: the reactor, computations and array registrars
//! - `engine`: the session facade
//!
//! # Example
//!
//! ```rust
//! use dddi_core::{Computation, Engine, ProviderSpec, Value};
//! use serde_json::json;
//!
//! let engine = Engine::new(Value::from(json!({"price": 4, "qty": null}))).unwrap();
//!
//! // `qty` is required, so the provider is skipped while it is null.
//! let _total = engine
//!     .register("total", ProviderSpec::new(["price", "qty"], |_, args| {
//!         Computation::ready(args.iter().filter_map(Value::as_f64).product::<f64>())
//!     }))
//!     .unwrap();
//! assert!(engine.scope().get("total").is_null());
//!
//! engine.scope().as_object().unwrap().insert("qty", Value::from(2));
//! engine.digest().unwrap();
//! assert_eq!(engine.scope().get("total"), Value::from(8));
//! ```

pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod reactive;
mod util;
pub mod value;
pub mod watch;

pub use binding::{CompareMode, DepSpec, ProviderSpec};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, Registration};
pub use error::{DddiError, ProviderError, Result};
pub use expr::{BoundExpr, Context, Expr, ExpressionCompiler, PathCompiler};
pub use reactive::{
    ArrayRegistrar, ArrayRegistration, AsyncBridge, CancelHandle, Computation, LocalTaskBridge,
};
pub use value::{Array, Object, Value};
pub use watch::{ChangeDetector, Digest, DigestStats, Unwatch, WatchMode};

/// Low-level primitives for direct use by hosts.
pub mod utils {
    pub use crate::binding::{bind_assignment, bind_provider, parse_dep_spec, parse_provider_spec};
    pub use crate::expr::bind_expr;
    pub use crate::util::{collapse, collapse_with, resize_array, NoHooks, ResizeHooks};
}
