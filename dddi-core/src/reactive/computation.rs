//! Computations and the Async Bridge
//!
//! Whether a result is synchronous, asynchronous, or asynchronous and
//! cancellable is a property of the [`Computation`] variant, fixed when the
//! provider returns it.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use tokio::task::LocalSet;

use crate::error::ProviderError;
use crate::value::Value;

/// An in-flight provider result.
pub type AsyncValue = LocalBoxFuture<'static, Result<Value, ProviderError>>;

/// Continuation invoked with the settled result.
pub type Settle = Box<dyn FnOnce(Result<Value, ProviderError>)>;

/// Aborts an in-flight computation.
pub struct CancelHandle(Box<dyn FnOnce()>);

impl CancelHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(f))
    }

    pub fn cancel(self) {
        (self.0)();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// What a provider's compute function produced.
pub enum Computation {
    Ready(Value),
    Failed(ProviderError),
    Pending(AsyncValue),
    Cancellable(AsyncValue, CancelHandle),
}

impl Computation {
    pub fn ready(value: impl Into<Value>) -> Self {
        Computation::Ready(value.into())
    }

    pub fn fail(error: impl Into<ProviderError>) -> Self {
        Computation::Failed(error.into())
    }

    /// An asynchronous result.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, ProviderError>> + 'static,
    {
        Computation::Pending(future.boxed_local())
    }

    /// An asynchronous result that can be cancelled when superseded.
    pub fn cancellable<F, C>(future: F, cancel: C) -> Self
    where
        F: Future<Output = Result<Value, ProviderError>> + 'static,
        C: FnOnce() + 'static,
    {
        Computation::Cancellable(future.boxed_local(), CancelHandle::new(cancel))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Computation::Pending(_) | Computation::Cancellable(..))
    }
}

impl From<Value> for Computation {
    fn from(value: Value) -> Self {
        Computation::Ready(value)
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Computation::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Computation::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            Computation::Pending(_) => f.write_str("Pending"),
            Computation::Cancellable(..) => f.write_str("Cancellable"),
        }
    }
}

/// Resolves asynchronous computations.
///
/// `settle` must run after `resolve` returns, never inside it.
pub trait AsyncBridge {
    fn resolve(&self, value: AsyncValue, settle: Settle);
}

/// Runs computations as tasks on a tokio [`LocalSet`].
///
/// Tasks only make progress while the set is driven, e.g. through
/// [`LocalTaskBridge::run_until`].
#[derive(Clone, Default)]
pub struct LocalTaskBridge {
    tasks: Rc<LocalSet>,
}

impl LocalTaskBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive pending computations while `future` runs.
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.tasks.run_until(future).await
    }

    pub fn local_set(&self) -> &LocalSet {
        &self.tasks
    }
}

impl AsyncBridge for LocalTaskBridge {
    fn resolve(&self, value: AsyncValue, settle: Settle) {
        self.tasks.spawn_local(async move {
            let result = value.await;
            settle(result);
        });
    }
}

impl fmt::Debug for LocalTaskBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalTaskBridge")
    }
}
