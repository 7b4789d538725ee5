//! Change Reactor
//!
//! Installs a [`BoundAssignment`] as a live binding.
//!
//! # How a Binding Works
//!
//! 1. On install, the binding evaluates once so the target is correct from
//!    the start.
//!
//! 2. Dependencies are grouped by comparison mode and watched:
//!    - default mode: one reference watch, or a collection watch over a
//!      collapsed array when there are several dependencies
//!    - deep mode: the same, but with deep watches
//!    - shallow-array mode: one collection watch per dependency
//!
//! 3. Every watch callback runs a reaction: evaluate all dependencies in
//!    declaration order, skip the provider (and commit `Null`) if a required
//!    dependency is absent, otherwise call it.
//!
//! 4. The reaction's result becomes the pending token, superseding (and
//!    cancelling, when possible) the previous one. A result is committed only
//!    if its token is still the pending one when it settles.
//!
//! Provider failures are logged against the target path and never leave the
//! reaction.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::computation::{AsyncBridge, AsyncValue, CancelHandle, Computation};
use crate::binding::{BoundAssignment, BoundDependency, CompareMode, ComputeFn};
use crate::error::ProviderError;
use crate::expr::{BoundExpr, BoundGetter};
use crate::util::collapse;
use crate::value::Value;
use crate::watch::{ChangeDetector, Listener, Unwatch, WatchMode};

/// Installs bindings against a change detector and async bridge.
#[derive(Clone)]
pub struct Reactor {
    detector: Rc<dyn ChangeDetector>,
    bridge: Rc<dyn AsyncBridge>,
    scope: Value,
}

struct PendingToken {
    id: u64,
    cancel: Option<CancelHandle>,
}

enum Resolution {
    Settled(Result<Value, ProviderError>),
    Deferred(AsyncValue),
}

/// One installed binding.
struct ChangeAction {
    target_text: Rc<str>,
    target: BoundExpr,
    compute: ComputeFn,
    deps: Vec<BoundDependency>,
    scope: Value,
    pending: RefCell<Option<PendingToken>>,
    next_token: Cell<u64>,
    detached: Cell<bool>,
    bridge: Rc<dyn AsyncBridge>,
    detector: Weak<dyn ChangeDetector>,
}

impl ChangeAction {
    fn react(self: &Rc<Self>) {
        if self.detached.get() {
            return;
        }

        let args: Vec<Value> = self.deps.iter().map(BoundDependency::get).collect();
        let valid = self
            .deps
            .iter()
            .zip(&args)
            .all(|(dep, arg)| dep.optional || !arg.is_null());

        let computation = if valid {
            (self.compute)(&self.scope, args.as_slice())
        } else {
            Computation::Ready(Value::Null)
        };

        let (resolution, cancel) = match computation {
            Computation::Ready(value) => (Resolution::Settled(Ok(value)), None),
            Computation::Failed(err) => (Resolution::Settled(Err(err)), None),
            Computation::Pending(future) => (Resolution::Deferred(future), None),
            Computation::Cancellable(future, cancel) => (Resolution::Deferred(future), Some(cancel)),
        };

        let token = self.supersede(cancel);

        match resolution {
            Resolution::Settled(result) => {
                self.settle(token, result);
            }
            Resolution::Deferred(future) => {
                let this = Rc::downgrade(self);
                self.bridge.resolve(
                    future,
                    Box::new(move |result| {
                        if let Some(this) = this.upgrade() {
                            if this.settle(token, result) {
                                this.request_digest();
                            }
                        }
                    }),
                );
            }
        }
    }

    /// Make a new token current, cancelling the one it replaces.
    fn supersede(&self, cancel: Option<CancelHandle>) -> u64 {
        let id = self.next_token.get() + 1;
        self.next_token.set(id);

        let previous = self.pending.replace(Some(PendingToken { id, cancel }));
        if let Some(PendingToken {
            cancel: Some(cancel),
            ..
        }) = previous
        {
            cancel.cancel();
        }
        id
    }

    /// Handle a settled result. Returns whether the target was written.
    fn settle(&self, token: u64, result: Result<Value, ProviderError>) -> bool {
        {
            let mut pending = self.pending.borrow_mut();
            if pending.as_ref().map(|p| p.id) != Some(token) {
                tracing::trace!(target_path = %self.target_text, "ignoring stale result");
                return false;
            }
            *pending = None;
        }

        match result {
            Ok(value) => {
                tracing::trace!(target_path = %self.target_text, value = %value, "updating");
                match self.target.assign(value) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(target_path = %self.target_text, error = %err, "commit failed");
                        false
                    }
                }
            }
            Err(err) => {
                tracing::warn!(target_path = %self.target_text, error = %err, "provider failed");
                false
            }
        }
    }

    fn request_digest(&self) {
        if let Some(detector) = self.detector.upgrade() {
            if let Err(err) = detector.digest() {
                tracing::warn!(target_path = %self.target_text, error = %err, "digest after async commit failed");
            }
        }
    }

    /// Stop reacting and drop (cancelling if possible) any pending result.
    fn detach(&self) {
        self.detached.set(true);
        if let Some(PendingToken {
            cancel: Some(cancel),
            ..
        }) = self.pending.take()
        {
            cancel.cancel();
        }
    }
}

fn listener(action: &Rc<ChangeAction>) -> Listener {
    let action = Rc::clone(action);
    Box::new(move |_, _| {
        action.react();
        Ok(())
    })
}

impl Reactor {
    /// A reactor whose providers see `scope` as their ambient context.
    pub fn new(detector: Rc<dyn ChangeDetector>, bridge: Rc<dyn AsyncBridge>, scope: Value) -> Self {
        Self {
            detector,
            bridge,
            scope,
        }
    }

    pub fn scope(&self) -> &Value {
        &self.scope
    }

    pub fn detector(&self) -> &Rc<dyn ChangeDetector> {
        &self.detector
    }

    /// Install `bound` and return the handle that uninstalls it.
    pub fn install(&self, bound: BoundAssignment) -> Unwatch {
        tracing::debug!(target_path = %bound.target_text, "watching");

        let action = Rc::new(ChangeAction {
            target_text: Rc::clone(&bound.target_text),
            target: bound.target,
            compute: bound.provider.compute,
            deps: bound.provider.deps,
            scope: self.scope.clone(),
            pending: RefCell::new(None),
            next_token: Cell::new(0),
            detached: Cell::new(false),
            bridge: Rc::clone(&self.bridge),
            detector: Rc::downgrade(&self.detector),
        });

        action.react();

        let mut groups: IndexMap<CompareMode, SmallVec<[BoundGetter; 4]>> = IndexMap::new();
        for dep in &action.deps {
            groups.entry(dep.mode).or_default().push(dep.getter());
        }

        let mut unwatchers: Vec<Unwatch> = Vec::new();
        for (mode, getters) in groups {
            match mode {
                CompareMode::Default => unwatchers.push(self.watch_group(
                    getters,
                    WatchMode::Reference,
                    WatchMode::Collection,
                    &action,
                )),
                CompareMode::Deep => unwatchers.push(self.watch_group(
                    getters,
                    WatchMode::Deep,
                    WatchMode::Deep,
                    &action,
                )),
                CompareMode::ShallowArray => {
                    for getter in getters {
                        unwatchers.push(self.detector.watch(
                            getter,
                            WatchMode::Collection,
                            listener(&action),
                        ));
                    }
                }
            }
        }

        Unwatch::new(move || {
            tracing::debug!(target_path = %action.target_text, "unwatching");
            action.detach();
            Unwatch::all(unwatchers).unwatch();
        })
    }

    /// Watch one comparison group: directly if it has a single member,
    /// otherwise through a collapsed array of all members.
    fn watch_group(
        &self,
        getters: SmallVec<[BoundGetter; 4]>,
        single: WatchMode,
        multiple: WatchMode,
        action: &Rc<ChangeAction>,
    ) -> Unwatch {
        if getters.len() == 1 {
            let getter = Rc::clone(&getters[0]);
            return self.detector.watch(getter, single, listener(action));
        }

        let combined = collapse(move || Value::array(getters.iter().map(|get| get())));
        self.detector.watch(combined, multiple, listener(action))
    }
}
