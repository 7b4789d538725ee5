//! Change Detection
//!
//! The engine never polls values itself. It hands zero-argument accessors to
//! a [`ChangeDetector`] together with a comparison policy and a listener, and
//! the detector calls the listener whenever the accessor's value changes
//! under that policy.
//!
//! # Comparison Policies
//!
//! - [`WatchMode::Reference`]: identity (`Value::same`).
//! - [`WatchMode::Deep`]: structural equality.
//! - [`WatchMode::Collection`]: element-wise identity of an array (or
//!   key-wise identity of an object), ignoring the container's own identity.
//!
//! The crate ships [`Digest`], a dirty-checking implementation. Hosts with
//! their own change detection implement the trait instead.

mod digest;

pub use digest::{Digest, DigestStats};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::expr::BoundGetter;
use crate::value::Value;

/// Called with `(new, old)` when a watched value changes.
pub type Listener = Box<dyn FnMut(&Value, &Value) -> Result<()>>;

/// Subscription service used by the engine.
pub trait ChangeDetector {
    /// Watch `getter` under `mode`.
    ///
    /// The listener must be called once with `(value, value)` to establish a
    /// baseline, and again on every change.
    fn watch(&self, getter: BoundGetter, mode: WatchMode, listener: Listener) -> Unwatch;

    /// Run change detection until values settle.
    fn digest(&self) -> Result<DigestStats>;
}

/// How a watch decides that its value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    Reference,
    Deep,
    Collection,
}

impl WatchMode {
    /// The value to remember for the next comparison.
    pub fn baseline(self, value: &Value) -> Value {
        match self {
            WatchMode::Reference => value.clone(),
            WatchMode::Deep => value.deep_copy(),
            WatchMode::Collection => value.shallow_copy(),
        }
    }

    /// Whether `new` differs from a baseline taken with [`WatchMode::baseline`].
    pub fn changed(self, baseline: &Value, new: &Value) -> bool {
        match self {
            WatchMode::Reference => !baseline.same(new),
            WatchMode::Deep => baseline != new,
            WatchMode::Collection => collection_changed(baseline, new),
        }
    }
}

fn collection_changed(baseline: &Value, new: &Value) -> bool {
    match (baseline, new) {
        (Value::Array(old), Value::Array(new)) => {
            let old = old.borrow();
            let new = new.borrow();
            old.len() != new.len() || old.iter().zip(new.iter()).any(|(a, b)| !a.same(b))
        }
        (Value::Object(old), Value::Object(new)) => {
            let old = old.borrow();
            let new = new.borrow();
            old.len() != new.len()
                || new
                    .iter()
                    .any(|(key, value)| old.get(key).map_or(true, |prev| !prev.same(value)))
        }
        (old, new) => !old.same(new),
    }
}

/// Unique identifier for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    /// Generate a new unique watch ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

/// Detaches a subscription.
///
/// Consumed by [`Unwatch::unwatch`], so it can run at most once. Dropping it
/// without calling `unwatch` leaves the subscription in place.
#[must_use = "dropping an Unwatch leaves the subscription installed"]
pub struct Unwatch(Box<dyn FnOnce()>);

impl Unwatch {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(f))
    }

    /// A handle that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Combine several handles into one that detaches them all.
    pub fn all(handles: impl IntoIterator<Item = Unwatch>) -> Self {
        let handles: Vec<Unwatch> = handles.into_iter().collect();
        Self::new(move || {
            for handle in handles {
                handle.unwatch();
            }
        })
    }

    /// Detach the subscription.
    pub fn unwatch(self) {
        (self.0)();
    }
}

impl fmt::Debug for Unwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unwatch")
    }
}
