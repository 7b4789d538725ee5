//! Digest Loop
//!
//! A dirty-checking [`ChangeDetector`]. Watches are kept in installation
//! order; a digest evaluates every live watch, fires the listeners whose
//! values changed, and repeats until a whole pass is clean.
//!
//! # Algorithm
//!
//! 1. Snapshot the watch list (listeners may add or remove watches).
//! 2. For each watch not removed since the snapshot:
//!    - evaluate the getter
//!    - a watch that has never run always fires with `(new, new)`
//!    - otherwise fire with `(new, old)` if the mode reports a change
//! 3. If anything fired, or a nested digest was requested, run another pass.
//! 4. Give up with `DigestOverflow` after `digest_ttl` dirty passes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::{ChangeDetector, Listener, Unwatch, WatchId, WatchMode};
use crate::config::EngineConfig;
use crate::error::{DddiError, Result};
use crate::expr::BoundGetter;
use crate::value::Value;

/// Counters describing one digest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestStats {
    /// Passes over the watch list.
    pub passes: usize,
    /// Listener invocations.
    pub fired: usize,
}

struct WatchEntry {
    id: WatchId,
    getter: BoundGetter,
    mode: WatchMode,
    /// `None` until the first evaluation.
    last: RefCell<Option<Value>>,
    listener: RefCell<Listener>,
    removed: Cell<bool>,
}

struct Inner {
    ttl: usize,
    watches: RefCell<Vec<Rc<WatchEntry>>>,
    digesting: Cell<bool>,
    rerun: Cell<bool>,
}

/// Resets the `digesting` flag when the digest exits, including by panic.
struct DigestGuard<'a>(&'a Cell<bool>);

impl<'a> DigestGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The default change detector.
#[derive(Clone)]
pub struct Digest {
    inner: Rc<Inner>,
}

impl Digest {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                ttl: config.digest_ttl.max(1),
                watches: RefCell::new(Vec::new()),
                digesting: Cell::new(false),
                rerun: Cell::new(false),
            }),
        }
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.inner.watches.borrow().len()
    }

    pub fn is_digesting(&self) -> bool {
        self.inner.digesting.get()
    }

    fn run_passes(&self) -> Result<DigestStats> {
        let inner = &self.inner;
        let mut stats = DigestStats::default();
        let mut first_error: Option<DddiError> = None;

        loop {
            if stats.passes >= inner.ttl {
                tracing::warn!(ttl = inner.ttl, "digest did not settle");
                return Err(DddiError::DigestOverflow { ttl: inner.ttl });
            }
            stats.passes += 1;
            inner.rerun.set(false);

            let snapshot: Vec<Rc<WatchEntry>> = inner.watches.borrow().clone();
            let mut dirty = false;

            for entry in snapshot {
                if entry.removed.get() {
                    continue;
                }

                let new = (entry.getter)();
                let old = entry.last.borrow().clone();
                let changed = match &old {
                    None => true,
                    Some(old) => entry.mode.changed(old, &new),
                };
                if !changed {
                    continue;
                }

                dirty = true;
                stats.fired += 1;
                *entry.last.borrow_mut() = Some(entry.mode.baseline(&new));
                let old = old.unwrap_or_else(|| new.clone());

                let outcome = {
                    let mut listener = entry.listener.borrow_mut();
                    (&mut **listener)(&new, &old)
                };
                if let Err(err) = outcome {
                    tracing::warn!(watch = ?entry.id, error = %err, "watch listener failed");
                    first_error.get_or_insert(err);
                }
            }

            if !dirty && !inner.rerun.get() {
                break;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector for Digest {
    fn watch(&self, getter: BoundGetter, mode: WatchMode, listener: Listener) -> Unwatch {
        let entry = Rc::new(WatchEntry {
            id: WatchId::new(),
            getter,
            mode,
            last: RefCell::new(None),
            listener: RefCell::new(listener),
            removed: Cell::new(false),
        });
        let id = entry.id;
        self.inner.watches.borrow_mut().push(entry);

        let inner: Weak<Inner> = Rc::downgrade(&self.inner);
        Unwatch::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.watches.borrow_mut().retain(|entry| {
                    if entry.id == id {
                        entry.removed.set(true);
                        false
                    } else {
                        true
                    }
                });
            }
        })
    }

    fn digest(&self) -> Result<DigestStats> {
        if self.inner.digesting.get() {
            // Re-entrant request: let the running digest do another pass.
            self.inner.rerun.set(true);
            return Ok(DigestStats::default());
        }

        let _guard = DigestGuard::enter(&self.inner.digesting);
        self.run_passes()
    }
}
