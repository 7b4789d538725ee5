//! Array-Scoped Bindings
//!
//! An [`ArrayRegistrar`] applies assignments to every element of one array.
//! Each element index is a *slot* with its own bound copy of every registered
//! assignment.
//!
//! # Slot Lifecycle
//!
//! A single collection watch follows the array. On every change:
//!
//! 1. If the value is not an array, every slot is torn down.
//! 2. Slots are kept from the front for as long as the element at each index
//!    is the same item the slot was created for. From the first index whose
//!    item changed, slots are torn down high to low.
//! 3. Slots are then created low to high up to the new length, each one
//!    installing every registered assignment.
//!
//! Slots are positional: removing an item from the middle recreates every
//! slot above it, even though the items there only moved.
//!
//! # Contexts
//!
//! Dependencies are read from a fresh object per evaluation holding the
//! slot item's fields plus `$scope` (the engine scope) and `$index`. Targets
//! are written into the *live* array element at the slot's index.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::reactor::Reactor;
use crate::binding::{bind_assignment, Assignment, ProviderSpec};
use crate::error::Result;
use crate::expr::{bind_expr, BoundGetter, Context, ExpressionCompiler};
use crate::util::{collapse, resize_array, ResizeHooks};
use crate::value::{Object, Value};
use crate::watch::{Unwatch, WatchMode};

type SlotHandles = SmallVec<[(Rc<str>, Unwatch); 2]>;

struct ArrayInner {
    reactor: Reactor,
    compiler: Rc<dyn ExpressionCompiler>,
    array_text: Rc<str>,
    array_getter: BoundGetter,
    assignments: RefCell<IndexMap<Rc<str>, Rc<Assignment>>>,
    /// The item each slot was created for.
    array_cache: RefCell<Vec<Value>>,
    /// Per-slot binding handles, keyed by assignment target text.
    slots: RefCell<Vec<SlotHandles>>,
    size_watch: RefCell<Option<Unwatch>>,
}

/// Tears down the bindings of each destroyed slot.
struct SlotTeardown;

impl ResizeHooks<SlotHandles> for SlotTeardown {
    fn post_destroy(&mut self, _index: usize, handles: SlotHandles, _seq: &[SlotHandles]) {
        for (_, unwatch) in handles {
            unwatch.unwatch();
        }
    }
}

/// Snapshots the item of each created slot and installs its bindings.
struct SlotInstall<'a> {
    inner: &'a ArrayInner,
    items: &'a [Value],
}

impl ResizeHooks<Value> for SlotInstall<'_> {
    fn pre_create(&mut self, index: usize, _seq: &[Value]) -> Value {
        self.items.get(index).cloned().unwrap_or_default()
    }

    fn post_create(&mut self, index: usize, item: &Value, _seq: &[Value]) {
        self.inner.install_all_at(index, item);
    }
}

impl ArrayInner {
    fn sync(&self, value: &Value) {
        let items = match value {
            Value::Array(array) => array.to_vec(),
            _ => {
                tracing::debug!(array = %self.array_text, "no longer an array, tearing down");
                self.resize(&[], 0);
                return;
            }
        };

        let unchanged = self
            .array_cache
            .borrow()
            .iter()
            .zip(&items)
            .take_while(|(cached, item)| cached.same(item))
            .count();

        tracing::trace!(array = %self.array_text, len = items.len(), unchanged, "resizing");
        self.resize(&items, unchanged);
        self.resize(&items, items.len());
    }

    fn resize(&self, items: &[Value], len: usize) {
        let mut slots = mem::take(&mut *self.slots.borrow_mut());
        resize_array(&mut slots, len, &mut SlotTeardown);
        *self.slots.borrow_mut() = slots;

        let mut cache = mem::take(&mut *self.array_cache.borrow_mut());
        resize_array(&mut cache, len, &mut SlotInstall { inner: self, items });
        *self.array_cache.borrow_mut() = cache;
    }

    fn install_all_at(&self, index: usize, item: &Value) {
        let assignments: Vec<(Rc<str>, Rc<Assignment>)> = self
            .assignments
            .borrow()
            .iter()
            .map(|(key, assignment)| (Rc::clone(key), Rc::clone(assignment)))
            .collect();

        for (key, assignment) in assignments {
            self.install_at(index, key, &assignment, item);
        }
    }

    fn install_at(&self, index: usize, key: Rc<str>, assignment: &Assignment, item: &Value) {
        let item = item.clone();
        let scope = self.reactor.scope().clone();
        let dep_context = Context::dynamic(move || {
            let context = Object::new();
            if let Some(fields) = item.as_object() {
                for (name, value) in fields.borrow().iter() {
                    context.insert(name.clone(), value.clone());
                }
            }
            context.insert("$scope", scope.clone());
            context.insert("$index", Value::from(index));
            Value::Object(context)
        });

        let array_getter = Rc::clone(&self.array_getter);
        let target_context = Context::dynamic(move || array_getter().at(index));

        let mut bound = bind_assignment(assignment, dep_context, Some(target_context));
        bound.target_text = Rc::from(format!("{}[{}].{}", self.array_text, index, key));

        let unwatch = self.reactor.install(bound);
        match self.slots.borrow_mut().get_mut(index) {
            Some(slot) => slot.push((key, unwatch)),
            None => unwatch.unwatch(),
        }
    }

    /// Remove `key`'s binding from every slot.
    fn uninstall(&self, key: &str) {
        let mut removed = Vec::new();
        for slot in self.slots.borrow_mut().iter_mut() {
            let (matching, rest): (SlotHandles, SlotHandles) =
                mem::take(slot).into_iter().partition(|(k, _)| &**k == key);
            *slot = rest;
            removed.extend(matching.into_iter().map(|(_, unwatch)| unwatch));
        }
        Unwatch::all(removed).unwatch();
    }

    fn dispose(&self) {
        if let Some(unwatch) = self.size_watch.borrow_mut().take() {
            unwatch.unwatch();
        }
        self.resize(&[], 0);
        self.assignments.borrow_mut().clear();
    }
}

/// Registers assignments against every element of one array.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct ArrayRegistrar {
    inner: Rc<ArrayInner>,
}

impl ArrayRegistrar {
    /// Track the array at `array_text` in the reactor's scope.
    pub fn new(reactor: Reactor, compiler: Rc<dyn ExpressionCompiler>, array_text: &str) -> Result<Self> {
        let array_expr = compiler.compile(array_text)?;
        let array_getter = bind_expr(&array_expr, Context::Static(reactor.scope().clone())).getter();
        let detector = Rc::clone(reactor.detector());

        let inner = Rc::new(ArrayInner {
            reactor,
            compiler,
            array_text: Rc::from(array_text),
            array_getter: Rc::clone(&array_getter),
            assignments: RefCell::new(IndexMap::new()),
            array_cache: RefCell::new(Vec::new()),
            slots: RefCell::new(Vec::new()),
            size_watch: RefCell::new(None),
        });

        // Identity-stable view of the array; `Null` when it is not one.
        let collapsed = collapse({
            let array_getter = Rc::clone(&array_getter);
            move || array_getter()
        });
        let watched: BoundGetter = Rc::new(move || match array_getter() {
            Value::Array(_) => collapsed(),
            _ => Value::Null,
        });

        inner.sync(&watched());

        let weak: Weak<ArrayInner> = Rc::downgrade(&inner);
        let unwatch = detector.watch(
            watched,
            WatchMode::Collection,
            Box::new(move |new, _| {
                if let Some(inner) = weak.upgrade() {
                    inner.sync(new);
                }
                Ok(())
            }),
        );
        *inner.size_watch.borrow_mut() = Some(unwatch);

        Ok(Self { inner })
    }

    /// The tracked array's path text.
    pub fn array_text(&self) -> &str {
        &self.inner.array_text
    }

    /// Number of slots currently tracked.
    pub fn len(&self) -> usize {
        self.inner.array_cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles manage the same array.
    pub fn ptr_eq(&self, other: &ArrayRegistrar) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register `target` (relative to each element) and install it on every
    /// existing slot.
    ///
    /// Registering the same target text again replaces the earlier
    /// assignment on every slot.
    pub fn register(&self, target: &str, spec: ProviderSpec) -> Result<ArrayRegistration> {
        let inner = &self.inner;
        let assignment = Rc::new(Assignment::new(&*inner.compiler, target, &spec)?);
        let key = Rc::clone(&assignment.target_text);

        if inner.assignments.borrow().contains_key(&key) {
            tracing::debug!(array = %inner.array_text, target = %key, "replacing assignment");
            inner.uninstall(&key);
        }
        inner
            .assignments
            .borrow_mut()
            .insert(Rc::clone(&key), Rc::clone(&assignment));

        let items = inner.array_cache.borrow().clone();
        for (index, item) in items.iter().enumerate() {
            inner.install_at(index, Rc::clone(&key), &assignment, item);
        }

        Ok(ArrayRegistration {
            inner: Rc::downgrade(inner),
            assignment,
        })
    }

    /// Stop tracking the array and uninstall every slot binding.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for ArrayRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRegistrar")
            .field("array", &self.inner.array_text)
            .field("len", &self.len())
            .field("assignments", &self.inner.assignments.borrow().len())
            .finish()
    }
}

/// Handle for one array-scoped assignment.
///
/// Dropping it keeps the assignment installed.
#[must_use = "dropping an ArrayRegistration leaves the assignment installed"]
pub struct ArrayRegistration {
    inner: Weak<ArrayInner>,
    assignment: Rc<Assignment>,
}

impl ArrayRegistration {
    pub fn target(&self) -> &str {
        &self.assignment.target_text
    }

    /// Remove the assignment and uninstall it from every slot.
    ///
    /// Does nothing if the assignment has since been replaced.
    pub fn unregister(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let key = &self.assignment.target_text;

        let current = inner
            .assignments
            .borrow()
            .get(key)
            .is_some_and(|registered| Rc::ptr_eq(registered, &self.assignment));
        if !current {
            return;
        }

        inner.assignments.borrow_mut().shift_remove(key);
        inner.uninstall(key);
    }
}

impl fmt::Debug for ArrayRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRegistration")
            .field("target", &self.target())
            .finish()
    }
}
