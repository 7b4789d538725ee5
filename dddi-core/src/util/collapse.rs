//! Array Collapsing
//!
//! Watches keyed on identity need an array-valued accessor to return the
//! *same* array every time, or every evaluation looks like a change.
//! [`collapse`] wraps a function that builds a fresh array per call into one
//! that returns a single retained array whose slots are refreshed in place.
//!
//! A slot is overwritten only when the new element is not equal to the
//! retained one, so equal-but-distinct values keep the old element's
//! identity.

use std::rc::Rc;

use super::resize::{resize_array, NoHooks};
use crate::expr::BoundGetter;
use crate::value::{Array, Value};

/// Collapse `source` using deep structural equality.
pub fn collapse<F>(source: F) -> BoundGetter
where
    F: Fn() -> Value + 'static,
{
    collapse_with(source, |a: &Value, b: &Value| a == b)
}

/// Collapse `source` using a custom element equality.
///
/// A source value that is not an array is treated as empty.
pub fn collapse_with<F, E>(source: F, equals: E) -> BoundGetter
where
    F: Fn() -> Value + 'static,
    E: Fn(&Value, &Value) -> bool + 'static,
{
    let retained = Array::new();

    Rc::new(move || {
        let fresh = match source() {
            Value::Array(array) => array.to_vec(),
            _ => Vec::new(),
        };

        {
            let mut items = retained.borrow_mut();
            resize_array(&mut *items, fresh.len(), &mut NoHooks);
            for (slot, value) in items.iter_mut().zip(fresh) {
                if !equals(&value, slot) {
                    *slot = value;
                }
            }
        }

        Value::Array(retained.clone())
    })
}
