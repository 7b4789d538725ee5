//! Size Synchronization
//!
//! [`resize_array`] grows or shrinks a vector to a target length, calling
//! lifecycle hooks at every slot boundary it crosses:
//!
//! - growing: slots are created from low to high index
//!   (`pre_create`, push, `post_create`)
//! - shrinking: slots are destroyed from high to low index
//!   (`pre_destroy`, pop, `post_destroy`)
//!
//! Each hook runs exactly once per slot crossed. Teardown logic that looks at
//! neighbouring slots relies on this ordering.

/// Lifecycle callbacks for [`resize_array`]. Every method is optional.
pub trait ResizeHooks<T: Default> {
    /// Produce the initial value for a new slot at `index`.
    fn pre_create(&mut self, _index: usize, _seq: &[T]) -> T {
        T::default()
    }

    /// Called after the new slot has been appended.
    fn post_create(&mut self, _index: usize, _value: &T, _seq: &[T]) {}

    /// Called while the doomed slot is still in place.
    fn pre_destroy(&mut self, _index: usize, _value: &T, _seq: &[T]) {}

    /// Called with the removed value after it has been popped.
    fn post_destroy(&mut self, _index: usize, _value: T, _seq: &[T]) {}
}

/// Hooks that do nothing: growth fills with `T::default()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<T: Default> ResizeHooks<T> for NoHooks {}

/// Resize `seq` in place to `target_len`.
pub fn resize_array<T, H>(seq: &mut Vec<T>, target_len: usize, hooks: &mut H)
where
    T: Default,
    H: ResizeHooks<T> + ?Sized,
{
    while seq.len() < target_len {
        let index = seq.len();
        let value = hooks.pre_create(index, seq);
        seq.push(value);
        hooks.post_create(index, &seq[index], seq);
    }

    while seq.len() > target_len {
        let index = seq.len() - 1;
        hooks.pre_destroy(index, &seq[index], seq);
        if let Some(value) = seq.pop() {
            hooks.post_destroy(index, value, seq);
        }
    }
}
