//! Low-level building blocks shared by the reactor and the array manager.
//!
//! Both are also re-exported from [`crate::utils`] for direct use by hosts.

mod collapse;
mod resize;

pub use collapse::{collapse, collapse_with};
pub use resize::{resize_array, NoHooks, ResizeHooks};
