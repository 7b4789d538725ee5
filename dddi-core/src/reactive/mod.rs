//! Reactive Recomputation
//!
//! This module turns bound assignments into live bindings.
//!
//! # Concepts
//!
//! ## Computations
//!
//! A provider's compute function returns a [`Computation`]: a ready value, a
//! failure, or a future (optionally cancellable). Futures are handed to an
//! [`AsyncBridge`], which resolves them outside the digest that started them.
//!
//! ## Reactor
//!
//! The [`Reactor`] installs one binding: it evaluates immediately, watches
//! the dependencies grouped by comparison mode, recomputes on every change,
//! and commits only the result of the most recently started computation.
//!
//! ## Array Bindings
//!
//! An [`ArrayRegistrar`] repeats a set of assignments for every element of a
//! watched array, installing and tearing down per-slot bindings as the array
//! grows and shrinks.

mod array;
mod computation;
mod reactor;

pub use array::{ArrayRegistrar, ArrayRegistration};
pub use computation::{AsyncBridge, AsyncValue, CancelHandle, Computation, LocalTaskBridge, Settle};
pub use reactor::Reactor;
