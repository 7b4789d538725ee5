//! Binding Rules
//!
//! Parsing and binding of the declarative pieces of a registration:
//!
//! - [`spec`]: dependency and provider specs, as written by callers, parsed
//!   into descriptors.
//! - [`provider`]: providers and assignments, and their bound counterparts
//!   closed over a concrete evaluation context.
//!
//! Nothing here watches or computes anything. The reactor consumes the bound
//! forms.

pub mod provider;
pub mod spec;

pub use provider::{
    bind_assignment, bind_provider, Assignment, BoundAssignment, BoundDependency, BoundProvider,
};
pub use spec::{
    parse_dep_spec, parse_dep_text, parse_provider_spec, CompareMode, ComputeFn, DepSpec, DepText,
    DependencyDescriptor, Provider, ProviderSpec, ValueFn,
};
