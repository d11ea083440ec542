//! Application services - orchestrate use cases.
//!
//! The [`Engine`] drives every stack lifecycle operation. The remaining
//! modules are its collaborators: the applied-state layout, the outputs
//! store and the builder registry.

pub mod builders;
pub mod engine;
pub mod layout;
pub mod outputs_store;

pub use builders::{BuildRequest, BuilderRegistry, ResourceKind, StackBuilder};
pub use engine::{Engine, EngineOptions, Resolved};
pub use layout::StateLayout;
pub use outputs_store::OutputsStore;
