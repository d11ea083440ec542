//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `strata-adapters` and
//! `strata-cli` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by the engine, implemented by infrastructure
//!   - `Filesystem`: Build and applied state files
//!   - `CloudFormation` / `SessionProvider`: Provider calls and credentials
//!   - `ConfirmationPort`: Yes/no prompts
//!   - `ModelResolver`: Project model lookups for `paco.ref`
//!   - `Reporter`: Operator-facing action lines and diffs
//!
//! - **Driving (Input) Ports**: Called by external world, implemented by application
//!   - (Defined in CLI layer, implemented by `Engine`)

pub mod output;

pub use output::{
    CloudFormation, ConfirmationPort, CreateStackInput, Filesystem, ModelResolver, ModelValue,
    ProviderError, ProviderErrorKind, Reporter, SessionProvider, StackDescription, StackEvent,
    StackOutput, SubmitOutcome, UpdateStackInput, Waiter,
};
