//! Strata Core - Hexagonal Architecture Implementation
//!
//! This crate provides the domain and application layers for the Strata
//! stack orchestration engine, following hexagonal (ports and adapters)
//! architecture.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           strata-cli (CLI)              │
//! │  (Parses flags, builds the Engine)      │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Application Services            │
//! │  (Engine, OutputsStore, Builders)       │
//! │   validate / provision / delete passes  │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │      Application Ports (Traits)         │
//! │ (Filesystem, CloudFormation, Reporter)  │
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     strata-adapters (Infrastructure)    │
//! │ (LocalFilesystem, MemoryCloudFormation) │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Domain Layer (Pure Logic)       │
//! │ (Reference, Stack, StackGroup, diff)    │
//! │         No External Effects             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_core::prelude::*;
//!
//! # fn run(mut engine: Engine) -> StrataResult<()> {
//! // 1. Register groups and stacks (normally done by builders)
//! let group = engine.add_group("network", "ne-dev", "", None)?;
//! let template = StackTemplate::new("vpc", "netenv.ne.dev.network")
//!     .with_body("Resources: {}\n");
//! engine.add_stack(group, NewStack::new("netenv.ne.dev.network", "dev", "us-west-2", template))?;
//!
//! // 2. Run the passes
//! engine.validate()?;
//! engine.provision()?;
//! engine.finish()?;
//! # Ok(())
//! # }
//! ```

// Re-export domain layer (stable, well-defined API)
pub mod domain;

// Re-export application layer (orchestration logic)
pub mod application;

// Re-export error types
pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        BuildRequest, BuilderRegistry, Engine, EngineOptions, ResourceKind, StackBuilder,
        ports::{
            CloudFormation, ConfirmationPort, Filesystem, ModelResolver, ModelValue, Reporter,
            SessionProvider,
        },
    };
    pub use crate::domain::{
        GroupId, HookTiming, NewStack, Reference, StackAction, StackHooks, StackId, StackOrder,
        StackStatus, StackTags, StackTemplate,
    };
    pub use crate::error::{StrataError, StrataResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
