// ============================================================================
//  CLEAN MODULE BOUNDARIES
// ============================================================================

//! Core domain layer for Strata.
//!
//! Pure logic only. All provider calls, filesystem access and prompting are
//! handled via ports (traits) defined in the application layer.
//!
//! ## Hexagonal Architecture Compliance
//!
//! - **No async**: Domain logic is synchronous
//! - **No I/O**: No filesystem, network, or external calls
//! - **Arena ids**: Stacks and groups refer to each other by id
//! - **Typed references**: `paco.ref` strings are parsed once into [`Reference`]
//!
pub mod cache;
pub mod diff;
pub mod error;
pub mod group;
pub mod hooks;
pub mod log;
pub mod outputs;
pub mod parameter;
pub mod reference;
pub mod stack;
pub mod status;
pub mod sub;
pub mod tags;

// Re-exports for convenience
pub use cache::{CacheInputs, cache_id, md5_hex};
pub use diff::{Change, advisories, deep_diff};
pub use error::{DomainError, ErrorCategory};
pub use group::{FilterPrefix, GroupState, Member, OrderItem, StackGroup, StackOrder};
pub use hooks::{
    Hook, HookCacheMethod, HookContext, HookMethod, HookTiming, StackAction, StackHooks,
};
pub use log::{LogPolicy, format_action_col};
pub use outputs::{OUTPUT_LEAF, lookup_leaf, merge_mappings, output_dict};
pub use parameter::{
    OutputEntry, Parameter, ParameterEntry, ParameterMode, ParameterRecord, ParameterSet,
    StackOutputParam, marshal_list, marshal_value,
};
pub use reference::{REF_PREFIX, Reference, TokenContext, is_ref};
pub use stack::{GroupId, NewStack, Stack, StackId, StackOutputConfig, StackTemplate, stack_name};
pub use status::StackStatus;
pub use sub::{SUB_TOKEN, SubExpression};
pub use tags::{MARKER_TAG, StackTags, Tag};
