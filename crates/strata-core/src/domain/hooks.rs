//! Stack hooks: named callbacks run before or after a stack action.

use std::fmt;
use std::sync::Arc;

use serde_yaml::Value;

use super::StackId;

/// The stack action a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackAction {
    Create,
    Update,
    Delete,
}

impl StackAction {
    pub const ALL: [StackAction; 3] = [Self::Create, Self::Update, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Delete => 2,
        }
    }
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTiming {
    Pre,
    Post,
}

impl HookTiming {
    pub const ALL: [HookTiming; 2] = [Self::Pre, Self::Post];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Pre => 0,
            Self::Post => 1,
        }
    }
}

impl fmt::Display for HookTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook sees when it is invoked.
#[derive(Debug, Clone)]
pub struct HookContext<'a> {
    pub name: &'a str,
    pub stack: Option<StackId>,
    pub stack_name: &'a str,
    pub action: StackAction,
    pub timing: HookTiming,
    pub arg: Option<&'a Value>,
}

pub type HookMethod = Arc<dyn Fn(&HookContext<'_>) -> Result<(), String> + Send + Sync>;
pub type HookCacheMethod = Arc<dyn Fn(&HookContext<'_>) -> String + Send + Sync>;

/// One registered hook.
#[derive(Clone)]
pub struct Hook {
    pub name: String,
    pub action: StackAction,
    pub timing: HookTiming,
    pub method: HookMethod,
    pub cache_method: Option<HookCacheMethod>,
    pub arg: Option<Value>,
    /// Bound when the hooks are attached to a stack.
    pub stack: Option<StackId>,
}

impl Hook {
    fn context<'a>(&'a self, stack_name: &'a str) -> HookContext<'a> {
        HookContext {
            name: &self.name,
            stack: self.stack,
            stack_name,
            action: self.action,
            timing: self.timing,
            arg: self.arg.as_ref(),
        }
    }

    pub fn invoke(&self, stack_name: &str) -> Result<(), String> {
        (self.method)(&self.context(stack_name))
    }

    pub fn cache_id(&self, stack_name: &str) -> Option<String> {
        self.cache_method
            .as_ref()
            .map(|method| method(&self.context(stack_name)))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("timing", &self.timing)
            .field("cached", &self.cache_method.is_some())
            .field("stack", &self.stack)
            .finish()
    }
}

/// Hooks bucketed by action and timing. Insertion order is preserved within
/// each bucket.
#[derive(Debug, Clone, Default)]
pub struct StackHooks {
    buckets: [[Vec<Hook>; 2]; 3],
    stack: Option<StackId>,
}

impl StackHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under every action in `actions`.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        actions: &[StackAction],
        timing: HookTiming,
        method: HookMethod,
        cache_method: Option<HookCacheMethod>,
        arg: Option<Value>,
    ) {
        let name = name.into();
        for &action in actions {
            self.buckets[action.index()][timing.index()].push(Hook {
                name: name.clone(),
                action,
                timing,
                method: Arc::clone(&method),
                cache_method: cache_method.clone(),
                arg: arg.clone(),
                stack: self.stack,
            });
        }
    }

    /// Append every hook of `other`, bucket by bucket.
    pub fn merge(&mut self, other: StackHooks) {
        let stack = self.stack;
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets) {
            for (bucket, incoming) in mine.iter_mut().zip(theirs) {
                bucket.extend(incoming.into_iter().map(|mut hook| {
                    hook.stack = stack.or(hook.stack);
                    hook
                }));
            }
        }
    }

    /// Bind every hook to its owning stack.
    pub fn bind(&mut self, stack: StackId) {
        self.stack = Some(stack);
        for hook in self.buckets.iter_mut().flatten().flatten() {
            hook.stack = Some(stack);
        }
    }

    pub fn bucket(&self, action: StackAction, timing: HookTiming) -> &[Hook] {
        &self.buckets[action.index()][timing.index()]
    }

    /// Every hook, ordered by action then timing.
    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.buckets.iter().flatten().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Concatenated cache contributions of create and update hooks.
    pub fn cache_id(&self, stack_name: &str) -> String {
        [StackAction::Create, StackAction::Update]
            .into_iter()
            .flat_map(|action| HookTiming::ALL.map(|timing| self.bucket(action, timing)))
            .flatten()
            .filter_map(|hook| hook.cache_id(stack_name))
            .collect()
    }
}
