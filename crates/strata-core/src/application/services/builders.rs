//! Resource builder registry.
//!
//! Builders turn one manifest entry into one or more stacks registered on
//! the engine. The engine itself never names a concrete builder; callers
//! dispatch through [`BuilderRegistry`] by [`ResourceKind`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::{
    application::ApplicationError,
    domain::{GroupId, StackId},
    error::StrataResult,
};

use super::engine::Engine;

/// Closed set of resource kinds a manifest may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// A pre-rendered template file.
    TemplateFile,
    Alb,
    Asg,
    Lambda,
    S3Bucket,
    Iam,
    Kms,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemplateFile => "template-file",
            Self::Alb => "alb",
            Self::Asg => "asg",
            Self::Lambda => "lambda",
            Self::S3Bucket => "s3-bucket",
            Self::Iam => "iam",
            Self::Kms => "kms",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manifest entry handed to a builder.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub kind: ResourceKind,
    pub group: GroupId,
    pub account: String,
    pub region: String,
    /// The raw entry; each builder reads the fields it knows.
    pub entry: Value,
}

/// Turns a manifest entry into stacks.
pub trait StackBuilder: Send + Sync {
    fn build(&self, engine: &mut Engine, request: &BuildRequest) -> StrataResult<Vec<StackId>>;
}

#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<ResourceKind, Box<dyn StackBuilder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, builder: Box<dyn StackBuilder>) {
        self.builders.insert(kind, builder);
    }

    pub fn is_registered(&self, kind: ResourceKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Dispatch `request` to the builder for its kind.
    pub fn build(&self, engine: &mut Engine, request: &BuildRequest) -> StrataResult<Vec<StackId>> {
        let builder =
            self.builders
                .get(&request.kind)
                .ok_or_else(|| ApplicationError::BuilderNotRegistered {
                    kind: request.kind.to_string(),
                })?;
        debug!(kind = %request.kind, group = %request.group, "Dispatching builder");
        builder.build(engine, request)
    }
}
