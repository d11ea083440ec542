//! Stack builders for manifest entries.

mod template_file;

pub use template_file::TemplateFileBuilder;

use strata_core::application::services::{BuilderRegistry, ResourceKind};

/// A registry with every builder this crate provides.
pub fn default_registry() -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    registry.register(ResourceKind::TemplateFile, Box::new(TemplateFileBuilder));
    registry
}
