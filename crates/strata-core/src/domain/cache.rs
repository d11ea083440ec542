//! Content hashes for the applied-state cache.

use md5::{Digest, Md5};

/// Hex md5 digest of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Everything that feeds a stack's cache id.
#[derive(Debug, Clone, Copy)]
pub struct CacheInputs<'a> {
    pub template_body: &'a str,
    /// Parameter values in insertion order.
    pub parameter_values: &'a [String],
    pub tags_id: &'a str,
    pub hooks_id: &'a str,
    pub termination_protection: bool,
}

/// Compute the cache id.
///
/// The result is a single md5 hex digest over the concatenation of the
/// template md5, the md5 of the concatenated parameter values, the optional
/// `TPEnabled` token, the hook cache ids and the tag id.
pub fn cache_id(inputs: &CacheInputs<'_>) -> String {
    let mut id = md5_hex(inputs.template_body.as_bytes());
    id.push_str(&md5_hex(inputs.parameter_values.concat().as_bytes()));
    if inputs.termination_protection {
        id.push_str("TPEnabled");
    }
    id.push_str(inputs.hooks_id);
    id.push_str(inputs.tags_id);
    md5_hex(id.as_bytes())
}
