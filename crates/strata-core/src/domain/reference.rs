//! Typed `paco.ref` references.
//!
//! A reference is parsed once from its string form and passed around as a
//! [`Reference`] value. Substitution tokens (`<account>`, `<environment>`,
//! `<region>`) are expanded before parsing by [`TokenContext::substitute`].

use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Literal prefix every reference starts with.
pub const REF_PREFIX: &str = "paco.ref ";

/// Cheap prefix check.
pub fn is_ref(s: &str) -> bool {
    s.starts_with(REF_PREFIX)
}

/// A parsed `paco.ref <part>.<part>...` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    raw: String,
    parts: Vec<String>,
    account: Option<String>,
    region: Option<String>,
}

impl Reference {
    /// Parse a reference. Input without the `paco.ref ` prefix is rejected.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let path = s
            .strip_prefix(REF_PREFIX)
            .map(str::trim)
            .ok_or_else(|| DomainError::InvalidReference { raw: s.to_string() })?;

        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(DomainError::InvalidReference { raw: s.to_string() });
        }

        let parts: Vec<String> = path.split('.').map(str::to_string).collect();
        if parts.iter().any(String::is_empty) {
            return Err(DomainError::InvalidReference { raw: s.to_string() });
        }

        Ok(Self {
            raw: s.to_string(),
            parts,
            account: None,
            region: None,
        })
    }

    /// Build a reference from a dotted path, with or without the prefix.
    pub fn from_path(path: &str) -> Result<Self, DomainError> {
        if is_ref(path) {
            Self::parse(path)
        } else {
            Self::parse(&format!("{REF_PREFIX}{path}"))
        }
    }

    /// The original string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Ordered path segments.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The dotted path without the prefix.
    pub fn path(&self) -> String {
        self.parts.join(".")
    }

    /// First path segment, which keys the outputs store.
    pub fn root(&self) -> &str {
        // parse() guarantees at least one segment
        self.parts.first().map(String::as_str).unwrap_or_default()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// A new reference with `attr` appended as a final segment.
    pub fn join(&self, attr: &str) -> Result<Self, DomainError> {
        let mut joined = Self::from_path(&format!("{}.{}", self.path(), attr))?;
        joined.account = self.account.clone();
        joined.region = self.region.clone();
        Ok(joined)
    }

    /// True if `prefix` equals this path or is a dotted prefix of it.
    pub fn is_under(&self, prefix: &str) -> bool {
        let path = self.path();
        path == prefix || path.starts_with(&format!("{prefix}."))
    }
}

impl FromStr for Reference {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

// ── Token substitution ──────────────────────────────────────────────────────

/// Values for the `<account>`, `<environment>` and `<region>` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub account: String,
    pub region: String,
    pub environment: Option<String>,
}

impl TokenContext {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            environment: None,
        }
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    /// Expand tokens in a raw reference string.
    ///
    /// `<environment>` without an environment is an error.
    pub fn substitute(&self, raw: &str) -> Result<String, DomainError> {
        let mut out = raw.replace("<account>", &self.account);
        match &self.environment {
            Some(env) => out = out.replace("<environment>", env),
            None if out.contains("<environment>") => {
                return Err(DomainError::MissingEnvironment {
                    reference: raw.to_string(),
                });
            }
            None => {}
        }
        Ok(out.replace("<region>", &self.region))
    }
}
