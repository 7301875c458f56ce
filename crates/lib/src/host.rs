//! Host context and host predicates.
//!
//! A host predicate is a regular expression searched (unanchored) in the host
//! identifier, so `darwin` matches `aarch64-darwin`. Predicates are pure
//! functions of the host; [`HostMatcher`] compiles and evaluates each distinct
//! pattern once per resolution run.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ResolveError;
use crate::platform::host_identifier;

/// The build host that predicates are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostContext {
  identifier: String,
}

impl HostContext {
  pub fn new(identifier: impl Into<String>) -> Self {
    Self {
      identifier: identifier.into(),
    }
  }

  /// Detect the current host (e.g. `x86_64-linux`).
  pub fn detect() -> Self {
    Self::new(host_identifier())
  }

  pub fn identifier(&self) -> &str {
    &self.identifier
  }
}

impl fmt::Display for HostContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.identifier)
  }
}

/// A compiled matcher over host identifiers.
#[derive(Debug, Clone)]
pub struct HostPredicate {
  pattern: String,
  regex: Regex,
}

impl HostPredicate {
  pub fn compile(pattern: &str) -> Result<Self, ResolveError> {
    if pattern.is_empty() {
      return Err(ResolveError::HostPredicate {
        pattern: pattern.to_string(),
        message: "pattern is empty".to_string(),
      });
    }
    let regex = Regex::new(pattern).map_err(|e| ResolveError::HostPredicate {
      pattern: pattern.to_string(),
      message: e.to_string(),
    })?;
    Ok(Self {
      pattern: pattern.to_string(),
      regex,
    })
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }

  pub fn matches(&self, host: &HostContext) -> bool {
    self.regex.is_match(host.identifier())
  }
}

/// Evaluates host predicates for one host, memoizing per pattern.
#[derive(Debug)]
pub struct HostMatcher {
  host: HostContext,
  results: HashMap<String, bool>,
}

impl HostMatcher {
  pub fn new(host: HostContext) -> Self {
    Self {
      host,
      results: HashMap::new(),
    }
  }

  pub fn host(&self) -> &HostContext {
    &self.host
  }

  pub fn matches(&mut self, pattern: &str) -> Result<bool, ResolveError> {
    if let Some(&matched) = self.results.get(pattern) {
      return Ok(matched);
    }
    let matched = HostPredicate::compile(pattern)?.matches(&self.host);
    trace!(pattern, host = %self.host, matched, "evaluated host predicate");
    self.results.insert(pattern.to_string(), matched);
    Ok(matched)
  }
}
