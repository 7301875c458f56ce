//! Canonical names for targets, capabilities, configurations and packages.
//!
//! Every name in a manifest is an [`Identifier`]: one or more `/`-separated
//! segments such as `vizor-platform` or `Library/Vizor/Platform`. Targets are
//! additionally qualified by their owning package through [`TargetKey`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Reasons an identifier string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
  #[error("identifier is empty")]
  Empty,

  #[error("identifier '{0}' has an empty segment")]
  EmptySegment(String),

  #[error("identifier '{ident}' contains invalid character {ch:?}")]
  InvalidChar { ident: String, ch: char },
}

/// A validated name used as a graph node or lookup key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
  pub fn new(value: impl Into<String>) -> Result<Self, IdentError> {
    let value = value.into();
    if value.is_empty() {
      return Err(IdentError::Empty);
    }
    if let Some(ch) = value.chars().find(|c| c.is_whitespace() || c.is_control() || *c == ':') {
      return Err(IdentError::InvalidChar { ident: value, ch });
    }
    if value.split('/').any(str::is_empty) {
      return Err(IdentError::EmptySegment(value));
    }
    Ok(Self(value))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Iterate over the `/`-separated segments.
  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0.split('/')
  }
}

impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Identifier {
  type Err = IdentError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s)
  }
}

impl TryFrom<&str> for Identifier {
  type Error = IdentError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl AsRef<str> for Identifier {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl<'de> Deserialize<'de> for Identifier {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Identifier::new(raw).map_err(serde::de::Error::custom)
  }
}

/// Globally unique identity of a target: its package plus its name.
///
/// Displayed as `package:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetKey {
  pub package: Identifier,
  pub name: Identifier,
}

impl TargetKey {
  pub fn new(package: Identifier, name: Identifier) -> Self {
    Self { package, name }
  }
}

impl fmt::Display for TargetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.package, self.name)
  }
}

/// A user-supplied target reference: either `name` or `package:name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
  pub package: Option<Identifier>,
  pub name: Identifier,
}

impl FromStr for TargetRef {
  type Err = IdentError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some((package, name)) => Ok(Self {
        package: Some(Identifier::new(package)?),
        name: Identifier::new(name)?,
      }),
      None => Ok(Self {
        package: None,
        name: Identifier::new(s)?,
      }),
    }
  }
}

impl fmt::Display for TargetRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.package {
      Some(package) => write!(f, "{}:{}", package, self.name),
      None => write!(f, "{}", self.name),
    }
  }
}
