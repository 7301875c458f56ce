//! kettle-lib: the build-graph resolution engine behind `kettle`.
//!
//! Declarative manifests describe packages, their targets and the
//! configurations that select them. This crate turns those declarations into
//! an ordered, cached, reproducible build:
//! - `compose`: expands a root configuration for a host into requirements
//! - `graph`: builds the requirement graph of the active packages
//! - `plan`: orders the closure of the requested targets
//! - `provider`: resolves each target once per checksum and propagates metadata
//! - `execute`: runs the plan in parallel through a `ToolchainExecutor`
//!
//! [`engine::Engine`] ties these together.

pub mod build_lock;
pub mod checksum;
pub mod compose;
pub mod consts;
pub mod engine;
pub mod environment;
pub mod error;
pub mod execute;
pub mod glob;
pub mod graph;
pub mod host;
pub mod ident;
pub mod manifest;
pub mod plan;
pub mod platform;
pub mod provider;
pub mod util;
