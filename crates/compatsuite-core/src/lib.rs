//! compatsuite core - index model, filter expressions and xfail resolution
//!
//! This crate holds everything the orchestrator knows before a single
//! process is spawned: the validated project index, the restricted filter
//! language used to select tasks, the expected-failure matcher, and the
//! run configuration file.

pub mod config;
pub mod error;
pub mod index;
pub mod predicate;
pub mod xfail;

pub use config::{Config, RunConfig};
pub use error::{CompatError, ConfigError, LoadError, PredicateError, Result};
pub use index::{
    load_index, Action, ActionKind, CompatibilityEntry, Index, Platform, Project, TagSet, Verb,
    XFailRule, XcodeContainer, XcodeSelector,
};
pub use predicate::{compile, evaluate, Attributes, CompiledPredicate, Filter, TASK_ATTRIBUTES};
pub use xfail::{classify, resolve, MatchContext, Outcome};
