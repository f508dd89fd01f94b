//! Reference collaborators for the hindsight change-tracking engine.
//!
//! # Overview
//!
//! This crate implements the runtime the engine observes:
//!
//! - a hierarchical [`ScopeTree`] of value namespaces with inherited reads,
//!   write-through aliases, destroy hooks, and ordered child lists,
//! - a path resolver over `serde_json::Value` (dotted segments, `[n]`
//!   indices),
//! - a dirty-checking observation primitive driven by [`ScopeTree::digest`],
//!   with rate-limited sampling via [`ScopeTree::sampled`],
//! - a deferred-task scheduler ([`ScopeTree::defer`] / [`ScopeTree::turn`]),
//! - `{{path}}` string [`interpolate`]ion,
//! - a small generic subscriber [`Bus`].
//!
//! Everything is single-threaded and cooperative: mutation happens
//! synchronously inside one turn, and the host drives reconciliation by
//! calling `digest` (or `turn`) explicitly.

pub mod bus;
pub mod interpolate;
pub mod path;
pub mod scope;

pub use bus::{Bus, SubscriptionId};
pub use interpolate::interpolate;
pub use path::{parse_path, PathError, Step};
pub use scope::{
    EvalFn, ScopeId, ScopeTree, WatchCallback, WatchHandle, WeakScopeTree, DIGEST_TTL,
};
