//! cardsync - two-way sync between markdown kanban cards and remote task lists
//!
//! Checklist lines in tagged markdown documents ("cards") are kept in step
//! with task lists on a remote to-do service. Neither side is authoritative:
//! each fetch compares the two snapshots against the changes already known,
//! and each sync applies those changes in both directions.
//!
//! # Module Organization
//!
//! - `task`, `collection`: the entity model
//! - `codec`: checklist line and card document encoding
//! - `delta`, `resolver`: pending changes and how they are computed
//! - `engine`: the orchestrator, with `queue` and `throttle`
//! - `remote`, `graph`: the remote service trait and its HTTP client
//! - `vault`: card documents on disk
//! - `watch`: the long-running file watcher
//! - `reorder`: checklist sorting by status
//! - `config`, `error`, `lock`, `output`, `cli`: the ambient plumbing

pub mod cli;
pub mod codec;
pub mod collection;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lock;
pub mod output;
pub mod queue;
pub mod remote;
pub mod reorder;
pub mod resolver;
pub mod task;
pub mod throttle;
pub mod vault;
pub mod watch;

pub use error::{Error, Result};
