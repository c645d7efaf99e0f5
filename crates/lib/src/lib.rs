//! knit-lib: incremental module bundling
//!
//! This crate provides the pieces of an incremental bundler:
//! - `ModuleGraph`: modules, dependency edges, fingerprints and cached transforms
//! - `Pipeline`: ordered, pluggable transform stages with line mappings
//! - `Coordinator`: parallel, cached builds linked into one artifact
//! - `WatchLoop`: generation-based rebuilds on file changes
//!
//! [`run`](run::run) ties them together from a [`BuildConfig`](config::BuildConfig).

pub mod build;
pub mod config;
pub mod consts;
pub mod detect;
pub mod graph;
pub mod pipeline;
pub mod resolve;
pub mod run;
pub mod util;
pub mod watch;
