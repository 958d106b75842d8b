//! Quarry - a repository-style query builder.
//!
//! A [`Repository`] accumulates filters, sort keys, named scopes, a row
//! limit and eager-load relations through chained calls, then turns them
//! into one storage query when an execution method runs. Execution clears
//! the per-call state so the same repository can serve the next query.
//!
//! This crate provides both the library and the `quarry` CLI.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod activity;
pub mod config;
pub mod domain;
pub mod error;
pub mod query;
pub mod repository;
pub mod storage;

// Public CLI modules (needed by binary)
pub mod app;
pub mod cli;
pub mod output;

pub use error::{Error, Result};
pub use repository::{Repository, RepositoryOptions};
