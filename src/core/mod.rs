//! core
//!
//! Domain types and shared building blocks.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, BranchName, RepoFingerprint
//! - [`cancel`] - Cooperative cancellation token
//! - [`cache`] - Single-entry cache keyed by an invalidation key
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Repository path layout

pub mod cache;
pub mod cancel;
pub mod config;
pub mod paths;
pub mod types;
