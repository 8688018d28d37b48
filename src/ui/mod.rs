//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`dispatch`] - Running prompts on the host's UI thread
//! - [`progress`] - Progress monitors
//! - [`prompts`] - Interactive prompts and confirmations
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! The engine only sees traits from this module. Terminal implementations
//! back the CLI; recording and scripted implementations back the tests.

pub mod dispatch;
pub mod output;
pub mod progress;
pub mod prompts;
