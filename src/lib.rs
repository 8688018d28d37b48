//! repoflow - serialized git access with merge/rebase/stash orchestration
//!
//! repoflow funnels every access to a working copy through one worker per
//! repository, pauses while external git processes hold lock files, retries
//! remote operations with fresh credentials, and drives merge, rebase and
//! branch switch through a shared stash/resolve skeleton.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line front end (parses args, delegates to the engine)
//! - [`engine`] - Scheduler, lock gate and watcher, router, orchestrator
//! - [`auth`] - Credential providers and the retry coordinator
//! - [`git`] - Single interface for all Git operations
//! - [`core`] - Domain types, cancellation, caching, configuration
//! - [`ui`] - Dispatcher, progress monitors, prompts, output
//! - [`logging`] - Tracing subscriber setup
//!
//! # Correctness Invariants
//!
//! 1. A repository handle is only touched by its worker thread
//! 2. Tasks on one handle run one at a time, in submission order
//! 3. No task starts while another process holds a lock in the git dir
//! 4. An aborted merge or rebase leaves HEAD and the index as they were

pub mod auth;
pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod logging;
pub mod ui;
