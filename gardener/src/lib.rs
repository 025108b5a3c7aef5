//! Event-driven PR gardener.
//!
//! Each invocation handles one CI event: it decides whether to request new
//! improvement work from a coding agent, iterates on review feedback for
//! pull requests it opened, and escalates to a human once a pull request
//! reaches its iteration ceiling. All state lives on the hosting service
//! (labels, pull request bodies), so runs share nothing in process.
//!
//! - **[`core`]**: Pure, deterministic logic (events, categories, iteration
//!   metadata, labels, agent output conventions). No I/O.
//! - **[`io`]**: Side-effecting adapters (hosting service, agent process, git,
//!   config, CI plumbing). Traits at the hosting and agent seams so tests can
//!   substitute fakes.
//!
//! Orchestration modules ([`orchestrator`], [`select`], [`locks`], [`open_pr`])
//! coordinate core logic with I/O to implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod locks;
pub mod logging;
pub mod open_pr;
pub mod orchestrator;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
