//! Side-effecting adapters: hosting service, agent process, git, config, CI plumbing.

pub mod agent;
pub mod ci;
pub mod config;
pub mod git;
pub mod github;
pub mod hosting;
pub mod outputs;
pub mod process;
pub mod prompt;
