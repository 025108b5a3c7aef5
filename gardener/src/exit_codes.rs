//! Stable exit codes for gardener CLI commands.

/// Command completed, including normal stops (capacity, no work, agent failure, escalation).
pub const OK: i32 = 0;
/// Invalid invocation or an error surfaced from git or the hosting service.
pub const INVALID: i32 = 1;
/// `gardener run` received an event type it does not handle.
pub const UNKNOWN_EVENT: i32 = 2;
