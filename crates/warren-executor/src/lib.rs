//! Warren executor: owns ephemeral sandbox containers.
//!
//! Consumes acquire/cleanup requests from the coordinator, resolves them
//! through a session-keyed container pool with single-flight creation and
//! idle eviction, and answers over the bus. The pool is the sole owner of
//! container teardown.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod pool;
