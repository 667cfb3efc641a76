//! Logical queue subjects.
//!
//! Delivery is at-least-once with no ordering assumed across subjects. The
//! only ordering the protocol relies on is that one publisher's own stream
//! is not reordered, so a response can never precede its request.

/// Coordinator -> executor: [`crate::AcquireRequest`].
pub const ACQUIRE_REQUEST: &str = "container.acquire.request";

/// Executor -> coordinator: [`crate::AcquireSuccess`].
pub const ACQUIRE_SUCCESS: &str = "container.acquire.success";

/// Executor -> coordinator: [`crate::AcquireFailure`].
pub const ACQUIRE_FAILURE: &str = "container.acquire.failure";

/// Coordinator -> executor: [`crate::CleanupRequest`].
pub const CLEANUP_REQUEST: &str = "container.cleanup.request";

/// Executor -> coordinator: [`crate::CleanupAck`].
pub const CLEANUP_ACK: &str = "container.cleanup.ack";
