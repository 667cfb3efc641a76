//! Shared protocol types for the coordinator/executor pair.
//!
//! The coordinator and executor never read each other's storage. Everything
//! they agree on travels through the messages defined here, published on the
//! logical subjects in [`subjects`]. The [`MessageBus`] trait keeps the
//! transport swappable: production uses NATS, tests and single-process
//! deployments use the in-process bus.

mod bus;
mod memory;
mod messages;
mod nats;
pub mod subjects;

pub use bus::{BusError, BusResult, InboundMessage, MessageBus, MessageStream, publish_json};
pub use memory::InProcessBus;
pub use messages::{AcquireFailure, AcquireRequest, AcquireSuccess, CleanupAck, CleanupRequest};
pub use nats::NatsBus;
