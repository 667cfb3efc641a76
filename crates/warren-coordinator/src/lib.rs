//! Front-line coordinator for container-backed workspace sessions.
//!
//! Holds the durable session store, orchestrates session open/close, and
//! reaps idle sessions. Container work is delegated to the executor over
//! the message bus; the coordinator never touches a container engine.

pub mod config;
pub mod db;
pub mod handlers;
pub mod project;
pub mod session;
