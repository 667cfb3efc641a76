pub mod models;
pub mod repository;
pub mod service;

pub use models::{Project, ProjectStatus, Session};
pub use repository::SessionRepository;
pub use service::{SessionError, SessionOrchestrator};
