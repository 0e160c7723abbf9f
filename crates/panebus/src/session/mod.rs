//! Agent session registry: one row per `session_id`, denormalized from the
//! most recent event.

mod models;
mod repository;

pub use models::{AgentSession, SessionStatus};
pub use repository::SessionRepository;
