//! Event log: immutable records of what happened at each agent.

mod models;
mod repository;

pub use models::{EventFilter, EventRecord};
pub use repository::EventRepository;
