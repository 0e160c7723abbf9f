//! Agent mesh: structured messages between sessions, delivered by typing
//! into the target agent's pane. Coordination rules decide whether a message
//! flows automatically, waits for approval, or is blocked.

mod models;
mod repository;
mod service;

pub use models::{CreateMessage, MeshOutcome, MessageRecord, MessageStatus};
pub use repository::MessageRepository;
pub use service::MeshRouter;
