//! Shared state agents can read and write through the daemon: scoped
//! context variables and flat daemon preferences.

mod repository;

pub use repository::{ContextRepository, ContextVariable, PreferenceRepository};
