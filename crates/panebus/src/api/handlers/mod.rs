//! Request handlers, grouped by domain.

pub mod agents;
pub mod context;
pub mod events;
pub mod messages;
pub mod misc;
pub mod rules;
pub mod tasks;
