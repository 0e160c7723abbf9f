//! Wire types for panebus agent communication.
//!
//! This crate defines the formats crossing the daemon's process boundary:
//!
//! ```text
//! Agent hook --[HTTP: AgentEvent]--> Daemon --[SSE: notification frames]--> Dashboard
//!                                      |
//!                               terminal panes
//! ```
//!
//! The daemon never talks to a model vendor; an agent's terminal pane is the
//! only channel back to it, and [`TerminalHandle`] is the address of that
//! channel.

pub mod events;
pub mod terminal;

pub use events::{AgentEvent, EventCategory};
pub use terminal::TerminalHandle;
