//! Keystroke injection and pane management for agent terminals.
//!
//! The daemon never talks to a model vendor. Text typed into a pane is the
//! only way to steer an agent, and the multiplexer CLIs (tmux, kitty,
//! wezterm, zellij) are the only way to reach a pane.

mod command;
mod driver;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use panebus_protocol::TerminalHandle;

pub use command::{build_agent_command, detect_ambient, shell_quote};
pub use driver::SubprocessDriver;

/// A freshly spawned pane: the handle addressing it plus the raw pane id
/// reported by the multiplexer.
#[derive(Debug, Clone)]
pub struct SpawnedPane {
    pub handle: TerminalHandle,
    pub pane_id: String,
}

/// Terminal operations the runtime depends on.
///
/// The production implementation shells out to multiplexer CLIs; tests swap
/// in recording fakes.
#[async_trait]
pub trait PaneDriver: Send + Sync {
    /// Type literal text into the pane.
    async fn send_text(&self, handle: &TerminalHandle, text: &str) -> Result<()>;

    /// Send Ctrl-C to the pane.
    async fn send_interrupt(&self, handle: &TerminalHandle) -> Result<()>;

    /// Open a new pane next to the ambient one and launch an agent in it.
    async fn spawn_pane(&self, agent: &str, prompt: &str, cwd: &str) -> Result<SpawnedPane>;

    /// Answer an approval prompt affirmatively.
    async fn send_approve(&self, handle: &TerminalHandle) -> Result<()> {
        self.send_text(handle, "y\n").await
    }

    /// Answer an approval prompt negatively.
    async fn send_reject(&self, handle: &TerminalHandle) -> Result<()> {
        self.send_text(handle, "n\n").await
    }

    /// Interrupt the agent, give it a moment, then exit the shell.
    async fn stop_gracefully(&self, handle: &TerminalHandle) -> Result<()> {
        self.send_interrupt(handle).await?;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        self.send_text(handle, "exit\n").await
    }
}

/// Decode a persisted terminal column into a usable handle.
pub fn parse_handle(raw: &str) -> Result<TerminalHandle> {
    TerminalHandle::from_json(raw).ok_or_else(|| anyhow!("no terminal data"))
}
