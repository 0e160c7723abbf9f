//! Subprocess-backed pane driver.
//!
//! Every operation is one short-lived multiplexer CLI invocation with a hard
//! 5 second timeout. Spawn invocations capture stdout; the first trimmed
//! token is the new pane id.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use panebus_protocol::TerminalHandle;
use tokio::process::Command;
use tracing::debug;

use super::{PaneDriver, SpawnedPane, command};

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Production driver shelling out to the multiplexer CLIs.
#[derive(Debug, Default, Clone)]
pub struct SubprocessDriver;

impl SubprocessDriver {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<()> {
        self.run_capture(program, args).await.map(|_| ())
    }

    async fn run_capture(&self, program: &str, args: &[String]) -> Result<String> {
        debug!(program, ?args, "invoking multiplexer cli");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    anyhow!("command not found: {program}")
                } else {
                    anyhow!(err).context(format!("spawning {program}"))
                }
            })?;

        let output = tokio::time::timeout(SUBPROCESS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("command timed out"))?
            .with_context(|| format!("waiting for {program}"))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            bail!("exit code {}", output.status.code().unwrap_or(-1));
        }
        bail!(stderr)
    }

    async fn send_keys_tmux(&self, socket: &str, pane: &str, keys: &str, literal: bool) -> Result<()> {
        if pane.is_empty() {
            bail!("no tmux pane");
        }
        let mut args = Vec::new();
        if !socket.is_empty() {
            args.push("-S".to_string());
            args.push(socket.to_string());
        }
        args.extend(["send-keys".to_string(), "-t".to_string(), pane.to_string()]);
        if literal {
            args.push("-l".to_string());
        }
        args.push(keys.to_string());
        self.run("tmux", &args).await
    }

    async fn send_text_kitty(&self, socket: &str, window_id: &str, text: &str) -> Result<()> {
        if window_id.is_empty() {
            bail!("no kitty window id");
        }
        let mut args = vec!["@".to_string()];
        if !socket.is_empty() {
            args.push("--to".to_string());
            args.push(socket.to_string());
        }
        args.extend([
            "send-text".to_string(),
            "--match".to_string(),
            format!("id:{window_id}"),
            text.to_string(),
        ]);
        self.run("kitty", &args).await
    }

    async fn send_text_wezterm(&self, pane: &str, text: &str) -> Result<()> {
        if pane.is_empty() {
            bail!("no wezterm pane");
        }
        let args = vec![
            "cli".to_string(),
            "send-text".to_string(),
            "--pane-id".to_string(),
            pane.to_string(),
            "--no-paste".to_string(),
            text.to_string(),
        ];
        self.run("wezterm", &args).await
    }

    async fn zellij_action(&self, session: &str, action: &[&str]) -> Result<()> {
        if session.is_empty() {
            bail!("no zellij session");
        }
        let mut args = vec!["-s".to_string(), session.to_string(), "action".to_string()];
        args.extend(action.iter().map(|s| s.to_string()));
        self.run("zellij", &args).await
    }
}

#[async_trait]
impl PaneDriver for SubprocessDriver {
    async fn send_text(&self, handle: &TerminalHandle, text: &str) -> Result<()> {
        match handle {
            TerminalHandle::Tmux {
                tmux_socket,
                tmux_pane,
            } => self.send_keys_tmux(tmux_socket, tmux_pane, text, true).await,
            TerminalHandle::Kitty {
                kitty_window_id,
                kitty_socket,
            } => self.send_text_kitty(kitty_socket, kitty_window_id, text).await,
            TerminalHandle::Wezterm { wezterm_pane, .. } => {
                self.send_text_wezterm(wezterm_pane, text).await
            }
            TerminalHandle::Zellij { zellij_session } => {
                self.zellij_action(zellij_session, &["write-chars", text]).await
            }
        }
    }

    async fn send_interrupt(&self, handle: &TerminalHandle) -> Result<()> {
        match handle {
            TerminalHandle::Tmux {
                tmux_socket,
                tmux_pane,
            } => self.send_keys_tmux(tmux_socket, tmux_pane, "C-c", false).await,
            TerminalHandle::Kitty {
                kitty_window_id,
                kitty_socket,
            } => self.send_text_kitty(kitty_socket, kitty_window_id, "\x03").await,
            TerminalHandle::Wezterm { wezterm_pane, .. } => {
                self.send_text_wezterm(wezterm_pane, "\x03").await
            }
            TerminalHandle::Zellij { zellij_session } => {
                self.zellij_action(zellij_session, &["write", "3"]).await
            }
        }
    }

    async fn spawn_pane(&self, agent: &str, prompt: &str, cwd: &str) -> Result<SpawnedPane> {
        let ambient = command::detect_ambient().ok_or_else(|| {
            anyhow!("no multiplexer detected (need tmux, kitty, wezterm, or zellij)")
        })?;
        let shell_cmd = command::build_agent_command(agent, prompt, cwd);

        match ambient {
            TerminalHandle::Tmux { tmux_socket, .. } => {
                let mut args = Vec::new();
                if !tmux_socket.is_empty() {
                    args.push("-S".to_string());
                    args.push(tmux_socket.clone());
                }
                args.extend(["split-window".to_string(), "-h".to_string()]);
                if !cwd.is_empty() {
                    args.push("-c".to_string());
                    args.push(cwd.to_string());
                }
                args.push(shell_cmd);
                args.extend(["-P".to_string(), "-F".to_string(), "#{pane_id}".to_string()]);

                let pane_id = self.run_capture("tmux", &args).await?;
                Ok(SpawnedPane {
                    handle: TerminalHandle::Tmux {
                        tmux_socket,
                        tmux_pane: pane_id.clone(),
                    },
                    pane_id,
                })
            }
            TerminalHandle::Kitty { kitty_socket, .. } => {
                let mut args = vec!["@".to_string()];
                if !kitty_socket.is_empty() {
                    args.push("--to".to_string());
                    args.push(kitty_socket.clone());
                }
                args.extend([
                    "launch".to_string(),
                    "--type=window".to_string(),
                    "--keep-focus".to_string(),
                ]);
                if !cwd.is_empty() {
                    args.push("--cwd".to_string());
                    args.push(cwd.to_string());
                }
                args.extend(["sh".to_string(), "-c".to_string(), shell_cmd]);

                let window_id = self.run_capture("kitty", &args).await?;
                Ok(SpawnedPane {
                    handle: TerminalHandle::Kitty {
                        kitty_window_id: window_id.clone(),
                        kitty_socket,
                    },
                    pane_id: window_id,
                })
            }
            TerminalHandle::Wezterm { wezterm_socket, .. } => {
                let mut args = vec![
                    "cli".to_string(),
                    "split-pane".to_string(),
                    "--right".to_string(),
                ];
                if !cwd.is_empty() {
                    args.push("--cwd".to_string());
                    args.push(cwd.to_string());
                }
                args.extend(["--".to_string(), "sh".to_string(), "-c".to_string(), shell_cmd]);

                let pane_id = self.run_capture("wezterm", &args).await?;
                Ok(SpawnedPane {
                    handle: TerminalHandle::Wezterm {
                        wezterm_pane: pane_id.clone(),
                        wezterm_socket,
                    },
                    pane_id,
                })
            }
            TerminalHandle::Zellij { zellij_session } => {
                let mut args = vec![
                    "-s".to_string(),
                    zellij_session.clone(),
                    "action".to_string(),
                    "new-pane".to_string(),
                    "--direction".to_string(),
                    "right".to_string(),
                ];
                if !cwd.is_empty() {
                    args.push("--cwd".to_string());
                    args.push(cwd.to_string());
                }
                args.extend(["--".to_string(), "sh".to_string(), "-c".to_string(), shell_cmd]);

                self.run("zellij", &args).await?;
                Ok(SpawnedPane {
                    handle: TerminalHandle::Zellij {
                        zellij_session: zellij_session.clone(),
                    },
                    pane_id: zellij_session,
                })
            }
        }
    }
}
