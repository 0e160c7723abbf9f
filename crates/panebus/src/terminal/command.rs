//! Agent launch commands and multiplexer detection.

use std::env;

use panebus_protocol::TerminalHandle;

/// Quote a string for `sh -c` use, escaping embedded single quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Build the shell command that launches an agent session.
///
/// `claude` takes its prompt via `--print --prompt`; other agent CLIs get a
/// plain `--prompt`. The working directory becomes a `cd` prefix so the
/// command also works in multiplexers without a native cwd flag.
pub fn build_agent_command(agent: &str, prompt: &str, cwd: &str) -> String {
    let mut parts = Vec::new();
    if !cwd.is_empty() {
        parts.push(format!("cd {} &&", shell_quote(cwd)));
    }

    parts.push(agent.to_string());

    if !prompt.is_empty() {
        if agent == "claude" {
            parts.push("--print".to_string());
        }
        parts.push("--prompt".to_string());
        parts.push(shell_quote(prompt));
    }

    parts.join(" ")
}

/// Detect the multiplexer this process is running inside from its
/// environment. Only the server-identity fields are populated; pane ids come
/// from spawning.
pub fn detect_ambient() -> Option<TerminalHandle> {
    detect_from(&|key| env::var(key).ok())
}

fn detect_from(var: &dyn Fn(&str) -> Option<String>) -> Option<TerminalHandle> {
    if let Some(tmux) = var("TMUX") {
        let socket = tmux.split(',').next().unwrap_or_default().to_string();
        return Some(TerminalHandle::Tmux {
            tmux_socket: socket,
            tmux_pane: String::new(),
        });
    }
    if let Some(session) = var("ZELLIJ_SESSION_NAME") {
        return Some(TerminalHandle::Zellij {
            zellij_session: session,
        });
    }
    if var("KITTY_WINDOW_ID").is_some() {
        return Some(TerminalHandle::Kitty {
            kitty_window_id: String::new(),
            kitty_socket: var("KITTY_LISTEN_ON").unwrap_or_default(),
        });
    }
    if var("WEZTERM_PANE").is_some() {
        return Some(TerminalHandle::Wezterm {
            wezterm_pane: String::new(),
            wezterm_socket: var("WEZTERM_UNIX_SOCKET").unwrap_or_default(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn quote_handles_hostile_input() {
        let hostile = "'; rm -rf /";
        let quoted = shell_quote(hostile);
        assert_eq!(quoted, r#"''\''; rm -rf /'"#);
        // Concatenating the quoted pieces yields the original literal.
        let unquoted: String = quoted
            .trim_matches('\'')
            .replace(r#"'\''"#, "'")
            .to_string();
        assert!(unquoted.contains("rm -rf /"));
    }

    #[test]
    fn claude_gets_print_flag() {
        let cmd = build_agent_command("claude", "fix the tests", "/work");
        assert_eq!(cmd, "cd '/work' && claude --print --prompt 'fix the tests'");
    }

    #[test]
    fn generic_agent_gets_plain_prompt() {
        let cmd = build_agent_command("codex", "review", "");
        assert_eq!(cmd, "codex --prompt 'review'");
    }

    #[test]
    fn no_prompt_no_flags() {
        assert_eq!(build_agent_command("gemini", "", ""), "gemini");
    }

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn detects_tmux_socket_before_comma() {
        let vars = env_of(&[("TMUX", "/tmp/tmux-1000/default,12345,0")]);
        let handle = detect_from(&|k| vars.get(k).cloned()).unwrap();
        assert_eq!(
            handle,
            TerminalHandle::Tmux {
                tmux_socket: "/tmp/tmux-1000/default".to_string(),
                tmux_pane: String::new(),
            }
        );
    }

    #[test]
    fn tmux_wins_over_other_multiplexers() {
        let vars = env_of(&[("TMUX", "/tmp/s,1,0"), ("KITTY_WINDOW_ID", "4")]);
        let handle = detect_from(&|k| vars.get(k).cloned()).unwrap();
        assert_eq!(handle.multiplexer(), "tmux");
    }

    #[test]
    fn detects_kitty_listen_socket() {
        let vars = env_of(&[
            ("KITTY_WINDOW_ID", "4"),
            ("KITTY_LISTEN_ON", "unix:/tmp/kitty"),
        ]);
        let handle = detect_from(&|k| vars.get(k).cloned()).unwrap();
        assert_eq!(
            handle,
            TerminalHandle::Kitty {
                kitty_window_id: String::new(),
                kitty_socket: "unix:/tmp/kitty".to_string(),
            }
        );
    }

    #[test]
    fn nothing_detected_outside_a_multiplexer() {
        assert_eq!(detect_from(&|_| None), None);
    }
}
