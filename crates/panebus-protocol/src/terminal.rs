//! Terminal pane addresses.
//!
//! A [`TerminalHandle`] names one multiplexer pane. It is serialized as a
//! flat JSON object carrying a `multiplexer` discriminator plus the fields
//! that variant needs, e.g.
//!
//! ```json
//! {"multiplexer": "tmux", "tmux_socket": "/tmp/tmux-1000/default", "tmux_pane": "%3"}
//! ```
//!
//! Agents and hooks send whatever they know; anything without a usable
//! discriminator decodes to `None` rather than failing the whole payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Address of a terminal pane, tagged by multiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "multiplexer", rename_all = "lowercase")]
pub enum TerminalHandle {
    Tmux {
        #[serde(default)]
        tmux_socket: String,
        #[serde(default)]
        tmux_pane: String,
    },
    Kitty {
        #[serde(default)]
        kitty_window_id: String,
        #[serde(default)]
        kitty_socket: String,
    },
    Wezterm {
        #[serde(default)]
        wezterm_pane: String,
        #[serde(default)]
        wezterm_socket: String,
    },
    Zellij {
        #[serde(default)]
        zellij_session: String,
    },
}

impl TerminalHandle {
    /// Decode a handle from a JSON value, tolerating empty objects, empty
    /// discriminators, and unknown multiplexers.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mux = obj.get("multiplexer").and_then(Value::as_str)?;
        if mux.is_empty() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Decode a handle from JSON text (the persisted column format).
    pub fn from_json(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    /// Encode for persistence. Always a flat object with the discriminator.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// The multiplexer name carried in the discriminator.
    pub fn multiplexer(&self) -> &'static str {
        match self {
            Self::Tmux { .. } => "tmux",
            Self::Kitty { .. } => "kitty",
            Self::Wezterm { .. } => "wezterm",
            Self::Zellij { .. } => "zellij",
        }
    }

    /// The pane identifier addressed by this handle, if the variant has one.
    ///
    /// Zellij addresses the focused pane of a session, so the session name
    /// stands in for a pane id.
    pub fn pane_id(&self) -> &str {
        match self {
            Self::Tmux { tmux_pane, .. } => tmux_pane,
            Self::Kitty { kitty_window_id, .. } => kitty_window_id,
            Self::Wezterm { wezterm_pane, .. } => wezterm_pane,
            Self::Zellij { zellij_session } => zellij_session,
        }
    }
}

/// Deserialize an optional handle from any JSON shape without failing the
/// surrounding struct.
pub fn de_opt_handle<'de, D>(deserializer: D) -> Result<Option<TerminalHandle>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(TerminalHandle::from_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tmux_round_trip() {
        let handle = TerminalHandle::Tmux {
            tmux_socket: "/tmp/tmux-1000/default".to_string(),
            tmux_pane: "%3".to_string(),
        };
        let raw = handle.to_json();
        assert!(raw.contains("\"multiplexer\":\"tmux\""));
        assert_eq!(TerminalHandle::from_json(&raw), Some(handle));
    }

    #[test]
    fn empty_and_unknown_decode_to_none() {
        assert_eq!(TerminalHandle::from_json("{}"), None);
        assert_eq!(TerminalHandle::from_json(r#"{"multiplexer":""}"#), None);
        assert_eq!(TerminalHandle::from_json(r#"{"multiplexer":"screen"}"#), None);
        assert_eq!(TerminalHandle::from_json("not json"), None);
    }

    #[test]
    fn missing_variant_fields_default_empty() {
        let handle = TerminalHandle::from_value(&json!({"multiplexer": "zellij"}));
        assert_eq!(
            handle,
            Some(TerminalHandle::Zellij {
                zellij_session: String::new()
            })
        );
    }

    #[test]
    fn pane_id_per_variant() {
        let wez = TerminalHandle::Wezterm {
            wezterm_pane: "7".to_string(),
            wezterm_socket: String::new(),
        };
        assert_eq!(wez.pane_id(), "7");
        assert_eq!(wez.multiplexer(), "wezterm");
    }
}
