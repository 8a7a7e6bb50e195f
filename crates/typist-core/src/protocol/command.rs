//! Outbound `:CFG:` command frames.
//!
//! Wire format (one frame per command, always newline-terminated):
//! ```text
//! :CFG:LIST\n
//! :CFG:PUT <id>|<title>|<icon>|<script>\n      (each field percent-encoded)
//! :CFG:DEL <id>\n
//! :CFG:SET_STARTUP <id>\n
//! :CFG:SET_STARTUP_SCRIPT <percent-encoded text>\n
//! ```
//!
//! `PUT` with an empty id asks the firmware to allocate a new macro slot.
//! Percent-encoding keeps `|` and newlines inside titles and scripts from
//! breaking the frame.

use std::fmt;

/// Prefix shared by every configuration frame in both directions.
pub const CFG_PREFIX: &str = ":CFG:";

/// A macro as submitted from an editor: `id == None` creates a new record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacroDraft {
    pub id: Option<i64>,
    pub title: String,
    pub icon: String,
    pub script: String,
}

/// A configuration command sent to the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Request a full configuration snapshot.
    List,
    /// Create or update a macro.
    Put(MacroDraft),
    /// Delete the macro with the given id.
    Delete(i64),
    /// Select the macro that runs when the device powers up.
    SetStartup(i64),
    /// Set a free-form script that runs when the device powers up.
    SetStartupScript(String),
}

impl ConfigCommand {
    /// Renders the command body without the `:CFG:` prefix or newline.
    ///
    /// This is the form echoed back to the user when the device reports an
    /// error for the command.
    pub fn body(&self) -> String {
        match self {
            ConfigCommand::List => "LIST".to_string(),
            ConfigCommand::Put(draft) => {
                let id = draft.id.map(|id| id.to_string()).unwrap_or_default();
                format!(
                    "PUT {}|{}|{}|{}",
                    urlencoding::encode(&id),
                    urlencoding::encode(&draft.title),
                    urlencoding::encode(&draft.icon),
                    urlencoding::encode(&draft.script),
                )
            }
            ConfigCommand::Delete(id) => format!("DEL {id}"),
            ConfigCommand::SetStartup(id) => format!("SET_STARTUP {id}"),
            ConfigCommand::SetStartupScript(text) => {
                format!("SET_STARTUP_SCRIPT {}", urlencoding::encode(text))
            }
        }
    }

    /// Encodes the full frame, ready to hand to the chunked writer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use typist_core::protocol::command::ConfigCommand;
    ///
    /// assert_eq!(ConfigCommand::List.encode(), ":CFG:LIST\n");
    /// assert_eq!(ConfigCommand::Delete(7).encode(), ":CFG:DEL 7\n");
    /// ```
    pub fn encode(&self) -> String {
        format!("{CFG_PREFIX}{}\n", self.body())
    }
}

impl fmt::Display for ConfigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_frame() {
        assert_eq!(ConfigCommand::List.encode(), ":CFG:LIST\n");
    }

    #[test]
    fn test_put_new_macro_has_empty_id_field() {
        // Arrange
        let cmd = ConfigCommand::Put(MacroDraft {
            id: None,
            title: "Hello".into(),
            icon: "star".into(),
            script: "hi".into(),
        });

        // Act
        let frame = cmd.encode();

        // Assert
        assert_eq!(frame, ":CFG:PUT |Hello|star|hi\n");
    }

    #[test]
    fn test_put_existing_macro_percent_encodes_each_field() {
        // Arrange: pipes, spaces, and newlines must not leak into the frame
        let cmd = ConfigCommand::Put(MacroDraft {
            id: Some(3),
            title: "a|b".into(),
            icon: "two words".into(),
            script: "line1\nline2".into(),
        });

        // Act
        let frame = cmd.encode();

        // Assert
        assert_eq!(frame, ":CFG:PUT 3|a%7Cb|two%20words|line1%0Aline2\n");
        assert_eq!(frame.matches('|').count(), 3, "only the three separators");
        assert_eq!(frame.matches('\n').count(), 1, "only the terminator");
    }

    #[test]
    fn test_put_encodes_non_ascii_as_utf8_escapes() {
        let cmd = ConfigCommand::Put(MacroDraft {
            id: Some(1),
            title: "é".into(),
            icon: String::new(),
            script: String::new(),
        });
        assert_eq!(cmd.encode(), ":CFG:PUT 1|%C3%A9||\n");
    }

    #[test]
    fn test_delete_and_set_startup_frames() {
        assert_eq!(ConfigCommand::Delete(12).encode(), ":CFG:DEL 12\n");
        assert_eq!(ConfigCommand::SetStartup(4).encode(), ":CFG:SET_STARTUP 4\n");
        assert_eq!(ConfigCommand::SetStartup(-1).encode(), ":CFG:SET_STARTUP -1\n");
    }

    #[test]
    fn test_set_startup_script_is_url_encoded() {
        let cmd = ConfigCommand::SetStartupScript("echo hi & bye".into());
        assert_eq!(cmd.encode(), ":CFG:SET_STARTUP_SCRIPT echo%20hi%20%26%20bye\n");
    }

    #[test]
    fn test_display_matches_body() {
        let cmd = ConfigCommand::Delete(5);
        assert_eq!(cmd.to_string(), "DEL 5");
        assert_eq!(cmd.to_string(), cmd.body());
    }
}
