//! Errors surfaced by the session controller.

use thiserror::Error;

use typist_core::DecodeError;

use crate::application::store::StoreError;
use crate::application::transport::TransportError;
use crate::application::writer::WriteError;

/// The device answered a command with `:CFG:ERR`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("device rejected {}: {}", .command.as_deref().unwrap_or("command"), display_message(.message))]
pub struct RemoteCommandError {
    pub message: String,
    /// Body of the command that was sent last, when known.
    pub command: Option<String>,
}

fn display_message(message: &str) -> &str {
    if message.is_empty() {
        "no reason given"
    } else {
        message
    }
}

/// Everything the session can report to the user.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Remote(#[from] RemoteCommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A send was requested while no link is open.
    #[error("not connected; use /connect first")]
    NotConnected,

    /// `run_macro` named an id missing from the last loaded configuration.
    #[error("no macro with id {0}")]
    UnknownMacro(i64),
}

impl SessionError {
    /// `true` when the user backed out of the chooser.  Cancellations are
    /// neither shown as errors nor persisted.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Transport(TransportError::ChooserCancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_detected() {
        assert!(SessionError::from(TransportError::ChooserCancelled).is_cancellation());
        assert!(!SessionError::from(TransportError::NotConnected).is_cancellation());
        assert!(!SessionError::NotConnected.is_cancellation());
    }

    #[test]
    fn test_remote_error_echoes_command() {
        let err = RemoteCommandError {
            message: "slot full".into(),
            command: Some("PUT |a|b|c".into()),
        };
        assert_eq!(err.to_string(), "device rejected PUT |a|b|c: slot full");
    }

    #[test]
    fn test_remote_error_without_details() {
        let err = RemoteCommandError {
            message: String::new(),
            command: None,
        };
        assert_eq!(err.to_string(), "device rejected command: no reason given");
    }
}
