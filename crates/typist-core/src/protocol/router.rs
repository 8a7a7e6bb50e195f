//! Notification routing: config stream vs. command results.
//!
//! Each inbound notification is decoded as UTF-8 (lossily; the firmware
//! occasionally emits a stray byte on boot), classified with
//! [`InboundFrame::parse`], and dispatched:
//!
//! | Frame                   | Stream idle                 | Stream active              |
//! |-------------------------|-----------------------------|----------------------------|
//! | `LIST LEN=n`            | start stream                | restart stream             |
//! | `DATA <frag>`           | implicit stream + append    | append                     |
//! | `DONE`                  | ignored                     | finish                     |
//! | `OK`                    | [`RouteOutcome::CommandOk`] | appended as data           |
//! | `ERR...`                | [`RouteOutcome::CommandFailed`] | appended as data       |
//! | anything else           | [`RouteOutcome::Unhandled`] | appended as data           |
//!
//! While a stream is active, unknown text is treated as a continuation
//! fragment: a fragment that lost its `:CFG:DATA ` prefix is far more likely
//! than an acknowledgement arriving mid-stream.

use tracing::{debug, trace};

use crate::protocol::frame::{strip_terminator, InboundFrame};
use crate::protocol::reassembler::{ConfigReassembler, DecodeError, StreamProgress};
use crate::ConfigDocument;

/// Result of routing one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Nothing for the caller to do.
    Pending,
    /// A full configuration snapshot arrived.
    ConfigReady(ConfigDocument),
    /// Arm the settle timer, then call [`NotificationRouter::settle`].
    ArmSettleTimer,
    /// The config stream was discarded after the settle retry.
    DecodeFailed(DecodeError),
    /// The device acknowledged the last command.
    CommandOk,
    /// The device rejected the last command.
    CommandFailed {
        message: String,
        /// Body of the last command sent, for diagnostics.
        command: Option<String>,
    },
    /// Text outside any stream that is not a command result.
    Unhandled(String),
}

/// Dispatches inbound notifications and owns the config-stream reassembler.
#[derive(Debug, Default)]
pub struct NotificationRouter {
    reassembler: ConfigReassembler,
    last_command: Option<String>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the body of the last command sent, echoed on `ERR`.
    pub fn note_command(&mut self, body: impl Into<String>) {
        self.last_command = Some(body.into());
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// `true` while a config stream is being received.
    pub fn is_receiving(&self) -> bool {
        self.reassembler.is_receiving()
    }

    /// Routes one raw notification.
    pub fn route(&mut self, raw: &[u8]) -> RouteOutcome {
        let decoded = String::from_utf8_lossy(raw);
        let frame = InboundFrame::parse(&decoded);
        trace!(?frame, "inbound frame");

        let progress = match frame {
            InboundFrame::ListLen(expected) => self.reassembler.begin(expected),
            InboundFrame::Data(fragment) => self.reassembler.push_fragment(&fragment),
            InboundFrame::Done => self.reassembler.finish(),
            _ if self.reassembler.is_receiving() => {
                // Appended as sent, minus the line terminator.
                let fragment = strip_terminator(&decoded);
                debug!(len = fragment.len(), "non-data frame inside config stream; treating as data");
                self.reassembler.push_fragment(fragment)
            }
            InboundFrame::Ok => return RouteOutcome::CommandOk,
            InboundFrame::Err(message) => {
                return RouteOutcome::CommandFailed {
                    message,
                    command: self.last_command.clone(),
                }
            }
            InboundFrame::Other(text) => return RouteOutcome::Unhandled(text),
        };
        progress.into()
    }

    /// Forced attempt after the settle timer fired.
    pub fn settle(&mut self) -> RouteOutcome {
        self.reassembler.settle().into()
    }

    /// Drops any partial stream (link lost or closed).
    pub fn reset_stream(&mut self) {
        self.reassembler.reset();
    }
}

impl From<StreamProgress> for RouteOutcome {
    fn from(progress: StreamProgress) -> Self {
        match progress {
            StreamProgress::Pending => RouteOutcome::Pending,
            StreamProgress::Complete(doc) => RouteOutcome::ConfigReady(doc),
            StreamProgress::SettleRequested => RouteOutcome::ArmSettleTimer,
            StreamProgress::Failed(err) => RouteOutcome::DecodeFailed(err),
        }
    }
}
