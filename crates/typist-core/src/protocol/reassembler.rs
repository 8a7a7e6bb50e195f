//! Reassembly of the streamed configuration snapshot.
//!
//! The peripheral cannot send a multi-kilobyte JSON document in one BLE
//! notification, so it streams it:
//!
//! ```text
//! :CFG:LIST LEN=57          announce 57 characters
//! :CFG:DATA {"macros":[{"   fragment
//! :CFG:DATA id":1,"title"   fragment
//! ...
//! :CFG:DONE                 optional explicit end
//! ```
//!
//! # State machine
//!
//! ```text
//!          LIST LEN=n
//!   Idle ─────────────▶ Receiving ──parse ok──────────────────────▶ Idle (document emitted)
//!     ▲                    │  ▲
//!     │                    │  │ every frame re-arms the quiet period
//!     │                    ▼  │
//!     │               Receiving ──settle(): forced parse fails──▶ Idle (DecodeError)
//!     └────────────────────────────settle(): forced parse ok ────▶ Idle (document)
//! ```
//!
//! A parse is attempted whenever the stream looks complete: the announced
//! length has been reached, `DONE` arrived, or the caller forces it.  The
//! announced length is a hint, not a guarantee (the firmware counts bytes
//! in some builds and characters in others), so a failed *soft* attempt is
//! not fatal.
//!
//! While a stream is open, every call that leaves it open returns
//! [`StreamProgress::SettleRequested`]: the caller (re)starts its quiet-period
//! timer, replacing any earlier deadline.  When the timer fires the caller
//! calls [`ConfigReassembler::settle`], which makes exactly one forced
//! attempt.  A stream that stops short of its announced length and never
//! sends `DONE` is therefore finalized one settle delay after its last frame.
//!
//! The reassembler owns no timer.

use thiserror::Error;
use tracing::debug;

use crate::domain::config_doc::ConfigDocument;

/// The buffered stream did not parse even after the settle retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("config stream did not parse after {received} of {expected} characters: {reason}")]
pub struct DecodeError {
    /// Announced length (0 when none was announced).
    pub expected: usize,
    /// Characters buffered when the forced attempt failed.
    pub received: usize,
    /// The JSON parser's message.
    pub reason: String,
}

/// What the caller should do after feeding the reassembler.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamProgress {
    /// Nothing to do; either idle or more data is needed.
    Pending,
    /// A complete document was parsed; the reassembler is idle again.
    Complete(ConfigDocument),
    /// The stream is still open; (re)arm the settle timer and call `settle`
    /// when it fires.
    SettleRequested,
    /// The forced attempt failed; the buffer was discarded.
    Failed(DecodeError),
}

/// An in-progress stream.
#[derive(Debug, Default)]
struct ConfigStream {
    expected: usize,
    received: usize,
    buffer: String,
    done: bool,
}

/// Single-slot config stream reassembler.
#[derive(Debug, Default)]
pub struct ConfigReassembler {
    stream: Option<ConfigStream>,
}

impl ConfigReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a stream is being received.
    pub fn is_receiving(&self) -> bool {
        self.stream.is_some()
    }

    /// Characters buffered so far (0 when idle).
    pub fn received(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.received)
    }

    /// Starts a new stream, discarding any incomplete one.
    ///
    /// `expected` of `None` (missing or unparsable announcement) behaves as 0:
    /// the stream then completes only on `DONE` or the settle retry.
    pub fn begin(&mut self, expected: Option<usize>) -> StreamProgress {
        if let Some(old) = &self.stream {
            debug!(
                received = old.received,
                expected = old.expected,
                "discarding incomplete config stream"
            );
        }
        self.stream = Some(ConfigStream {
            expected: expected.unwrap_or(0),
            ..ConfigStream::default()
        });
        StreamProgress::SettleRequested
    }

    /// Appends one fragment and checks readiness.
    ///
    /// A fragment arriving while idle opens an implicit stream with no
    /// announced length.
    pub fn push_fragment(&mut self, fragment: &str) -> StreamProgress {
        let stream = self.stream.get_or_insert_with(ConfigStream::default);
        stream.buffer.push_str(fragment);
        stream.received += fragment.chars().count();
        self.check_ready(false)
    }

    /// Marks the stream complete (`DONE`) and checks readiness.
    pub fn finish(&mut self) -> StreamProgress {
        match self.stream.as_mut() {
            Some(stream) => {
                stream.done = true;
                self.check_ready(false)
            }
            None => StreamProgress::Pending,
        }
    }

    /// Runs the forced attempt.  Call when the settle timer fires.
    ///
    /// Returns `Pending` if the stream already completed (or was replaced)
    /// in the meantime.
    pub fn settle(&mut self) -> StreamProgress {
        if self.stream.is_none() {
            return StreamProgress::Pending;
        }
        self.check_ready(true)
    }

    /// Drops any in-progress stream, e.g. when the link goes away.
    pub fn reset(&mut self) {
        self.stream = None;
    }

    fn check_ready(&mut self, forced: bool) -> StreamProgress {
        let Some(stream) = self.stream.as_mut() else {
            return StreamProgress::Pending;
        };

        let length_reached = stream.expected > 0 && stream.received >= stream.expected;
        if !(length_reached || stream.done || forced) {
            return StreamProgress::SettleRequested;
        }

        match serde_json::from_str::<ConfigDocument>(&stream.buffer) {
            Ok(document) => {
                debug!(
                    chars = stream.received,
                    macros = document.macros.len(),
                    "config stream complete"
                );
                self.stream = None;
                StreamProgress::Complete(document)
            }
            Err(e) if forced => {
                let error = DecodeError {
                    expected: stream.expected,
                    received: stream.received,
                    reason: e.to_string(),
                };
                self.stream = None;
                StreamProgress::Failed(error)
            }
            Err(e) => {
                debug!(error = %e, "soft parse failed; waiting for the settle retry");
                StreamProgress::SettleRequested
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
