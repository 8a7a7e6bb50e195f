//! # typist-core
//!
//! Shared library for the Typist link client containing the text wire
//! protocol, the streamed-configuration reassembler, and the reconnect
//! policy.
//!
//! This crate has zero dependencies on Bluetooth stacks, async runtimes, or
//! timers.  Everything in it is a plain state machine driven by the caller,
//! which is what makes the link behaviour testable without a radio.
//!
//! # Architecture overview (for beginners)
//!
//! A Typist is a small BLE peripheral that types text into whatever computer
//! it is plugged into and plays back stored macros.  The client talks to it
//! over a serial-like BLE service with one *write* channel and one *notify*
//! channel.  Everything that crosses those channels is text:
//!
//! - **`protocol`** – How text travels over the link.  Outbound payloads are
//!   split into 20-byte chunks, `:CFG:` commands are encoded into frames, and
//!   inbound notifications are classified and reassembled into the JSON
//!   configuration snapshot the device streams back.
//!
//! - **`domain`** – Pure business types with no I/O: the configuration
//!   document (macros, storage usage, startup settings), the device handle,
//!   the backspace-replace tracker, and the reconnect backoff policy.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `typist_core::ConfigDocument` instead of the full module path.
pub use domain::backoff::ReconnectBackoff;
pub use domain::config_doc::{ConfigDocument, FsUsage, MacroRecord};
pub use domain::device::DeviceHandle;
pub use domain::typed_text::TypedTextTracker;
pub use protocol::chunk::{chunk_payload, CHUNK_SIZE};
pub use protocol::command::{ConfigCommand, MacroDraft};
pub use protocol::frame::InboundFrame;
pub use protocol::reassembler::{ConfigReassembler, DecodeError, StreamProgress};
pub use protocol::router::{NotificationRouter, RouteOutcome};
