//! Application layer for the link client.
//!
//! # What lives here?
//!
//! - **`transport`** – The [`BleBackend`](transport::BleBackend) seam and the
//!   [`TransportAdapter`](transport::TransportAdapter) that turns a raw
//!   backend into one link with a resolved channel pair, one notification
//!   subscription, and generation-tagged link events.
//!
//! - **`writer`** – The single-lane chunked writer.  Every outbound payload
//!   goes through one FIFO queue so two sends can never interleave on the
//!   radio.
//!
//! - **`store`** – The durable-state seam (last device, last error).
//!
//! - **`session`** – The session controller actor: connect, disconnect,
//!   reconnect with backoff, and every user-facing intent.
//!
//! - **`error`** – The error aggregate surfaced to front-ends.
//!
//! Nothing in this layer names a concrete BLE stack or file format; those are
//! injected from `infrastructure`.

pub mod error;
pub mod session;
pub mod store;
pub mod transport;
pub mod writer;
