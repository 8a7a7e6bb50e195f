//! Infrastructure layer for the Typist client.
//!
//! Contains OS-facing adapters: the BLE backends, file-system storage for
//! configuration and durable state, and the line-oriented console.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `typist_core`, but MUST NOT be imported by the `application` layer.

pub mod ble;
pub mod console;
pub mod storage;
